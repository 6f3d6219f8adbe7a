use anyhow::Result;
use clap::{Parser, Subcommand};
use prequal_sql_agent::config::AppConfig;
use prequal_sql_agent::db::{check_schema, init_pool, MssqlDataSource};
use prequal_sql_agent::{Catalog, QueryAgent, Question, ReportSubject};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "prequal-sql")]
#[command(about = "Natural-language questions to SQL over prequalification records")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate SQL for a question about one extraction record
    Generate {
        /// Extraction record the question is scoped to
        #[arg(short, long)]
        extraction_id: i64,

        /// The question in natural language
        question: String,
    },
    /// Execute SQL and print aliased rows as JSON
    Run {
        sql: String,
    },
    /// Build and run a pivot report (Safety or Financials)
    Report {
        subject: String,

        #[arg(short, long)]
        extraction_id: Option<i64>,
    },
    /// Verify connectivity and the tables the queries depend on
    CheckDb,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = AppConfig::from_env()?;
    let catalog = Arc::new(Catalog::standard());

    match args.command {
        Command::Generate {
            extraction_id,
            question,
        } => {
            let agent = QueryAgent::from_config(&config, catalog)?;
            let generated = agent.generate_sql(&Question::new(extraction_id, question)).await?;
            info!(mode = %generated.mode, ids = ?generated.resolved_identifiers, "generated");
            println!("{}", generated.sql);
        }
        Command::Run { sql } => {
            let agent = QueryAgent::from_config(&config, catalog)?;
            let report = agent.run_report(&sql).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Report {
            subject,
            extraction_id,
        } => {
            let subject: ReportSubject = subject.parse()?;
            let agent = QueryAgent::from_config(&config, catalog)?;
            let report = agent.subject_report(subject, extraction_id).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::CheckDb => {
            let pool = init_pool(&config.database_url, config.db_timeout).await?;
            info!("connection established");
            let report = check_schema(&MssqlDataSource::new(pool)).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_healthy() {
                error!("one or more required tables are unreachable");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
