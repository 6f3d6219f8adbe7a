//! Request pipeline: classify, ground, resolve, compile, execute.

use crate::catalog::Catalog;
use crate::config::AppConfig;
use crate::db::{DataSource, MssqlDataSource, ResultSet};
use crate::error::{AgentError, Result};
use crate::header_alias::HeaderAliaser;
use crate::intent::{IntentClassifier, QueryMode, ReportSubject};
use crate::knowledge_base::{KnowledgeBaseBuilder, StaticTag};
use crate::llm::{LlmClient, TextGenerator};
use crate::pivot::PivotCompiler;
use crate::relevance;
use crate::resolver::FieldResolver;
use crate::sql_compiler::SqlCompiler;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct Question {
    pub extraction_id: i64,
    pub text: String,
}

impl Question {
    pub fn new(extraction_id: i64, text: impl Into<String>) -> Self {
        Self {
            extraction_id,
            text: text.into(),
        }
    }

    fn validated(&self) -> Result<(u64, &str)> {
        if self.extraction_id <= 0 {
            return Err(AgentError::InvalidInput(
                "extraction_id must be a positive integer".to_string(),
            ));
        }
        let text = self.text.trim();
        if text.is_empty() {
            return Err(AgentError::InvalidInput("question must not be empty".to_string()));
        }
        Ok((self.extraction_id as u64, text))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedQuery {
    pub sql: String,
    pub mode: QueryMode,
    pub resolved_identifiers: BTreeSet<u64>,
    pub resolved_static_fields: BTreeSet<StaticTag>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportResult {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

pub struct QueryAgent {
    source: Arc<dyn DataSource>,
    generator: Arc<dyn TextGenerator>,
    catalog: Arc<Catalog>,
    classifier: IntentClassifier,
    label_budget: usize,
}

impl QueryAgent {
    pub fn new(
        source: Arc<dyn DataSource>,
        generator: Arc<dyn TextGenerator>,
        catalog: Arc<Catalog>,
        label_budget: usize,
    ) -> Self {
        let classifier = IntentClassifier::new(&catalog);
        Self {
            source,
            generator,
            catalog,
            classifier,
            label_budget,
        }
    }

    /// Wire the production collaborators from configuration.
    pub fn from_config(config: &AppConfig, catalog: Arc<Catalog>) -> Result<Self> {
        let source = MssqlDataSource::connect_lazy(&config.database_url, config.db_timeout)?;
        let generator = LlmClient::new(
            config.llm_url.clone(),
            config.llm_model.clone(),
            config.llm_timeout,
        )?;
        Ok(Self::new(
            Arc::new(source),
            Arc::new(generator),
            catalog,
            config.label_budget,
        ))
    }

    pub fn classify(&self, question: &str) -> QueryMode {
        self.classifier.classify(question)
    }

    #[instrument(skip(self, question), fields(extraction_id = question.extraction_id))]
    pub async fn generate_sql(&self, question: &Question) -> Result<GeneratedQuery> {
        let (extraction_id, text) = question.validated()?;
        let mode = self.classifier.classify(text);
        info!(%mode, "classified question");

        if mode.is_pivot() {
            let sql = PivotCompiler::new(self.source.clone(), self.catalog.clone())
                .compile(mode, Some(extraction_id))
                .await?;
            return Ok(GeneratedQuery {
                sql,
                mode,
                resolved_identifiers: BTreeSet::new(),
                resolved_static_fields: BTreeSet::new(),
            });
        }

        let kb = KnowledgeBaseBuilder::new(
            self.source.clone(),
            self.catalog.clone(),
            self.label_budget,
        )
        .build()
        .await;
        let context = relevance::filter(&kb, text, &self.catalog.overrides);
        info!(
            candidates = context.entries.len(),
            fell_back = context.fell_back,
            "grounding context ready"
        );

        let resolved = FieldResolver::new(self.generator.clone())
            .resolve(text, &context, extraction_id)
            .await;
        let sql = SqlCompiler::new(&self.catalog).compile(&resolved, extraction_id, &kb)?;

        Ok(GeneratedQuery {
            sql,
            mode,
            resolved_identifiers: resolved.identifiers,
            resolved_static_fields: resolved.static_tags,
        })
    }

    /// Execute caller-supplied SQL and alias the headers for display.
    pub async fn run_report(&self, sql: &str) -> Result<ReportResult> {
        if sql.trim().is_empty() {
            return Err(AgentError::InvalidInput("sql must not be empty".to_string()));
        }
        let rs = self.source.execute(sql).await?;
        info!(rows = rs.rows.len(), "report executed");
        Ok(self.shape_report(rs))
    }

    /// Pivot report for a subject, optionally scoped to one extraction.
    pub async fn subject_report(
        &self,
        subject: ReportSubject,
        extraction_id: Option<i64>,
    ) -> Result<ReportResult> {
        let scope = extraction_id.filter(|id| *id > 0).map(|id| id as u64);
        let sql = PivotCompiler::new(self.source.clone(), self.catalog.clone())
            .compile(subject.mode(), scope)
            .await?;
        self.run_report(&sql).await
    }

    fn shape_report(&self, rs: ResultSet) -> ReportResult {
        let display = HeaderAliaser::new(&self.catalog).alias_columns(&rs.columns);
        let columns = disambiguate(display);

        let rows = rs
            .rows
            .into_iter()
            .map(|row| columns.iter().cloned().zip(row).collect::<Map<String, Value>>())
            .collect();

        ReportResult { columns, rows }
    }
}

/// Suffix repeated display names with ` (2)`, ` (3)` and so on.
fn disambiguate(labels: Vec<String>) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    labels
        .into_iter()
        .map(|label| {
            let n = counts.entry(label.clone()).or_insert(0);
            *n += 1;
            if *n == 1 {
                label
            } else {
                format!("{} ({})", label, n)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_validation() {
        assert!(Question::new(0, "Producer").validated().is_err());
        assert!(Question::new(-3, "Producer").validated().is_err());
        assert!(Question::new(10, "   ").validated().is_err());
        assert_eq!(Question::new(10, " Producer ").validated().unwrap(), (10, "Producer"));
    }

    #[test]
    fn test_disambiguate() {
        let out = disambiguate(vec!["TRIR".into(), "Vendor".into(), "TRIR".into(), "TRIR".into()]);
        assert_eq!(out, vec!["TRIR", "Vendor", "TRIR (2)", "TRIR (3)"]);
    }
}
