//! Verifies the tables the generated queries depend on are reachable.

use super::DataSource;
use crate::pivot::{quote_ident, LABEL_BUDGET};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

pub const REQUIRED_TABLES: [&str; 5] = [
    "Questions",
    "AIMapping",
    "ExtractionHeader",
    "PrequalificationEMRStatsValues",
    "Organizations",
];

#[derive(Debug, Clone, Serialize)]
pub struct TableStatus {
    pub table: String,
    pub row_count: Option<i64>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaReport {
    pub tables: Vec<TableStatus>,
    pub max_label_length: Option<i64>,
    pub warnings: Vec<String>,
}

impl SchemaReport {
    pub fn is_healthy(&self) -> bool {
        self.tables.iter().all(|t| t.error.is_none())
    }
}

/// Longest question label, measured the way SQL Server counts characters.
pub const LABEL_LENGTH_SQL: &str = "SELECT MAX(LEN(QuestionText)) AS max_len FROM [Questions]";

pub async fn check_schema(source: &dyn DataSource) -> SchemaReport {
    let mut tables = Vec::new();
    let mut warnings = Vec::new();

    for table in REQUIRED_TABLES {
        let sql = format!("SELECT COUNT(*) AS row_count FROM {}", quote_ident(table));
        let status = match source.execute(&sql).await {
            Ok(rs) => TableStatus {
                table: table.to_string(),
                row_count: rs.rows.first().and_then(|r| r.first()).and_then(as_i64),
                error: None,
            },
            Err(e) => {
                warn!(table, error = %e, "table check failed");
                TableStatus {
                    table: table.to_string(),
                    row_count: None,
                    error: Some(e.to_string()),
                }
            }
        };
        info!(table, rows = ?status.row_count, "table checked");
        tables.push(status);
    }

    let max_label_length = match source
        .execute(LABEL_LENGTH_SQL)
        .await
    {
        Ok(rs) => rs.rows.first().and_then(|r| r.first()).and_then(as_i64),
        Err(e) => {
            warnings.push(format!("Could not measure question labels: {}", e));
            None
        }
    };

    if let Some(len) = max_label_length {
        if len > LABEL_BUDGET as i64 {
            warnings.push(format!(
                "Question labels reach {} chars; pivot columns are truncated to {}",
                len, LABEL_BUDGET
            ));
        }
    }

    SchemaReport {
        tables,
        max_label_length,
        warnings,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ResultSet;
    use crate::error::{AgentError, Result};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct CountingSource;

    #[async_trait]
    impl DataSource for CountingSource {
        async fn execute(&self, sql: &str) -> Result<ResultSet> {
            if sql.contains("AIMapping") {
                return Err(AgentError::DataAccess("Invalid object name 'AIMapping'".into()));
            }
            if sql.contains("MAX(LEN") {
                return Ok(ResultSet::new(vec!["max_len".into()], vec![vec![json!(312)]]));
            }
            Ok(ResultSet::new(vec!["row_count".into()], vec![vec![json!("42")]]))
        }
    }

    #[tokio::test]
    async fn test_reports_missing_table_and_long_labels() {
        let report = check_schema(&CountingSource).await;

        assert!(!report.is_healthy());
        let mapping = report.tables.iter().find(|t| t.table == "AIMapping").unwrap();
        assert!(mapping.error.is_some());
        let questions = report.tables.iter().find(|t| t.table == "Questions").unwrap();
        assert_eq!(questions.row_count, Some(42));
        assert_eq!(report.max_label_length, Some(312));
        assert_eq!(report.warnings.len(), 1);
    }

    struct RecordingSource(Mutex<Vec<String>>);

    #[async_trait]
    impl DataSource for RecordingSource {
        async fn execute(&self, sql: &str) -> Result<ResultSet> {
            self.0.lock().unwrap().push(sql.to_string());
            Ok(ResultSet::new(vec!["n".into()], vec![vec![json!(1)]]))
        }
    }

    #[tokio::test]
    async fn test_probes_are_tsql() {
        let source = RecordingSource(Mutex::new(Vec::new()));
        let report = check_schema(&source).await;
        assert!(report.is_healthy());
        assert!(report.warnings.is_empty());

        let statements = source.0.lock().unwrap().clone();
        assert_eq!(statements.len(), REQUIRED_TABLES.len() + 1);
        assert_eq!(statements[0], "SELECT COUNT(*) AS row_count FROM [Questions]");
        assert_eq!(statements[1], "SELECT COUNT(*) AS row_count FROM [AIMapping]");
        assert_eq!(statements.last().unwrap(), LABEL_LENGTH_SQL);
        assert!(LABEL_LENGTH_SQL.contains("LEN(QuestionText)"));
    }
}
