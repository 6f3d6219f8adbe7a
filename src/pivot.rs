//! Pivot reports (Safety / Financials)
//!
//! Column labels are discovered from the question metadata at request time and
//! pivoted into one row per vendor and stats year. No text generation involved.

use crate::catalog::{Catalog, PivotTerms};
use crate::db::DataSource;
use crate::error::{AgentError, Result};
use crate::intent::QueryMode;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Maximum label length; applied identically in discovery and in the pivot.
pub const LABEL_BUDGET: usize = 120;
pub const MIN_STATS_YEAR: u32 = 2012;
pub const ROW_CAP: usize = 1000;

/// Bracket-quote an identifier, doubling any closing bracket.
pub fn quote_ident(label: &str) -> String {
    format!("[{}]", label.replace(']', "]]"))
}

fn like_literal(term: &str) -> String {
    format!("'%{}%'", term.replace('\'', "''"))
}

pub fn discovery_sql(terms: &PivotTerms) -> String {
    let predicate = terms
        .like_terms
        .iter()
        .map(|t| format!("q.QuestionText LIKE {}", like_literal(t)))
        .collect::<Vec<_>>()
        .join("\n   OR ");

    format!(
        "SELECT DISTINCT LEFT(q.QuestionText, {budget}) AS QuestionText\n\
         FROM QuestionColumnDetails qd\n\
         JOIN Questions q ON q.QuestionID = qd.QuestionId\n\
         WHERE ({predicate})\n\
         \x20 AND q.QuestionText NOT LIKE {noise}\n\
         ORDER BY QuestionText",
        budget = LABEL_BUDGET,
        predicate = predicate,
        noise = like_literal(&terms.noise_term),
    )
}

pub fn pivot_sql(labels: &[String], extraction_id: Option<u64>) -> String {
    let pivot_cols = labels
        .iter()
        .map(|l| quote_ident(l))
        .collect::<Vec<_>>()
        .join(", ");

    let extraction_filter = match extraction_id {
        Some(id) if id > 0 => format!(
            "\n      AND p.PrequalificationId = (SELECT PQID FROM ExtractionHeader WHERE ExtractionId = {})",
            id
        ),
        _ => String::new(),
    };

    format!(
        "SELECT TOP {cap} Vendor, EMRStatsYear, emrVal AS EMR, {cols}
FROM (
    SELECT o.Name AS Vendor, pesv.QuestionColumnIdValue, pesy.EMRStatsYear,
           LEFT(q.QuestionText, {budget}) AS QuestionText, emr.emrVal
    FROM Prequalification p
    JOIN Organizations o ON o.OrganizationID = p.VendorId
    JOIN PrequalificationEMRStatsYears pesy ON pesy.PrequalificationId = p.PrequalificationId
    JOIN PrequalificationEMRStatsValues pesv ON pesy.PrequalEMRStatsYearId = pesv.PrequalEMRStatsYearId
    LEFT JOIN (
        SELECT PreQualificationId, MAX(UserInput) AS emrVal
        FROM PrequalificationUserInput ui
        JOIN QuestionColumnDetails qcol ON qcol.QuestionColumnId = ui.QuestionColumnId
        JOIN Questions q ON q.QuestionID = qcol.QuestionId
        WHERE q.QuestionText LIKE 'EMR%'
        GROUP BY PreQualificationId
    ) emr ON emr.PreQualificationId = p.PrequalificationId
    JOIN QuestionColumnDetails qd ON qd.QuestionColumnId = pesv.QuestionColumnId
    JOIN Questions q ON q.QuestionID = qd.QuestionId
    WHERE ISNUMERIC(pesy.EMRStatsYear) = 1{filter}
) AS src
PIVOT (
    MAX(QuestionColumnIdValue) FOR QuestionText IN ({cols})
) AS piv
WHERE CAST(EMRStatsYear AS DECIMAL(18,2)) > {min_year}
ORDER BY Vendor, EMRStatsYear;",
        cap = ROW_CAP,
        cols = pivot_cols,
        budget = LABEL_BUDGET,
        filter = extraction_filter,
        min_year = MIN_STATS_YEAR,
    )
}

pub struct PivotCompiler {
    source: Arc<dyn DataSource>,
    catalog: Arc<Catalog>,
}

impl PivotCompiler {
    pub fn new(source: Arc<dyn DataSource>, catalog: Arc<Catalog>) -> Self {
        Self { source, catalog }
    }

    fn terms(&self, mode: QueryMode) -> Result<&PivotTerms> {
        match mode {
            QueryMode::SafetyPivot => Ok(&self.catalog.safety_terms),
            QueryMode::FinancialPivot => Ok(&self.catalog.financial_terms),
            QueryMode::DirectLookup => Err(AgentError::InvalidInput(
                "direct lookups have no pivot report".to_string(),
            )),
        }
    }

    /// Distinct labels for the mode, truncated to `LABEL_BUDGET`, in discovery order.
    pub async fn discover_labels(&self, mode: QueryMode) -> Result<Vec<String>> {
        let sql = discovery_sql(self.terms(mode)?);
        let rs = self.source.execute(&sql).await?;
        let idx = rs.column_index("QuestionText").unwrap_or(0);

        let mut seen = HashSet::new();
        let labels = rs
            .rows
            .iter()
            .filter_map(|row| row.get(idx).and_then(Value::as_str))
            .map(|label| label.chars().take(LABEL_BUDGET).collect::<String>())
            .filter(|label| !label.trim().is_empty())
            .filter(|label| seen.insert(label.clone()))
            .collect();
        Ok(labels)
    }

    pub async fn compile(&self, mode: QueryMode, extraction_id: Option<u64>) -> Result<String> {
        let labels = self.discover_labels(mode).await?;
        let subject = mode.subject().map(|s| s.to_string()).unwrap_or_default();
        if labels.is_empty() {
            warn!(%subject, "pivot discovery found no labels");
            return Err(AgentError::NoSubjectData(subject));
        }
        info!(%subject, columns = labels.len(), ?extraction_id, "compiled pivot report");
        Ok(pivot_sql(&labels, extraction_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ResultSet;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct LabelSource {
        labels: Vec<Value>,
        seen_sql: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DataSource for LabelSource {
        async fn execute(&self, sql: &str) -> Result<ResultSet> {
            self.seen_sql.lock().unwrap().push(sql.to_string());
            Ok(ResultSet::new(
                vec!["QuestionText".into()],
                self.labels.iter().map(|l| vec![l.clone()]).collect(),
            ))
        }
    }

    fn compiler(labels: Vec<Value>) -> (PivotCompiler, Arc<LabelSource>) {
        let source = Arc::new(LabelSource {
            labels,
            seen_sql: Mutex::new(Vec::new()),
        });
        (
            PivotCompiler::new(source.clone(), Arc::new(Catalog::standard())),
            source,
        )
    }

    #[test]
    fn test_discovery_sql_uses_terms_and_noise_filter() {
        let sql = discovery_sql(&Catalog::standard().safety_terms);
        assert!(sql.contains("LEFT(q.QuestionText, 120)"));
        assert!(sql.contains("q.QuestionText LIKE '%TRIR%'"));
        assert!(sql.contains("NOT LIKE '%Please explain%'"));
    }

    #[test]
    fn test_like_terms_are_escaped() {
        let terms = PivotTerms {
            like_terms: vec!["Owner's Revenue".to_string()],
            noise_term: "x".to_string(),
        };
        assert!(discovery_sql(&terms).contains("LIKE '%Owner''s Revenue%'"));
    }

    #[test]
    fn test_quote_ident_doubles_closing_bracket() {
        assert_eq!(quote_ident("Rate [2023]"), "[Rate [2023]]]");
    }

    #[test]
    fn test_pivot_sql_shape() {
        let sql = pivot_sql(&["TRIR".to_string(), "Fatalities".to_string()], Some(3053));
        assert!(sql.starts_with("SELECT TOP 1000 Vendor, EMRStatsYear, emrVal AS EMR, [TRIR], [Fatalities]"));
        assert!(sql.contains("FOR QuestionText IN ([TRIR], [Fatalities])"));
        assert!(sql.contains("WHERE ExtractionId = 3053"));
        assert!(sql.contains("> 2012"));
    }

    #[test]
    fn test_pivot_sql_without_extraction_filter() {
        let sql = pivot_sql(&["TRIR".to_string()], None);
        assert!(!sql.contains("ExtractionHeader"));
    }

    #[tokio::test]
    async fn test_long_labels_truncated_consistently() {
        let long = "A".repeat(150);
        let (compiler, source) = compiler(vec![json!(long), json!("TRIR"), json!("TRIR")]);
        let sql = compiler.compile(QueryMode::SafetyPivot, None).await.unwrap();

        let truncated = format!("[{}]", "A".repeat(120));
        assert!(sql.contains(&truncated));
        assert!(!sql.contains(&"A".repeat(121)));
        assert_eq!(sql.matches("[TRIR]").count(), 2);
        assert!(source.seen_sql.lock().unwrap()[0].contains("LEFT(q.QuestionText, 120)"));
    }

    #[tokio::test]
    async fn test_no_labels_is_no_subject_data() {
        let (compiler, _) = compiler(vec![]);
        let err = compiler.compile(QueryMode::FinancialPivot, Some(1)).await.unwrap_err();
        assert!(matches!(err, AgentError::NoSubjectData(ref s) if s == "Financials"));
    }

    #[tokio::test]
    async fn test_direct_mode_has_no_pivot() {
        let (compiler, _) = compiler(vec![json!("TRIR")]);
        let err = compiler.compile(QueryMode::DirectLookup, None).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }
}
