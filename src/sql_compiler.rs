//! SQL Compiler - direct field lookup
//!
//! Turns resolved field identifiers into one `MAX(CASE WHEN ...)` column each,
//! over the fixed extraction join graph.

use crate::catalog::Catalog;
use crate::error::{AgentError, Result};
use crate::knowledge_base::KnowledgeBase;
use crate::resolver::ResolvedFields;
use std::collections::HashSet;
use tracing::info;

pub const KEY_COLUMN: &str = "QuestionBankId";
pub const VALUE_COLUMN: &str = "ExtractedValue";

const FROM_CLAUSE: &str = "FROM ExtractionHeader H\n\
JOIN ExtractedDataDetail D ON H.ExtractionId = D.ExtractionId\n\
JOIN Prequalification P ON H.PQID = P.PrequalificationId\n\
JOIN dbo.Organizations O ON P.VendorId = O.OrganizationID";

/// Replace every non `[A-Za-z0-9]` character with `_` and trim underscores.
pub fn sanitize_alias(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    replaced.trim_matches('_').to_string()
}

pub struct SqlCompiler<'a> {
    catalog: &'a Catalog,
}

impl<'a> SqlCompiler<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Build the lookup query, or `ResolutionEmpty` when there is nothing to select.
    pub fn compile(
        &self,
        resolved: &ResolvedFields,
        extraction_id: u64,
        kb: &KnowledgeBase,
    ) -> Result<String> {
        if resolved.is_empty() {
            return Err(AgentError::ResolutionEmpty);
        }

        let mut select = Vec::new();
        let mut group_by = Vec::new();
        let mut used_aliases = HashSet::new();

        for tag in &resolved.static_tags {
            let column = self.catalog.static_column(*tag).ok_or_else(|| {
                AgentError::Config(format!("No source column configured for {}", tag))
            })?;
            used_aliases.insert(column.alias.clone());
            select.push(format!("{} AS [{}]", column.expression, column.alias));
            group_by.push(column.expression.clone());
        }

        for id in &resolved.identifiers {
            let mut alias = sanitize_alias(&kb.display_name_for(*id));
            if alias.is_empty() {
                alias = format!("Field_{}", id);
            }
            if !used_aliases.insert(alias.clone()) {
                alias = format!("{}_{}", alias, id);
                used_aliases.insert(alias.clone());
            }
            select.push(format!(
                "MAX(CASE WHEN {} = {} THEN {} END) AS [{}]",
                KEY_COLUMN, id, VALUE_COLUMN, alias
            ));
        }

        let mut sql = format!(
            "SELECT\n  {}\n{}\nWHERE H.ExtractionId = {}",
            select.join(",\n  "),
            FROM_CLAUSE,
            extraction_id
        );
        if !group_by.is_empty() {
            sql.push_str(&format!("\nGROUP BY {}", group_by.join(", ")));
        }
        sql.push(';');

        info!(
            columns = select.len(),
            extraction_id, "compiled direct lookup query"
        );
        Ok(sql)
    }
}
