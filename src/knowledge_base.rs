//! Knowledge base: human-readable field names mapped to field identifiers.
//!
//! Built per request from two sources. Labels discovered from the mapping tables
//! go in first, the curated overrides from the [`Catalog`] go in last, so an
//! override always wins a name collision.

use crate::catalog::Catalog;
use crate::db::{DataSource, ResultSet};
use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Pulls every mapped question label with its field-bank id.
pub const DISCOVERY_SQL: &str = "SELECT Q.QuestionText, A.QuestionBankId \
FROM AIMapping A JOIN Questions Q ON A.QuestionBankId = Q.QuestionBankId";

/// Field sourced from organisation/document metadata instead of extracted values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StaticTag {
    #[serde(rename = "Static_TaxID")]
    TaxId,
    #[serde(rename = "Static_OrgName")]
    OrgName,
    #[serde(rename = "Static_DocName")]
    DocName,
}

impl StaticTag {
    pub const ALL: [StaticTag; 3] = [StaticTag::TaxId, StaticTag::OrgName, StaticTag::DocName];

    pub fn tag(&self) -> &'static str {
        match self {
            StaticTag::TaxId => "Static_TaxID",
            StaticTag::OrgName => "Static_OrgName",
            StaticTag::DocName => "Static_DocName",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.tag() == tag)
    }
}

impl fmt::Display for StaticTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldId {
    Numeric(u64),
    Static(StaticTag),
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldId::Numeric(id) => write!(f, "{}", id),
            FieldId::Static(tag) => write!(f, "{}", tag),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEntry {
    pub name: String,
    pub identifier: FieldId,
}

impl FieldEntry {
    pub fn new(name: impl Into<String>, identifier: FieldId) -> Self {
        Self {
            name: name.into(),
            identifier,
        }
    }

    /// `name -> identifier`, the form used in prompts.
    pub fn to_line(&self) -> String {
        format!("{} -> {}", self.name, self.identifier)
    }
}

/// Name-unique mapping that remembers the order of the last write to each name.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    by_name: HashMap<String, (u64, FieldId)>,
    next_seq: u64,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. A replaced name moves to the end of the write order.
    pub fn insert(&mut self, name: impl Into<String>, identifier: FieldId) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_name.insert(name.into(), (seq, identifier));
    }

    pub fn get(&self, name: &str) -> Option<FieldId> {
        self.by_name.get(name).map(|(_, id)| *id)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Entries in write order.
    pub fn entries(&self) -> Vec<FieldEntry> {
        let mut ordered: Vec<(&u64, &String, &FieldId)> = self
            .by_name
            .iter()
            .map(|(name, (seq, id))| (seq, name, id))
            .collect();
        ordered.sort_by_key(|(seq, _, _)| **seq);
        ordered
            .into_iter()
            .map(|(_, name, id)| FieldEntry::new(name.clone(), *id))
            .collect()
    }

    /// Reverse lookup. When several names share the id, the latest write wins.
    pub fn name_for(&self, id: u64) -> Option<&str> {
        self.by_name
            .iter()
            .filter(|(_, (_, field))| *field == FieldId::Numeric(id))
            .max_by_key(|(_, (seq, _))| *seq)
            .map(|(name, _)| name.as_str())
    }

    pub fn display_name_for(&self, id: u64) -> String {
        self.name_for(id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Field_{}", id))
    }
}

/// Two-source merge: `discovered` first, then `overrides` on top.
pub fn merge(discovered: Vec<FieldEntry>, overrides: &[FieldEntry]) -> KnowledgeBase {
    let mut kb = KnowledgeBase::new();
    for entry in discovered {
        kb.insert(entry.name, entry.identifier);
    }
    for entry in overrides {
        kb.insert(entry.name.clone(), entry.identifier);
    }
    kb
}

/// Truncate to `budget` characters, flatten newlines, trim.
pub fn normalize_label(raw: &str, budget: usize) -> String {
    let truncated: String = raw.chars().take(budget).collect();
    truncated
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
        .trim()
        .to_string()
}

pub struct KnowledgeBaseBuilder {
    source: Arc<dyn DataSource>,
    catalog: Arc<Catalog>,
    label_budget: usize,
}

impl KnowledgeBaseBuilder {
    pub fn new(source: Arc<dyn DataSource>, catalog: Arc<Catalog>, label_budget: usize) -> Self {
        Self {
            source,
            catalog,
            label_budget,
        }
    }

    /// Never fails: a broken discovery source leaves only the overrides.
    pub async fn build(&self) -> KnowledgeBase {
        let discovered = match self.discover().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "knowledge base discovery failed, using overrides only");
                Vec::new()
            }
        };
        let kb = merge(discovered, &self.catalog.overrides);
        debug!(entries = kb.len(), "knowledge base built");
        kb
    }

    async fn discover(&self) -> Result<Vec<FieldEntry>> {
        let rs = self.source.execute(DISCOVERY_SQL).await?;
        if rs.is_empty() {
            warn!("discovery returned no rows");
            return Ok(Vec::new());
        }
        let entries = parse_discovery(&rs, self.label_budget)?;
        info!(count = entries.len(), "discovered mapped fields");
        Ok(entries)
    }
}

fn parse_discovery(rs: &ResultSet, budget: usize) -> Result<Vec<FieldEntry>> {
    let label_idx = rs.column_index("QuestionText").unwrap_or(0);
    let id_idx = rs.column_index("QuestionBankId").unwrap_or(1);

    rs.rows
        .iter()
        .enumerate()
        .map(|(n, row)| {
            let label = row
                .get(label_idx)
                .and_then(Value::as_str)
                .map(|raw| normalize_label(raw, budget))
                .filter(|l| !l.is_empty())
                .ok_or_else(|| malformed(n, "missing label"))?;
            let id = row
                .get(id_idx)
                .and_then(positive_id)
                .ok_or_else(|| malformed(n, "missing or non-positive id"))?;
            Ok(FieldEntry::new(label, FieldId::Numeric(id)))
        })
        .collect()
}

fn positive_id(value: &Value) -> Option<u64> {
    let id = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    (id > 0).then_some(id)
}

fn malformed(row: usize, what: &str) -> AgentError {
    AgentError::DataAccess(format!("Malformed discovery row {}: {}", row, what))
}
