//! Intent classification: picks the SQL generation strategy for a question.

use crate::catalog::Catalog;
use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryMode {
    DirectLookup,
    SafetyPivot,
    FinancialPivot,
}

impl QueryMode {
    pub fn is_pivot(&self) -> bool {
        !matches!(self, QueryMode::DirectLookup)
    }

    /// Subject name used in reports and error messages.
    pub fn subject(&self) -> Option<ReportSubject> {
        match self {
            QueryMode::DirectLookup => None,
            QueryMode::SafetyPivot => Some(ReportSubject::Safety),
            QueryMode::FinancialPivot => Some(ReportSubject::Financials),
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueryMode::DirectLookup => "DIRECT_LOOKUP",
            QueryMode::SafetyPivot => "SAFETY_PIVOT_MODE",
            QueryMode::FinancialPivot => "FINANCIAL_PIVOT_MODE",
        };
        f.write_str(s)
    }
}

/// Explicitly requested report subject (the `subject=` parameter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportSubject {
    Safety,
    Financials,
}

impl ReportSubject {
    pub fn mode(&self) -> QueryMode {
        match self {
            ReportSubject::Safety => QueryMode::SafetyPivot,
            ReportSubject::Financials => QueryMode::FinancialPivot,
        }
    }
}

impl fmt::Display for ReportSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportSubject::Safety => f.write_str("Safety"),
            ReportSubject::Financials => f.write_str("Financials"),
        }
    }
}

impl FromStr for ReportSubject {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "safety" => Ok(ReportSubject::Safety),
            "financial" | "financials" => Ok(ReportSubject::Financials),
            other => Err(AgentError::InvalidInput(format!("Unknown subject '{}'", other))),
        }
    }
}

/// Keyword-membership classifier.
///
/// Keyword sets are checked in a fixed order and the first set with a hit wins:
/// financial first, then safety. Anything else is a direct field lookup.
pub struct IntentClassifier {
    ordered: Vec<(QueryMode, Vec<String>)>,
}

impl IntentClassifier {
    pub fn new(catalog: &Catalog) -> Self {
        Self {
            ordered: vec![
                (QueryMode::FinancialPivot, lowercase(&catalog.financial_keywords)),
                (QueryMode::SafetyPivot, lowercase(&catalog.safety_keywords)),
            ],
        }
    }

    pub fn classify(&self, question: &str) -> QueryMode {
        let lowered = question.to_lowercase();
        self.ordered
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|kw| lowered.contains(kw.as_str())))
            .map(|(mode, _)| *mode)
            .unwrap_or(QueryMode::DirectLookup)
    }
}

fn lowercase(keywords: &[String]) -> Vec<String> {
    keywords.iter().map(|k| k.to_lowercase()).collect()
}
