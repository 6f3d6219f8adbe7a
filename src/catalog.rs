//! Curated, read-only tables shared by every request.
//!
//! A `Catalog` is built once at startup and passed around behind an `Arc`.
//! Tests construct their own instead of relying on the standard one.

use crate::knowledge_base::{FieldEntry, FieldId, StaticTag};

/// Source expression for a static tag in the direct-lookup query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticColumn {
    pub tag: StaticTag,
    /// Column expression over the fixed join graph (`H`, `P`, `O` aliases).
    pub expression: String,
    pub alias: String,
}

/// Discovery terms for one pivot report subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotTerms {
    pub like_terms: Vec<String>,
    /// Labels containing this substring are left out of the pivot.
    pub noise_term: String,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    pub overrides: Vec<FieldEntry>,
    pub static_columns: Vec<StaticColumn>,
    pub safety_keywords: Vec<String>,
    pub financial_keywords: Vec<String>,
    pub safety_terms: PivotTerms,
    pub financial_terms: PivotTerms,
    pub header_aliases: Vec<(String, String)>,
}

impl Catalog {
    pub fn standard() -> Self {
        let overrides = vec![
            ("Tax ID", FieldId::Static(StaticTag::TaxId)),
            ("Company Name", FieldId::Static(StaticTag::OrgName)),
            ("Document Name", FieldId::Static(StaticTag::DocName)),
            ("Producer Name", FieldId::Numeric(55)),
            ("Insurer Name", FieldId::Numeric(104)),
            ("GL Occurrence Limit", FieldId::Numeric(19)),
            ("GL Aggregate Limit", FieldId::Numeric(18)),
            ("Auto Combined Limit", FieldId::Numeric(20)),
            ("Umbrella Limit", FieldId::Numeric(21)),
            ("Workers Comp Limit", FieldId::Numeric(22)),
        ]
        .into_iter()
        .map(|(name, id)| FieldEntry::new(name, id))
        .collect();

        let static_columns = vec![
            StaticColumn {
                tag: StaticTag::TaxId,
                expression: "O.TaxID".to_string(),
                alias: "Tax_Identification_Number".to_string(),
            },
            StaticColumn {
                tag: StaticTag::OrgName,
                expression: "O.Name".to_string(),
                alias: "Company_Name".to_string(),
            },
            StaticColumn {
                tag: StaticTag::DocName,
                expression: "H.DocumentName".to_string(),
                alias: "Document_Name".to_string(),
            },
        ];

        Self {
            overrides,
            static_columns,
            safety_keywords: strings(&[
                "safety", "osha", "emr", "fatality", "rir", "trir", "dart", "lost",
                "restricted", "work day",
            ]),
            financial_keywords: strings(&[
                "revenue", "worth", "financial", "limit", "aggregate", "insurance",
                "liability", "premium", "net", "annual", "bodily", "property", "coverage",
                "carrier", "benefit",
            ]),
            safety_terms: PivotTerms {
                like_terms: strings(&["OSHA", "Recordable", "fatalit", "Work Day", "TRIR", "DART"]),
                noise_term: "Please explain".to_string(),
            },
            financial_terms: PivotTerms {
                like_terms: strings(&[
                    "Revenue", "Net Worth", "Annual", "Sales", "Financial", "Insurance",
                    "Liability", "Premium", "Coverage", "Aggregate",
                ]),
                noise_term: "Please explain".to_string(),
            },
            header_aliases: vec![
                ("Total Recordable Incident Rate (TRIR)", "TRIR"),
                ("Days Away, Restricted or Transferred (DART) Rate", "DART Rate"),
                ("Experience Modification Rate (EMR)", "EMR"),
                ("Number of Fatalities", "Fatalities"),
                ("Total number of OSHA recordable cases", "OSHA Recordables"),
                (
                    "Total number of cases with days away from work (OSHA Form 300 Column H)",
                    "Days Away Cases",
                ),
                (
                    "Total number of cases with job transfer or restriction (OSHA Form 300 Column I)",
                    "Restricted Cases",
                ),
                (
                    "Total number of other recordable cases (OSHA Form 300 Column J)",
                    "Other Recordables",
                ),
                ("Total hours worked by all employees", "Hours Worked"),
                ("Lost Work Day Cases", "Lost Work Days"),
                ("Vendor", "Vendor"),
                ("EMR", "EMR"),
                ("EMRStatsYear", "Year"),
                ("Annual Revenue", "Annual Revenue"),
                ("Net Worth", "Net Worth"),
                ("General Liability Each Occurrence Limit", "GL Occurrence Limit"),
                ("General Liability General Aggregate Limit", "GL Aggregate Limit"),
                ("Automobile Liability Combined Single Limit", "Auto Combined Limit"),
                ("Umbrella / Excess Liability Each Occurrence Limit", "Umbrella Limit"),
            ]
            .into_iter()
            .map(|(raw, short)| (raw.to_string(), short.to_string()))
            .collect(),
        }
    }

    pub fn static_column(&self, tag: StaticTag) -> Option<&StaticColumn> {
        self.static_columns.iter().find(|c| c.tag == tag)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::standard()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
