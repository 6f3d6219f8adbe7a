//! Display names for result columns.
//!
//! Raw column labels are often full question texts. Each label resolves through
//! three tiers: exact curated match, curated key starting with the label's first
//! 50 characters, then a readable cut of the label itself.

use crate::catalog::Catalog;

pub const PREFIX_LEN: usize = 50;
pub const FALLBACK_LEN: usize = 50;
const ELLIPSIS: &str = "...";

pub struct HeaderAliaser<'a> {
    aliases: &'a [(String, String)],
}

impl<'a> HeaderAliaser<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            aliases: &catalog.header_aliases,
        }
    }

    pub fn alias(&self, raw: &str) -> String {
        if let Some((_, short)) = self.aliases.iter().find(|(key, _)| key == raw) {
            return short.clone();
        }

        let prefix: String = raw.chars().take(PREFIX_LEN).collect();
        if !prefix.is_empty() {
            if let Some((_, short)) = self.aliases.iter().find(|(key, _)| key.starts_with(&prefix)) {
                return short.clone();
            }
        }

        readable_fallback(raw)
    }

    pub fn alias_columns(&self, raw_labels: &[String]) -> Vec<String> {
        raw_labels.iter().map(|raw| self.alias(raw)).collect()
    }
}

/// Text before the first `:` or `(`, trimmed and capped at 50 characters.
fn readable_fallback(raw: &str) -> String {
    let head = raw.split([':', '(']).next().unwrap_or("").trim();
    let head = if head.is_empty() { raw.trim() } else { head };

    if head.chars().count() > FALLBACK_LEN {
        let cut: String = head.chars().take(FALLBACK_LEN).collect();
        format!("{}{}", cut.trim_end(), ELLIPSIS)
    } else {
        head.to_string()
    }
}

pub fn alias_columns(catalog: &Catalog, raw_labels: &[String]) -> Vec<String> {
    HeaderAliaser::new(catalog).alias_columns(raw_labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_match() {
        let catalog = Catalog::standard();
        let out = alias_columns(&catalog, &labels(&["Total Recordable Incident Rate (TRIR)"]));
        assert_eq!(out, vec!["TRIR"]);
    }

    #[test]
    fn test_prefix_match_on_truncated_label() {
        let catalog = Catalog::standard();
        // Longer than 50 chars and cut short the way a narrow column name would be.
        let raw = "Total number of cases with days away from work (OSHA Form 300 Co";
        assert_eq!(HeaderAliaser::new(&catalog).alias(raw), "Days Away Cases");
    }

    #[test]
    fn test_fallback_cuts_at_colon_or_paren() {
        let catalog = Catalog::standard();
        let aliaser = HeaderAliaser::new(&catalog);
        assert_eq!(aliaser.alias("Vendor"), "Vendor");
        assert_eq!(aliaser.alias("Number of employees: full time"), "Number of employees");
        assert_eq!(aliaser.alias("Hours of training (annual)"), "Hours of training");
    }

    #[test]
    fn test_fallback_keeps_label_with_empty_head() {
        let catalog = Catalog::standard();
        let aliaser = HeaderAliaser::new(&catalog);
        assert_eq!(aliaser.alias("(TRIR)"), "(TRIR)");
        assert_eq!(aliaser.alias("  : totals "), ": totals");
    }

    #[test]
    fn test_fallback_truncates_with_ellipsis() {
        let catalog = Catalog::standard();
        let raw = "Describe every subcontractor safety orientation program that you operate";
        let out = HeaderAliaser::new(&catalog).alias(raw);
        assert!(out.ends_with("..."));
        assert!(out.chars().count() <= FALLBACK_LEN + ELLIPSIS.len());
    }

    #[test]
    fn test_deterministic_and_order_preserving() {
        let catalog = Catalog::standard();
        let raw = labels(&["EMRStatsYear", "Vendor", "Experience Modification Rate (EMR)"]);
        let first = alias_columns(&catalog, &raw);
        let second = alias_columns(&catalog, &raw);
        assert_eq!(first, vec!["Year", "Vendor", "EMR"]);
        assert_eq!(first, second);
    }
}
