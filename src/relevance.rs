//! Narrows the knowledge base to entries that share words with the question.

use crate::knowledge_base::{FieldEntry, KnowledgeBase};

/// Tokens this short carry no signal ("is", "of", "GL").
const MIN_TOKEN_LEN: usize = 3;

/// Grounding context handed to the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelevantContext {
    pub entries: Vec<FieldEntry>,
    /// True when nothing matched and the curated overrides were used instead.
    pub fell_back: bool,
}

impl RelevantContext {
    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(FieldEntry::to_line).collect()
    }
}

pub fn question_tokens(question: &str) -> Vec<String> {
    question
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
        .map(str::to_string)
        .collect()
}

/// Keep entries whose lower-cased label contains any question token.
/// Never returns an empty context: with no overlap it falls back to `overrides`.
pub fn filter(kb: &KnowledgeBase, question: &str, overrides: &[FieldEntry]) -> RelevantContext {
    let tokens = question_tokens(question);

    let entries: Vec<FieldEntry> = kb
        .entries()
        .into_iter()
        .filter(|entry| {
            let label = entry.name.to_lowercase();
            tokens.iter().any(|t| label.contains(t.as_str()))
        })
        .collect();

    if entries.is_empty() {
        RelevantContext {
            entries: overrides.to_vec(),
            fell_back: true,
        }
    } else {
        RelevantContext {
            entries,
            fell_back: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::knowledge_base::FieldId;

    fn small_kb() -> KnowledgeBase {
        let mut kb = KnowledgeBase::new();
        kb.insert("Producer Name", FieldId::Numeric(55));
        kb.insert("Insurer Name", FieldId::Numeric(104));
        kb
    }

    #[test]
    fn test_matches_producer_only() {
        let catalog = Catalog::standard();
        let ctx = filter(&small_kb(), "Who is the Producer?", &catalog.overrides);

        assert!(!ctx.fell_back);
        assert_eq!(ctx.entries, vec![FieldEntry::new("Producer Name", FieldId::Numeric(55))]);
        assert_eq!(ctx.lines(), vec!["Producer Name -> 55".to_string()]);
    }

    #[test]
    fn test_no_overlap_falls_back_to_overrides() {
        let catalog = Catalog::standard();
        let ctx = filter(&small_kb(), "xyz qqq", &catalog.overrides);

        assert!(ctx.fell_back);
        assert_eq!(ctx.entries, catalog.overrides);
    }

    #[test]
    fn test_short_tokens_are_ignored() {
        // "GL" and "of" are too short to match anything on their own.
        let tokens = question_tokens("GL of Umbrella, limit?");
        assert_eq!(tokens, vec!["umbrella".to_string(), "limit".to_string()]);
    }

    #[test]
    fn test_static_fields_are_kept() {
        let kb = crate::knowledge_base::merge(Vec::new(), &Catalog::standard().overrides);
        let ctx = filter(&kb, "What is the tax id and company name", &[]);
        let names: Vec<&str> = ctx.entries.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"Tax ID"));
        assert!(names.contains(&"Company Name"));
        assert!(names.contains(&"Producer Name"));
        assert!(!names.contains(&"Umbrella Limit"));
    }
}
