//! Field resolution: asks the generation service which known fields a question
//! refers to, then reads identifiers back out of whatever text it returns.

use crate::knowledge_base::StaticTag;
use crate::llm::{strip_markers, TextGenerator};
use crate::relevance::RelevantContext;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Keeps the prompt bounded no matter how much of the knowledge base matched.
pub const MAX_CONTEXT_LINES: usize = 150;

lazy_static! {
    static ref DIGIT_RUN: Regex = Regex::new(r"\d+").unwrap();
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedFields {
    pub identifiers: BTreeSet<u64>,
    pub static_tags: BTreeSet<StaticTag>,
}

impl ResolvedFields {
    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty() && self.static_tags.is_empty()
    }
}

pub fn build_prompt(question: &str, context: &RelevantContext) -> String {
    let lines: Vec<String> = context
        .lines()
        .into_iter()
        .take(MAX_CONTEXT_LINES)
        .collect();

    format!(
        "[INST] You map report field names to identifiers.\n\
         KNOWLEDGE BASE (name -> identifier):\n{}\n\n\
         User question: '{}'\n\n\
         Rules:\n\
         1. Output ONLY identifiers or Static_ tags from the KNOWLEDGE BASE, comma-separated.\n\
         2. Do not explain and do not invent identifiers.\n\
         3. If nothing matches, output 0. [/INST]",
        lines.join("\n"),
        question.trim()
    )
}

/// Pull identifiers and static tags out of raw generation output.
///
/// Every maximal digit run is a candidate identifier except zero and the
/// extraction id itself, which commonly appears in the question text.
pub fn parse_response(raw: &str, extraction_id: u64) -> ResolvedFields {
    let text = strip_markers(raw);

    let identifiers = DIGIT_RUN
        .find_iter(&text)
        .filter_map(|m| m.as_str().parse::<u64>().ok())
        .filter(|id| *id != 0 && *id != extraction_id)
        .collect();

    let static_tags = StaticTag::ALL
        .into_iter()
        .filter(|tag| text.contains(tag.tag()))
        .collect();

    ResolvedFields {
        identifiers,
        static_tags,
    }
}

pub struct FieldResolver {
    generator: Arc<dyn TextGenerator>,
}

impl FieldResolver {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Never fails; an unreachable generation service resolves to nothing.
    pub async fn resolve(
        &self,
        question: &str,
        context: &RelevantContext,
        extraction_id: u64,
    ) -> ResolvedFields {
        let prompt = build_prompt(question, context);
        let raw = match self.generator.complete(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "field resolution degraded to empty");
                return ResolvedFields::default();
            }
        };
        let resolved = parse_response(&raw, extraction_id);
        debug!(
            identifiers = ?resolved.identifiers,
            static_tags = ?resolved.static_tags,
            "resolved fields"
        );
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AgentError, Result};
    use crate::knowledge_base::{FieldEntry, FieldId};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Recording {
        reply: Result<String>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextGenerator for Recording {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match &self.reply {
                Ok(s) => Ok(s.clone()),
                Err(_) => Err(AgentError::GenerationUnavailable("503".into())),
            }
        }
    }

    fn context() -> RelevantContext {
        RelevantContext {
            entries: vec![FieldEntry::new("Producer Name", FieldId::Numeric(55))],
            fell_back: false,
        }
    }

    #[test]
    fn test_extraction_id_is_not_an_identifier() {
        let resolved = parse_response("55, 501", 501);
        assert_eq!(resolved.identifiers, BTreeSet::from([55]));
    }

    #[test]
    fn test_zero_means_nothing() {
        let resolved = parse_response("0", 100);
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_ids_are_sorted_and_deduplicated() {
        let resolved = parse_response("104, 19, 55, 19 <|eot_id|>", 7);
        assert_eq!(resolved.identifiers.into_iter().collect::<Vec<_>>(), vec![19, 55, 104]);
    }

    #[test]
    fn test_static_tags_detected_in_text() {
        let resolved = parse_response("Static_OrgName, Static_TaxID", 1);
        assert!(resolved.identifiers.is_empty());
        assert_eq!(
            resolved.static_tags,
            BTreeSet::from([StaticTag::TaxId, StaticTag::OrgName])
        );
    }

    #[test]
    fn test_prompt_embeds_context_and_constraints() {
        let prompt = build_prompt("Who is the Producer?", &context());
        assert!(prompt.contains("Producer Name -> 55"));
        assert!(prompt.contains("Who is the Producer?"));
        assert!(prompt.contains("output 0"));
    }

    #[tokio::test]
    async fn test_resolve_uses_generator_reply() {
        let generator = Arc::new(Recording {
            reply: Ok("I found ID 55.".to_string()),
            prompts: Mutex::new(Vec::new()),
        });
        let resolver = FieldResolver::new(generator.clone());
        let resolved = resolver.resolve("Who is the Producer?", &context(), 100).await;

        assert_eq!(resolved.identifiers, BTreeSet::from([55]));
        assert_eq!(generator.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_degrades_when_service_fails() {
        let generator = Arc::new(Recording {
            reply: Err(AgentError::GenerationUnavailable("down".into())),
            prompts: Mutex::new(Vec::new()),
        });
        let resolver = FieldResolver::new(generator);
        let resolved = resolver.resolve("Who is the Producer?", &context(), 100).await;
        assert!(resolved.is_empty());
    }
}
