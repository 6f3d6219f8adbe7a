pub mod api;
pub mod catalog;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod header_alias;
pub mod intent;
pub mod knowledge_base;
pub mod llm;
pub mod pivot;
pub mod relevance;
pub mod resolver;
pub mod sql_compiler;

pub use catalog::Catalog;
pub use engine::{GeneratedQuery, QueryAgent, Question, ReportResult};
pub use error::{AgentError, Result};
pub use intent::{QueryMode, ReportSubject};
