use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Database error: {0}")]
    DataAccess(String),

    #[error("No matching fields found for this question")]
    ResolutionEmpty,

    #[error("Text generation service unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No data for this subject: {0}")]
    NoSubjectData(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Stable machine-readable code rendered into API error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::DataAccess(_) => "data_access",
            AgentError::ResolutionEmpty => "resolution_empty",
            AgentError::GenerationUnavailable(_) => "generation_unavailable",
            AgentError::InvalidInput(_) => "invalid_input",
            AgentError::NoSubjectData(_) => "no_subject_data",
            AgentError::Config(_) => "config",
            AgentError::Io(_) => "io",
            AgentError::Json(_) => "json",
        }
    }
}

impl From<tiberius::error::Error> for AgentError {
    fn from(err: tiberius::error::Error) -> Self {
        AgentError::DataAccess(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
