use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Parse error: {message}")]
    Parse { message: String },

    #[error("API error: {message}")]
    Api { message: String },

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),

    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[cfg(feature = "db")]
    #[error("Database error: {message}")]
    Database { message: String },
}

impl PipelineError {
    /// True when an insert lost a get-or-create race to a concurrent writer.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, PipelineError::UniqueViolation { .. })
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
