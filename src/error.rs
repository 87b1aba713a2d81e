use thiserror::Error;

#[derive(Error, Debug)]
pub enum AyavidError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Exhausted(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Unable to download {link}: status {status}")]
    Download { link: String, status: u16 },

    #[error("Media processing failed: {0}")]
    Media(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("Stage {stage} timed out after {seconds}s")]
    Timeout { stage: String, seconds: u64 },

    #[error("Job cancelled")]
    Cancelled,

    #[error("Job task failed: {0}")]
    TaskFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AyavidError {
    /// Whether the error carries a user-safe description from the collaborator
    /// that raised it.
    pub fn is_named(&self) -> bool {
        matches!(
            self,
            AyavidError::InvalidRequest(_) | AyavidError::NotFound(_) | AyavidError::Exhausted(_)
        )
    }

    /// Message written into a failed job's status record.
    ///
    /// Unnamed failures are stringified as-is; their wording is diagnostic only.
    pub fn status_message(&self) -> String {
        match self {
            AyavidError::InvalidRequest(msg)
            | AyavidError::NotFound(msg)
            | AyavidError::Exhausted(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AyavidError>;
