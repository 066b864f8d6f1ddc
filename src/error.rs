use thiserror::Error;

/// Failure taxonomy shared by every collaborator and by the orchestrator.
///
/// Collaborators translate their native failures into one of these variants
/// at the boundary; nothing downstream inspects error text to decide what to do.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoryboardError {
    /// The backing service is categorically unusable (missing or rejected credentials).
    #[error("service not configured: {0}")]
    NotConfigured(String),

    /// The service reported throttling.
    #[error("rate limit reached")]
    RateLimited,

    /// The caller invoked an operation whose preconditions do not hold.
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("{0}")]
    Generic(String),
}

impl StoryboardError {
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic(message.into())
    }

    /// Errors that stop the rest of a run instead of being absorbed per scene.
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, Self::NotConfigured(_) | Self::RateLimited)
    }
}

impl From<reqwest::Error> for StoryboardError {
    fn from(err: reqwest::Error) -> Self {
        Self::Generic(format!("HTTP request error: {}", err))
    }
}

impl From<serde_json::Error> for StoryboardError {
    fn from(err: serde_json::Error) -> Self {
        Self::Generic(format!("JSON parsing error: {}", err))
    }
}

impl From<std::io::Error> for StoryboardError {
    fn from(err: std::io::Error) -> Self {
        Self::Generic(format!("IO error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, StoryboardError>;
