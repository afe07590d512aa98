//! Error taxonomy for agent loading, transcript persistence and backend calls.
//!
//! Only `Config`, `AgentNotFound` and `DescriptionNotFound` are fatal: they
//! abort agent construction. `TranscriptFormat` is recovered by the agent
//! (empty history plus a warning) and `EmotionParse` never leaves the emotion
//! estimator. `Backend` surfaces to the caller of `chat`/`regenerate` when it
//! comes from the main completion stream.

use std::path::PathBuf;

pub type Result<T, E = AgentError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("invalid agent config {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error(
        "agent '{name}' does not exist. Please create a config file at '{}'",
        path.display()
    )]
    AgentNotFound { name: String, path: PathBuf },

    #[error("description file not found: {}", .0.display())]
    DescriptionNotFound(PathBuf),

    #[error("invalid transcript format in {}: {message}", path.display())]
    TranscriptFormat { path: PathBuf, message: String },

    #[error("{provider} backend error: {message}")]
    Backend {
        provider: &'static str,
        message: String,
    },

    #[error("could not parse emotion from reply {0:?}")]
    EmotionParse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    pub fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn backend(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            provider,
            message: message.into(),
        }
    }

    /// Whether this error must abort agent construction.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::AgentNotFound { .. } | Self::DescriptionNotFound(_)
        )
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        Self::backend("http", e.to_string())
    }
}
