//! Error types for skill evaluation.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, SkillEvalError>;

/// Errors that can occur while configuring or running an evaluation.
#[derive(Error, Debug)]
pub enum SkillEvalError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The evaluation configuration is unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No API key available for a run.
    #[error("API key is required")]
    MissingApiKey,

    /// LLM API error.
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// LLM response parsing error.
    #[error("Failed to parse LLM response: {0}")]
    LlmParse(String),

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// A single call exceeded its time budget.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Screenshot server error.
    #[error("Render error: {0}")]
    Render(String),

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stage is already running on this state.
    #[error("An evaluation run is already in progress ({0})")]
    RunInProgress(String),

    /// Judging was requested but no item has both sides generated.
    #[error("No evaluations are ready to judge")]
    NothingToJudge,

    /// The run as a whole failed; settled item results are kept.
    #[error("Run failed: {0}")]
    RunFailed(String),
}

impl SkillEvalError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error was raised before any network call was made.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_) | Self::MissingApiKey | Self::Config(_) | Self::NothingToJudge
        )
    }
}

impl From<reqwest::Error> for SkillEvalError {
    fn from(err: reqwest::Error) -> Self {
        SkillEvalError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for SkillEvalError {
    fn from(err: serde_json::Error) -> Self {
        SkillEvalError::LlmParse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors() {
        assert!(SkillEvalError::MissingApiKey.is_configuration());
        assert!(SkillEvalError::NothingToJudge.is_configuration());
        assert!(!SkillEvalError::LlmApi("boom".into()).is_configuration());
        assert!(!SkillEvalError::Timeout(Duration::from_secs(5)).is_configuration());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            SkillEvalError::Timeout(Duration::from_secs(30)).to_string(),
            "Request timed out after 30s"
        );
        assert_eq!(
            SkillEvalError::Timeout(Duration::from_millis(250)).to_string(),
            "Request timed out after 250ms"
        );
        assert_eq!(SkillEvalError::MissingApiKey.to_string(), "API key is required");
    }
}
