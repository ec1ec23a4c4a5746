//! Error types for the Hearth conversation core.
//!
//! None of these reach the end user: `Pipeline::process_utterance` maps every failure onto a
//! supportive fallback reply. They exist so each stage can report what went wrong to the logs.

use thiserror::Error;

/// Result type alias for pipeline operations
pub type HearthResult<T> = Result<T, HearthError>;

/// Errors raised by classifiers, generators, corpora and configuration.
#[derive(Error, Debug)]
pub enum HearthError {
    #[error("Detector '{name}' failed: {reason}")]
    Detector { name: String, reason: String },

    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Template pool '{0}' resolved to no usable entries")]
    EmptyPool(String),

    #[error("Entity extraction failed: {0}")]
    EntityExtraction(String),

    #[error("Corpus error: {0}")]
    Corpus(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session '{0}' lock poisoned")]
    SessionPoisoned(String),

    #[error("Channel send error: {0}")]
    ChannelSend(String),
}

impl HearthError {
    pub fn detector(name: impl Into<String>, reason: impl Into<String>) -> Self {
        HearthError::Detector {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
