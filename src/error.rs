use thiserror::Error;

use crate::fingerprint::Fingerprint;

/// Errors surfaced by pipeline construction and execution
///
/// Serialization failures are normally recovered inside the cache engine;
/// the variant exists so executors and stores can report them uniformly.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Step {index} failed: {message}")]
    Execution { index: usize, message: String },

    #[error("Failed to serialize context: {0}")]
    Serialization(String),

    #[error("Failed to restore context from snapshot {fingerprint}: {message}")]
    Restore {
        fingerprint: Fingerprint,
        message: String,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_step_index() {
        let err = Error::Execution {
            index: 3,
            message: "division by zero".to_string(),
        };
        assert_eq!(err.to_string(), "Step 3 failed: division by zero");
    }
}
