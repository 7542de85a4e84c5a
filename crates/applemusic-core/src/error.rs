//! Error type shared by the resolution, cache and mutation layers

use thiserror::Error;

/// Errors surfaced by core operations
#[derive(Error, Debug)]
pub enum MusicError {
    /// Malformed or empty input, rejected before any external call
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// No source could resolve the selector to any identifier
    #[error("Track not found: {selector}")]
    NotFound { selector: String },

    /// Batch-item level miss, reported per item instead of aborting
    #[error("Track not found: {0}")]
    TrackNotFound(String),

    /// The mutation was accepted but a re-read still disagrees
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// An external collaborator failed or timed out
    #[error("{source_name} unavailable: {message}")]
    SourceUnavailable {
        source_name: &'static str,
        message: String,
    },

    /// A list/array selector could not be interpreted
    #[error("Ambiguous selector: {0}")]
    AmbiguousSelector(String),

    /// The chosen backing store does not offer the operation
    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MusicError {
    pub fn remote(err: impl std::fmt::Display) -> Self {
        Self::SourceUnavailable {
            source_name: "Apple Music API",
            message: err.to_string(),
        }
    }

    pub fn local(err: impl std::fmt::Display) -> Self {
        Self::SourceUnavailable {
            source_name: "Music.app",
            message: err.to_string(),
        }
    }

    pub fn not_found(selector: impl Into<String>) -> Self {
        Self::NotFound {
            selector: selector.into(),
        }
    }
}

/// Convenience Result type using [`MusicError`]
pub type Result<T> = std::result::Result<T, MusicError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_carries_selector() {
        let err = MusicError::not_found("Hey Jude by The Beatles");
        assert_eq!(err.to_string(), "Track not found: Hey Jude by The Beatles");
    }

    #[test]
    fn test_source_unavailable_names_source() {
        let err = MusicError::remote("status 503");
        assert_eq!(err.to_string(), "Apple Music API unavailable: status 503");
        let err = MusicError::local("timed out");
        assert!(err.to_string().starts_with("Music.app unavailable"));
    }
}
