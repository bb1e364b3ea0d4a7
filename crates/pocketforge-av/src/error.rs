//! Error types for pocketforge-av.

use std::path::PathBuf;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while locating or running the encoder.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No executable encoder was found in any candidate location.
    #[error("{tool} not found (searched {} locations and PATH)", searched.len())]
    EncoderNotFound {
        tool: String,
        searched: Vec<PathBuf>,
    },

    /// The encoder process could not be started.
    #[error("failed to spawn {tool}: {source}")]
    SpawnFailed {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an encoder not found error.
    pub fn encoder_not_found(tool: impl Into<String>, searched: Vec<PathBuf>) -> Self {
        Self::EncoderNotFound {
            tool: tool.into(),
            searched,
        }
    }

    /// Create a spawn failure error.
    pub fn spawn_failed(tool: impl Into<String>, source: std::io::Error) -> Self {
        Self::SpawnFailed {
            tool: tool.into(),
            source,
        }
    }
}
