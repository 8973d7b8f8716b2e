//! Error types for Tubetracks core operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Tubetracks core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No playlist reference was supplied.
    #[error("Playlist URL wasn't provided")]
    MissingPlaylistReference,

    /// The playlist reference could not be understood by the source.
    #[error("Invalid playlist reference {reference}: {reason}")]
    InvalidPlaylistReference {
        /// The offending reference.
        reference: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The destination directory does not exist or is not a directory.
    #[error("Destination directory not found: {0}")]
    DestinationNotFound(PathBuf),

    /// Resolving a playlist reference failed.
    #[error("Failed to fetch {reference}: {reason}")]
    Fetch {
        /// The reference being resolved.
        reference: String,
        /// Error detail reported by the source.
        reason: String,
    },

    /// Resolving a playlist reference did not finish in time.
    #[error("Fetching {reference} timed out after {secs}s")]
    FetchTimeout {
        /// The reference being resolved.
        reference: String,
        /// The timeout that elapsed.
        secs: u64,
    },

    /// The playlist exists but has no entries.
    #[error("Playlist has no entries: {0}")]
    EmptyPlaylist(String),

    /// The source byte stream failed while it was being consumed.
    #[error("Stream failed for '{title}': {reason}")]
    Stream {
        /// Title of the item whose stream failed.
        title: String,
        /// Error detail.
        reason: String,
    },

    /// The encoder reported a failure.
    #[error("Encoding {path} failed: {reason}")]
    Encode {
        /// The output file the encoder was writing.
        path: PathBuf,
        /// Error detail reported by the encoder.
        reason: String,
    },

    /// The encoder binary could not be located.
    #[error("Encoder binary not found: {0}")]
    EncoderNotFound(String),

    /// The operation was cancelled.
    #[error("Download cancelled")]
    Cancelled,

    /// A background download task ended abnormally.
    #[error("Download task failed: {0}")]
    TaskFailed(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// File system operation failed.
    #[error("File system error at {path}: {message}")]
    FileSystem {
        /// Path where the error occurred.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error comes from how the session was invoked rather than
    /// from an individual playlist item.
    #[must_use]
    pub const fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::MissingPlaylistReference
                | Self::InvalidPlaylistReference { .. }
                | Self::DestinationNotFound(_)
        )
    }

    pub(crate) fn fetch(reference: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Fetch {
            reference: reference.into(),
            reason: reason.to_string(),
        }
    }
}
