//! Errors surfaced by the command line tool.

use thiserror::Error;

use crate::logging::LoggingError;

/// Errors that end the process with a non-zero status.
#[derive(Debug, Error)]
pub enum CliError {
    /// No playlist URL on the command line.
    #[error("Playlist URL wasn't provided.")]
    MissingPlaylist,

    /// Error from the download library.
    #[error(transparent)]
    Core(#[from] tubetracks_core::Error),

    /// Logging could not be set up.
    #[error(transparent)]
    Logging(#[from] LoggingError),

    /// The default temporary destination could not be created.
    #[error("Failed to create temporary directory: {0}")]
    TempDir(#[source] std::io::Error),

    /// A progress event could not be written as JSON.
    #[error("Failed to encode progress event: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map the library's usage error onto the CLI's own message.
    pub fn from_reference_error(error: tubetracks_core::Error) -> Self {
        match error {
            tubetracks_core::Error::MissingPlaylistReference => Self::MissingPlaylist,
            other => Self::Core(other),
        }
    }

    /// Whether the error is about how the tool was invoked. Those go to stdout.
    pub const fn is_usage(&self) -> bool {
        matches!(self, Self::MissingPlaylist)
    }

    /// The one line printed when the process exits with this error.
    pub fn exit_message(&self) -> String {
        if self.is_usage() {
            self.to_string()
        } else {
            format!("Error: {self}")
        }
    }
}
