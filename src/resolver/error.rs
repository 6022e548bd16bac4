//! Errors for manifest resolution.

use std::path::PathBuf;

use thiserror::Error;

use crate::fetch::FetchError;

/// An input that produced no usable manifest.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The manifest file could not be read.
    #[error("cannot read manifest {path}: {source}")]
    Read {
        /// Manifest path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest file is not valid JSON of the expected shape.
    #[error("malformed manifest {path}: {source}")]
    Parse {
        /// Manifest path.
        path: PathBuf,
        /// Deserialization error.
        #[source]
        source: serde_json::Error,
    },

    /// The playlist could not be fetched.
    #[error("cannot fetch playlist: {0}")]
    Fetch(#[from] FetchError),

    /// The input is not a URL the resolver can work with.
    #[error("invalid playlist URL '{input}': {reason}")]
    InvalidInput {
        /// The rejected input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The playlist lists no segments.
    #[error("playlist {url} contains no segments")]
    EmptyPlaylist {
        /// Playlist URL.
        url: String,
    },
}

impl ResolveError {
    /// Creates an invalid-input error.
    pub fn invalid_input(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            input: input.into(),
            reason: reason.into(),
        }
    }
}
