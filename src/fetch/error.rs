//! Error types for the fetch module.
//!
//! Every variant carries the URL or path it concerns so that a failure
//! surfaced in a run report is actionable without the surrounding logs.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching one segment.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Non-2xx HTTP response.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error while persisting a segment.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Body ended before the declared content length.
    #[error("truncated body from {url}: expected {expected_bytes} bytes, got {actual_bytes}")]
    Integrity {
        /// The URL whose body was short.
        url: String,
        /// Declared size in bytes.
        expected_bytes: u64,
        /// Received size in bytes.
        actual_bytes: u64,
    },

    /// Transfer succeeded but the body is not a decodable image.
    #[error("body from {url} is not a valid image: {source}")]
    Decode {
        /// The URL whose body failed to decode.
        url: String,
        /// The underlying decoder error.
        #[source]
        source: image::ImageError,
    },

    /// The worker running the fetch died before reporting a result.
    #[error("worker fetching {url} stopped unexpectedly")]
    WorkerLost {
        /// The URL the worker was fetching.
        url: String,
    },
}

impl FetchError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a truncated-body error.
    pub fn integrity(url: impl Into<String>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            url: url.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Creates an image decode error.
    pub fn decode(url: impl Into<String>, source: image::ImageError) -> Self {
        Self::Decode {
            url: url.into(),
            source,
        }
    }

    /// Creates a lost-worker error.
    pub fn worker_lost(url: impl Into<String>) -> Self {
        Self::WorkerLost { url: url.into() }
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: every variant needs a
// url or path the source error does not carry.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_timeout_display() {
        let error = FetchError::timeout("https://cdn.example/seg_1.ts");
        assert!(error.to_string().contains("timeout"));
        assert!(error.to_string().contains("https://cdn.example/seg_1.ts"));
    }

    #[test]
    fn test_fetch_error_http_status_display() {
        let error = FetchError::http_status("https://cdn.example/seg_1.ts", 404);
        let msg = error.to_string();
        assert!(msg.contains("404"), "Expected '404' in: {msg}");
        assert!(msg.contains("seg_1.ts"), "Expected URL in: {msg}");
    }

    #[test]
    fn test_fetch_error_io_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = FetchError::io(PathBuf::from("/tmp/show_1.ts"), io_error);
        assert!(error.to_string().contains("/tmp/show_1.ts"));
    }

    #[test]
    fn test_fetch_error_integrity_display() {
        let error = FetchError::integrity("https://cdn.example/a.ts", 100, 40);
        let msg = error.to_string();
        assert!(msg.contains("100"));
        assert!(msg.contains("40"));
    }

    #[test]
    fn test_fetch_error_decode_display() {
        let source = image::load_from_memory(b"definitely not an image").unwrap_err();
        let error = FetchError::decode("https://cdn.example/p1.jpg", source);
        assert!(error.to_string().contains("not a valid image"));
    }
}
