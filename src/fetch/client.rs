//! HTTP client wrapper for fetching segments and playlists.
//!
//! This module provides the `HttpClient` struct which handles streaming
//! downloads with timeout configuration and status/length checks.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::CONTENT_LENGTH;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::FetchError;
use crate::user_agent;

/// HTTP client shared by every fetch worker.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a new HTTP client with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new_with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        let client = build_client(connect_timeout_secs, read_timeout_secs)
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Sends a GET request and fails on transport errors or non-2xx status.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidUrl`], [`FetchError::Timeout`],
    /// [`FetchError::Network`] or [`FetchError::HttpStatus`].
    pub async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(url)
            } else {
                FetchError::network(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }

        Ok(response)
    }

    /// Fetches a text document (e.g. a playlist).
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`get`](Self::get), plus [`FetchError::Network`]
    /// if the body cannot be read.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.get(url).await?;
        response.text().await.map_err(|e| map_body_error(url, e))
    }

    /// Fetches a whole body into memory, checking it against `Content-Length`.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`get`](Self::get), plus
    /// [`FetchError::Integrity`] when the body is shorter than declared.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.get(url).await?;
        let expected = declared_length(&response);
        let mut stream = response.bytes_stream();
        let mut body = Vec::with_capacity(
            expected
                .and_then(|len| usize::try_from(len).ok())
                .unwrap_or_default(),
        );

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| map_body_error(url, e))?;
            body.extend_from_slice(&chunk);
        }

        check_length(url, expected, body.len() as u64)?;
        Ok(body)
    }

    /// Streams a body into `file_path`, creating or truncating it.
    ///
    /// The caller owns cleanup of `file_path` on error.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`get`](Self::get), plus [`FetchError::Io`]
    /// for write failures and [`FetchError::Integrity`] for short bodies.
    #[instrument(skip(self), fields(url = %url, path = %file_path.display()))]
    pub async fn stream_to_file(&self, url: &str, file_path: &Path) -> Result<u64, FetchError> {
        let response = self.get(url).await?;
        let expected = declared_length(&response);

        let file = File::create(file_path)
            .await
            .map_err(|e| FetchError::io(file_path, e))?;
        let mut writer = BufWriter::new(file);
        let mut stream = response.bytes_stream();
        let mut bytes_written: u64 = 0;

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| map_body_error(url, e))?;

            writer
                .write_all(&chunk)
                .await
                .map_err(|e| FetchError::io(file_path, e))?;

            bytes_written += chunk.len() as u64;
        }

        writer
            .flush()
            .await
            .map_err(|e| FetchError::io(file_path, e))?;

        check_length(url, expected, bytes_written)?;
        debug!(bytes = bytes_written, "body persisted");
        Ok(bytes_written)
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

fn build_client(
    connect_timeout_secs: u64,
    read_timeout_secs: u64,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .timeout(Duration::from_secs(read_timeout_secs))
        .gzip(true)
        .user_agent(user_agent::default_fetch_user_agent())
        .build()
}

fn map_body_error(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::timeout(url)
    } else {
        FetchError::network(url, error)
    }
}

fn declared_length(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
}

fn check_length(url: &str, expected: Option<u64>, actual: u64) -> Result<(), FetchError> {
    match expected {
        Some(expected) if actual < expected => Err(FetchError::integrity(url, expected, actual)),
        _ => Ok(()),
    }
}
