//! The segment fetcher: one segment in, one file out.
//!
//! [`HttpFetcher`] streams a segment body into a hidden part file next to its
//! final location and renames it into place only once the body is complete
//! (and, for comic pages, decodes as an image). A failed fetch therefore
//! never leaves a file the assembler could mistake for a finished segment.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::ImageFormat;
use tracing::{debug, info, instrument};

use super::constants::PART_SUFFIX;
use super::retry::{RetryDecision, RetryPolicy, classify_error};
use super::{FetchError, HttpClient};
use crate::segment::{MediaKind, SegmentKey};

/// Fetches one segment into a destination directory.
///
/// One call is one attempt from the coordinator's point of view; any
/// immediate retries an implementation performs happen inside the call.
///
/// # Object Safety
///
/// Uses `async_trait` so the coordinator can hold an `Arc<dyn Fetcher>`.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Extension of the files this fetcher writes.
    fn extension(&self) -> &str;

    /// Fetches `url` and persists it as `key`'s file inside `destination`.
    ///
    /// Writes exactly one file on success and nothing on failure.
    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        key: &SegmentKey,
    ) -> Result<PathBuf, FetchError>;
}

/// HTTP-backed [`Fetcher`] with fixed-delay micro-retries.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: HttpClient,
    media: MediaKind,
    policy: RetryPolicy,
}

impl HttpFetcher {
    /// Creates a fetcher for `media` segments.
    #[must_use]
    pub fn new(client: HttpClient, media: MediaKind, policy: RetryPolicy) -> Self {
        Self {
            client,
            media,
            policy,
        }
    }

    /// Returns the micro-retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Returns the media kind this fetcher validates for.
    #[must_use]
    pub fn media(&self) -> MediaKind {
        self.media
    }

    async fn fetch_once(&self, url: &str, final_path: &Path) -> Result<(), FetchError> {
        let part_path = part_path_for(final_path);

        let result = match self.media {
            MediaKind::Video => self
                .client
                .stream_to_file(url, &part_path)
                .await
                .map(|_| ()),
            MediaKind::Image => self.fetch_image(url, &part_path).await,
        };

        match result {
            Ok(()) => tokio::fs::rename(&part_path, final_path)
                .await
                .map_err(|e| FetchError::io(final_path, e)),
            Err(e) => {
                debug!(path = %part_path.display(), "cleaning up part file after error");
                let _ = tokio::fs::remove_file(&part_path).await;
                Err(e)
            }
        }
    }

    async fn fetch_image(&self, url: &str, part_path: &Path) -> Result<(), FetchError> {
        let body = self.client.get_bytes(url).await?;

        let owned_url = url.to_string();
        let encoded = tokio::task::spawn_blocking(move || reencode_as_png(&owned_url, &body))
            .await
            .map_err(|_| FetchError::worker_lost(url))??;

        tokio::fs::write(part_path, encoded)
            .await
            .map_err(|e| FetchError::io(part_path, e))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn extension(&self) -> &str {
        self.media.segment_extension()
    }

    #[instrument(skip(self, destination), fields(url = %url, segment = %key))]
    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        key: &SegmentKey,
    ) -> Result<PathBuf, FetchError> {
        tokio::fs::create_dir_all(destination)
            .await
            .map_err(|e| FetchError::io(destination, e))?;

        let final_path = destination.join(key.file_name(self.extension()));
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(attempt, "attempting fetch");

            match self.fetch_once(url, &final_path).await {
                Ok(()) => {
                    info!(path = %final_path.display(), attempt, "segment fetched");
                    return Ok(final_path);
                }
                Err(e) => match self.policy.should_retry(classify_error(&e), attempt) {
                    RetryDecision::Retry {
                        delay,
                        attempt: next_attempt,
                    } => {
                        debug!(
                            attempt = next_attempt,
                            max_attempts = self.policy.max_attempts(),
                            delay_ms = delay.as_millis(),
                            error = %e,
                            "retrying fetch"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        debug!(%reason, error = %e, "not retrying fetch");
                        return Err(e);
                    }
                },
            }
        }
    }
}

/// Hidden sibling used while a body is in flight: `dir/.name.part`.
fn part_path_for(final_path: &Path) -> PathBuf {
    let name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    final_path.with_file_name(format!(".{name}.{PART_SUFFIX}"))
}

fn reencode_as_png(url: &str, body: &[u8]) -> Result<Vec<u8>, FetchError> {
    let decoded = image::load_from_memory(body).map_err(|e| FetchError::decode(url, e))?;
    let mut buf = Cursor::new(Vec::new());
    decoded
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| FetchError::decode(url, e))?;
    Ok(buf.into_inner())
}
