//! HLS media playlist resolver.
//!
//! Fetches a playlist and lists every URI line as one segment, resolved
//! against the playlist URL. Tags and comments (`#...`) and blank lines are
//! skipped. A single playlist yields a single title.

use async_trait::async_trait;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{Manifest, ManifestResolver, ResolveError, TitleManifest};
use crate::fetch::HttpClient;

/// Title used when the playlist URL has no usable directory segment.
const FALLBACK_TITLE: &str = "playlist";

/// Expands an HLS media playlist URL into one title.
#[derive(Debug, Clone, Default)]
pub struct PlaylistResolver {
    client: HttpClient,
    title: Option<String>,
}

impl PlaylistResolver {
    /// Creates a resolver fetching playlists with `client`.
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            title: None,
        }
    }

    /// Uses `title` instead of deriving one from the playlist URL.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Directory name the playlist sits in: `/a/show/index.m3u8` -> `show`.
fn title_from_url(url: &Url) -> String {
    url.path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect::<Vec<_>>())
        .and_then(|segments| {
            segments
                .len()
                .checked_sub(2)
                .and_then(|i| segments.get(i).map(|s| (*s).to_string()))
        })
        .unwrap_or_else(|| FALLBACK_TITLE.to_string())
}

/// Segment URLs listed in `body`, in playlist order.
fn segment_urls(base: &Url, body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| match base.join(line) {
            Ok(url) => Some(url.to_string()),
            Err(e) => {
                warn!(line, error = %e, "skipping unresolvable playlist entry");
                None
            }
        })
        .collect()
}

#[async_trait]
impl ManifestResolver for PlaylistResolver {
    fn name(&self) -> &'static str {
        "playlist"
    }

    #[instrument(skip(self), fields(resolver = "playlist"))]
    async fn resolve(&self, input: &str) -> Result<Manifest, ResolveError> {
        let base = Url::parse(input).map_err(|e| ResolveError::invalid_input(input, e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ResolveError::invalid_input(
                input,
                format!("unsupported scheme '{}'", base.scheme()),
            ));
        }

        let body = self.client.get_text(input).await?;
        let segments = segment_urls(&base, &body);
        if segments.is_empty() {
            return Err(ResolveError::EmptyPlaylist {
                url: input.to_string(),
            });
        }

        let title = self.title.clone().unwrap_or_else(|| title_from_url(&base));
        debug!(%title, segments = segments.len(), "playlist expanded");
        Ok(Manifest::new(vec![TitleManifest::new(title, segments)]))
    }
}
