//! JSON manifest file resolver.
//!
//! The input is a path to a file shaped like
//! `{"titles": [{"title": "...", "segments": ["url", ...]}]}`.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{Manifest, ManifestResolver, ResolveError};

/// Reads manifests from JSON files on disk.
#[derive(Debug, Default)]
pub struct ManifestFileResolver;

impl ManifestFileResolver {
    /// Creates a new `ManifestFileResolver`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ManifestResolver for ManifestFileResolver {
    fn name(&self) -> &'static str {
        "manifest"
    }

    #[instrument(skip(self), fields(resolver = "manifest"))]
    async fn resolve(&self, input: &str) -> Result<Manifest, ResolveError> {
        let path = PathBuf::from(input);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| ResolveError::Read {
                path: path.clone(),
                source,
            })?;

        let manifest: Manifest =
            serde_json::from_str(&raw).map_err(|source| ResolveError::Parse { path, source })?;

        debug!(
            titles = manifest.titles.len(),
            segments = manifest.segment_count(),
            "manifest loaded"
        );
        Ok(manifest)
    }
}
