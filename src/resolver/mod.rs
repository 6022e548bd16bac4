//! Manifest resolution: turning an input into `{title -> segment URLs}`.
//!
//! Site-specific extraction lives outside this crate. Anything that can
//! produce a [`Manifest`] plugs in through the [`ManifestResolver`] trait;
//! two site-agnostic implementations ship here:
//!
//! - [`ManifestFileResolver`] - reads a JSON manifest file
//! - [`PlaylistResolver`] - expands an HLS media playlist URL
//!
//! # Example
//!
//! ```no_run
//! use segmerge_core::resolver::{ManifestFileResolver, ManifestResolver};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = ManifestFileResolver::new();
//! let manifest = resolver.resolve("episodes.json").await?;
//! for title in &manifest.titles {
//!     println!("{}: {} segments", title.title, title.segments.len());
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod manifest_file;
mod playlist;

pub use error::ResolveError;
pub use manifest_file::ManifestFileResolver;
pub use playlist::PlaylistResolver;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One title and its segment URLs, in playback/reading order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleManifest {
    /// Display title; sanitized before it touches the filesystem.
    pub title: String,
    /// Segment URLs. May be empty.
    #[serde(default)]
    pub segments: Vec<String>,
}

impl TitleManifest {
    /// Creates a title entry.
    #[must_use]
    pub fn new(title: impl Into<String>, segments: Vec<String>) -> Self {
        Self {
            title: title.into(),
            segments,
        }
    }
}

/// Ordered list of titles resolved from one input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Titles in the order the source listed them.
    #[serde(default)]
    pub titles: Vec<TitleManifest>,
}

impl Manifest {
    /// Creates a manifest from its titles.
    #[must_use]
    pub fn new(titles: Vec<TitleManifest>) -> Self {
        Self { titles }
    }

    /// Total number of segment URLs across all titles.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.titles.iter().map(|t| t.segments.len()).sum()
    }

    /// Appends every title of `other`.
    pub fn extend(&mut self, other: Manifest) {
        self.titles.extend(other.titles);
    }
}

/// Resolves one input (a path, a URL, a page) into a [`Manifest`].
///
/// # Object Safety
///
/// Uses `async_trait` so the pipeline can hold a `Box<dyn ManifestResolver>`.
#[async_trait]
pub trait ManifestResolver: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Resolves `input`.
    ///
    /// A manifest with zero titles, or titles with zero segments, is a valid
    /// answer; [`ResolveError`] is reserved for inputs that yield nothing
    /// usable at all.
    async fn resolve(&self, input: &str) -> Result<Manifest, ResolveError>;
}
