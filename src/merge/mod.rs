//! Merging ordered segments into one artifact per title.
//!
//! - [`video`]: byte concatenation into `<title>.ts`, then an optional
//!   stream-copy remux into `<title>.mp4` through an external tool
//! - [`image`]: canvas composition of comic pages into `<title>.png`
//!
//! A [`MergeError`] is fatal for its title only; merges are never retried.

pub mod image;
pub mod video;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub use self::image::{StackMode, canvas_size, compose, merge_images};
pub use self::video::{Remuxer, concat_segments, merge_video};

/// Errors raised while merging one title.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Stacking mode is neither `vertical` nor `horizontal`.
    #[error("invalid merge mode '{value}': expected vertical or horizontal")]
    InvalidMode {
        /// The rejected value.
        value: String,
    },

    /// Nothing to merge.
    #[error("no segments to merge for {title}")]
    NoSegments {
        /// Title that had no segments.
        title: String,
    },

    /// Reading a segment or writing the artifact failed.
    #[error("IO error on {path}: {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A page on disk could not be decoded.
    #[error("cannot decode page {path}: {source}")]
    Decode {
        /// The page file.
        path: PathBuf,
        /// Decoder error.
        #[source]
        source: ::image::ImageError,
    },

    /// The composite could not be encoded.
    #[error("cannot encode {path}: {source}")]
    Encode {
        /// Target path.
        path: PathBuf,
        /// Encoder error.
        #[source]
        source: ::image::ImageError,
    },

    /// The composite would exceed the maximum image dimensions.
    #[error("composite canvas for {count} pages exceeds {max} pixels along the stacking axis")]
    CanvasTooLarge {
        /// Number of pages being stacked.
        count: usize,
        /// Largest supported extent.
        max: u32,
    },

    /// The remux tool could not be started.
    #[error("failed to spawn {program}: {source}")]
    RemuxSpawn {
        /// Program that was run.
        program: String,
        /// Spawn error.
        #[source]
        source: std::io::Error,
    },

    /// The remux tool ran but failed.
    #[error("{program} exited with {status}: {stderr}")]
    RemuxFailed {
        /// Program that was run.
        program: String,
        /// Exit status description.
        status: String,
        /// Trimmed standard error.
        stderr: String,
    },

    /// The remux tool did not finish in time and was killed.
    #[error("{program} timed out after {timeout:?}")]
    RemuxTimeout {
        /// Program that was run.
        program: String,
        /// Configured limit.
        timeout: Duration,
    },

    /// A blocking composition task died.
    #[error("composition task for {title} stopped unexpectedly")]
    TaskFailed {
        /// Title being composed.
        title: String,
    },
}

impl MergeError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an empty-input error.
    pub fn no_segments(title: impl Into<String>) -> Self {
        Self::NoSegments {
            title: title.into(),
        }
    }
}

/// The merged output of one title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Sanitized title.
    pub title: String,
    /// Location of the artifact.
    pub path: PathBuf,
    /// Number of segments merged.
    pub segments: usize,
    /// Indices that were absent at merge time.
    pub missing: Vec<u32>,
}

impl Artifact {
    /// True when the artifact was merged with gaps.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.missing.is_empty()
    }
}
