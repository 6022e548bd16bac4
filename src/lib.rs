//! segmerge Core Library
//!
//! Fetches the segments of media titles concurrently with bounded retries
//! and reassembles them into one artifact per title: a merged video for
//! transport-stream chunks, a stitched image for comic pages.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`segment`] - Segment identity (`SegmentKey`), jobs and retry entries
//! - [`fetch`] - HTTP segment fetcher with immediate retries
//! - [`coordinator`] - Bounded worker pool with batched retry rounds
//! - [`assemble`] - Natural-order recovery of segments from filenames
//! - [`merge`] - Video concatenation/remux and image composition
//! - [`resolver`] - Manifest resolution seam plus file and playlist resolvers
//! - [`pipeline`] - End-to-end driver producing a per-title report

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod assemble;
pub mod coordinator;
pub mod fetch;
pub mod merge;
pub mod pipeline;
pub mod resolver;
pub mod segment;
mod user_agent;

// Re-export commonly used types
pub use assemble::{AssembleError, SegmentListing, SortStrategy};
pub use coordinator::{
    Coordinator, CoordinatorError, DEFAULT_MAX_PARALLELISM, DEFAULT_RETRY_TIMES, FailedSegment,
    RunReport,
};
pub use fetch::{FetchError, Fetcher, HttpClient, HttpFetcher, RetryPolicy};
pub use merge::{Artifact, MergeError, Remuxer, StackMode};
pub use pipeline::{
    GapPolicy, Pipeline, PipelineError, PipelineOptions, PipelineReport, TitleOutcome, TitleReport,
};
pub use resolver::{
    Manifest, ManifestFileResolver, ManifestResolver, PlaylistResolver, ResolveError,
    TitleManifest,
};
pub use segment::{Job, MediaKind, RetryEntry, SegmentFile, SegmentKey, sanitize_title};
