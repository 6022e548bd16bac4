//! Segment fetching over HTTP.
//!
//! # Features
//!
//! - Streaming downloads written through a hidden part file and renamed on success
//! - Image validation (decode + PNG re-encode) for comic pages
//! - Fixed-delay micro-retries for transient failures
//! - Structured error types with full context
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use segmerge_core::fetch::{Fetcher, HttpClient, HttpFetcher, RetryPolicy};
//! use segmerge_core::segment::{MediaKind, SegmentKey};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = HttpFetcher::new(HttpClient::new(), MediaKind::Video, RetryPolicy::default());
//! let key = SegmentKey::new("pilot", 0);
//! let path = fetcher
//!     .fetch("https://cdn.example/pilot/0.ts", Path::new("./segments"), &key)
//!     .await?;
//! println!("saved {}", path.display());
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod error;
mod fetcher;
mod retry;

pub use client::HttpClient;
pub use error::FetchError;
pub use fetcher::{Fetcher, HttpFetcher};
pub use retry::{FailureType, RetryDecision, RetryPolicy, classify_error};
