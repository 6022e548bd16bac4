//! Concurrency coordinator: bounded worker pool plus batched retry rounds.
//!
//! The coordinator runs a job set in *rounds*. Round 0 submits every job;
//! each later round resubmits exactly the jobs that failed in the round
//! before it. A round finishes only when every job submitted in it has
//! reported back, so rounds never overlap.
//!
//! # Concurrency Model
//!
//! - Each job attempt runs in its own Tokio task
//! - A semaphore permit is acquired before spawning each task and released
//!   when the task finishes (RAII)
//! - Tasks send their [`FetchResult`] over a channel to the coordinating
//!   task, which is the only owner of the retry set
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use segmerge_core::coordinator::Coordinator;
//! use segmerge_core::fetch::{HttpClient, HttpFetcher, RetryPolicy};
//! use segmerge_core::segment::{Job, MediaKind};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = HttpFetcher::new(HttpClient::new(), MediaKind::Video, RetryPolicy::default());
//! let coordinator = Coordinator::new(Arc::new(fetcher), 32, 3)?;
//! let jobs = Job::for_title("pilot", &["https://cdn.example/0.ts".to_string()]);
//! let report = coordinator.run(jobs, Path::new("./segments")).await?;
//! println!("completed {}, failed {}", report.completed.len(), report.failed.len());
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indicatif::ProgressBar;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, info, instrument, warn};

use crate::fetch::{FetchError, Fetcher};
use crate::segment::{Job, RetryEntry, SegmentFile, SegmentKey};

/// Minimum allowed parallelism.
const MIN_PARALLELISM: usize = 1;

/// Maximum allowed parallelism.
const MAX_PARALLELISM: usize = 256;

/// Default worker-pool size.
pub const DEFAULT_MAX_PARALLELISM: usize = 32;

/// Default number of retry rounds after the initial round.
pub const DEFAULT_RETRY_TIMES: u32 = 3;

/// Error type for coordinator operations.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// Invalid parallelism value provided.
    #[error(
        "invalid parallelism value {value}: must be between {MIN_PARALLELISM} and {MAX_PARALLELISM}"
    )]
    InvalidParallelism {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Two jobs share a `(title, index)` and would write the same file.
    #[error("duplicate segment {title}#{index} in job set")]
    DuplicateJob {
        /// Sanitized title.
        title: String,
        /// Duplicated index.
        index: u32,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Outcome of a single attempt.
#[derive(Debug)]
pub struct FetchResult {
    /// The job that was attempted.
    pub job: Job,
    /// Path of the persisted segment, or why the attempt failed.
    pub outcome: Result<PathBuf, FetchError>,
}

/// A segment that was still failing when the retry rounds ran out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedSegment {
    /// What would have been resubmitted.
    pub entry: RetryEntry,
    /// Coordinator-level attempts made.
    pub attempts: u32,
    /// Message of the last error seen.
    pub last_error: String,
}

/// Everything a coordinator run produced.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Persisted segments, in completion order.
    pub completed: Vec<SegmentFile>,
    /// Permanently failed segments, ordered by key.
    pub failed: Vec<FailedSegment>,
    /// Rounds actually run (0 for an empty job set).
    pub rounds: u32,
    /// Coordinator-level attempts across all rounds.
    pub attempts: usize,
}

impl RunReport {
    /// Completed segments of one (sanitized) title.
    pub fn completed_for<'a>(&'a self, title: &'a str) -> impl Iterator<Item = &'a SegmentFile> {
        self.completed.iter().filter(move |f| f.key.title() == title)
    }

    /// Permanently failed segments of one (sanitized) title.
    pub fn failed_for<'a>(&'a self, title: &'a str) -> impl Iterator<Item = &'a FailedSegment> {
        self.failed.iter().filter(move |f| f.entry.title == title)
    }

    /// Returns true when no segment failed permanently.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Retry-set bookkeeping owned by the coordinating task.
#[derive(Debug)]
struct Pending {
    entry: RetryEntry,
    attempts: u32,
    last_error: String,
}

/// Drives fetch jobs over a bounded worker pool with batched retry rounds.
pub struct Coordinator {
    fetcher: Arc<dyn Fetcher>,
    semaphore: Arc<Semaphore>,
    max_parallelism: usize,
    retry_times: u32,
    progress: Option<ProgressBar>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("max_parallelism", &self.max_parallelism)
            .field("retry_times", &self.retry_times)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Creates a coordinator.
    ///
    /// # Arguments
    ///
    /// * `fetcher` - Performs one attempt per job
    /// * `max_parallelism` - Worker-pool size (1-256)
    /// * `retry_times` - Rounds run after the initial round
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::InvalidParallelism`] if `max_parallelism`
    /// is outside 1-256.
    #[instrument(level = "debug", skip(fetcher))]
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        max_parallelism: usize,
        retry_times: u32,
    ) -> Result<Self, CoordinatorError> {
        if !(MIN_PARALLELISM..=MAX_PARALLELISM).contains(&max_parallelism) {
            return Err(CoordinatorError::InvalidParallelism {
                value: max_parallelism,
            });
        }

        Ok(Self {
            fetcher,
            semaphore: Arc::new(Semaphore::new(max_parallelism)),
            max_parallelism,
            retry_times,
            progress: None,
        })
    }

    /// Attaches a progress bar that ticks once per finished attempt.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Returns the worker-pool size.
    #[must_use]
    pub fn max_parallelism(&self) -> usize {
        self.max_parallelism
    }

    /// Returns the number of retry rounds after the initial one.
    #[must_use]
    pub fn retry_times(&self) -> u32 {
        self.retry_times
    }

    /// Runs `jobs` to completion, writing segments into `destination`.
    ///
    /// Every job ends either in [`RunReport::completed`] or in
    /// [`RunReport::failed`]; no job is attempted more than
    /// `retry_times + 1` times.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::DuplicateJob`] before fetching anything if
    /// two jobs share a key, and [`CoordinatorError::SemaphoreClosed`] if the
    /// worker pool breaks. Individual fetch failures are never errors here.
    #[instrument(skip(self, jobs), fields(jobs = jobs.len(), destination = %destination.display()))]
    pub async fn run(
        &self,
        jobs: Vec<Job>,
        destination: &Path,
    ) -> Result<RunReport, CoordinatorError> {
        ensure_unique(&jobs)?;

        let mut report = RunReport::default();
        let mut retry_set: BTreeMap<SegmentKey, Pending> = BTreeMap::new();
        let mut batch = jobs;

        if let Some(progress) = &self.progress {
            progress.set_length(batch.len() as u64);
        }

        info!(
            jobs = batch.len(),
            max_parallelism = self.max_parallelism,
            retry_times = self.retry_times,
            "starting fetch rounds"
        );

        for round in 0..=self.retry_times {
            if batch.is_empty() {
                break;
            }
            if round > 0 {
                info!(round, pending = batch.len(), "starting retry round");
                if let Some(progress) = &self.progress {
                    progress.inc_length(batch.len() as u64);
                }
            }

            report.rounds = round + 1;
            report.attempts += batch.len();

            for result in self.run_round(batch, destination).await? {
                let key = result.job.key.clone();
                match result.outcome {
                    Ok(path) => {
                        retry_set.remove(&key);
                        report.completed.push(SegmentFile { key, path });
                    }
                    Err(e) => {
                        warn!(segment = %key, round, error = %e, "segment attempt failed");
                        let pending = retry_set.entry(key).or_insert_with(|| Pending {
                            entry: result.job.to_retry_entry(),
                            attempts: 0,
                            last_error: String::new(),
                        });
                        pending.attempts += 1;
                        pending.last_error = e.to_string();
                    }
                }
            }

            batch = retry_set.values().map(|p| p.entry.to_job()).collect();
        }

        report.failed = retry_set
            .into_values()
            .map(|p| FailedSegment {
                entry: p.entry,
                attempts: p.attempts,
                last_error: p.last_error,
            })
            .collect();

        for failed in &report.failed {
            warn!(
                title = %failed.entry.title,
                index = failed.entry.index,
                url = %failed.entry.url,
                attempts = failed.attempts,
                error = %failed.last_error,
                "segment permanently failed"
            );
        }

        info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            rounds = report.rounds,
            attempts = report.attempts,
            "fetch rounds complete"
        );

        Ok(report)
    }

    /// Runs one batch and returns exactly one result per submitted job.
    async fn run_round(
        &self,
        batch: Vec<Job>,
        destination: &Path,
    ) -> Result<Vec<FetchResult>, CoordinatorError> {
        let expected = batch.len();
        let (tx, mut rx) = mpsc::channel::<FetchResult>(expected.max(1));
        let mut submitted: BTreeMap<SegmentKey, Job> = BTreeMap::new();
        let mut handles = Vec::with_capacity(expected);

        for job in batch {
            // Blocks while the pool is saturated.
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| CoordinatorError::SemaphoreClosed)?;

            submitted.insert(job.key.clone(), job.clone());
            let tx = tx.clone();
            let fetcher = Arc::clone(&self.fetcher);
            let destination = destination.to_path_buf();

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let outcome = fetcher.fetch(&job.url, &destination, &job.key).await;
                // The receiver lives until every sender is gone.
                let _ = tx.send(FetchResult { job, outcome }).await;
            }));
        }
        drop(tx);

        let mut results = Vec::with_capacity(expected);
        while let Some(result) = rx.recv().await {
            submitted.remove(&result.job.key);
            if let Some(progress) = &self.progress {
                progress.inc(1);
            }
            results.push(result);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "fetch task panicked");
            }
        }

        // Jobs whose task died without reporting still need a terminal result.
        for (_, job) in submitted {
            let outcome = Err(FetchError::worker_lost(job.url.clone()));
            if let Some(progress) = &self.progress {
                progress.inc(1);
            }
            results.push(FetchResult { job, outcome });
        }

        debug!(results = results.len(), "round complete");
        Ok(results)
    }
}

fn ensure_unique(jobs: &[Job]) -> Result<(), CoordinatorError> {
    let mut seen = HashSet::with_capacity(jobs.len());
    for job in jobs {
        if !seen.insert(&job.key) {
            return Err(CoordinatorError::DuplicateJob {
                title: job.key.title().to_string(),
                index: job.key.index(),
            });
        }
    }
    Ok(())
}
