//! End-to-end driver: resolve, fetch, assemble, merge.
//!
//! A [`Pipeline`] resolves every input into a manifest, runs all segments of
//! all titles through one [`Coordinator`] run, then assembles and merges
//! each title independently. One title's failure never stops another's.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use segmerge_core::fetch::{HttpClient, HttpFetcher, RetryPolicy};
//! use segmerge_core::pipeline::{Pipeline, PipelineOptions};
//! use segmerge_core::resolver::ManifestFileResolver;
//! use segmerge_core::segment::MediaKind;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = HttpFetcher::new(HttpClient::new(), MediaKind::Video, RetryPolicy::default());
//! let pipeline = Pipeline::new(
//!     Box::new(ManifestFileResolver::new()),
//!     Arc::new(fetcher),
//!     PipelineOptions::default(),
//! );
//! let report = pipeline.run(&["episodes.json".to_string()]).await?;
//! println!("{} titles, success: {}", report.titles.len(), report.is_success());
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::assemble::{self, AssembleError, SegmentListing, SortStrategy, missing_indices};
use crate::coordinator::{
    Coordinator, CoordinatorError, DEFAULT_MAX_PARALLELISM, DEFAULT_RETRY_TIMES, FailedSegment,
    RunReport,
};
use crate::fetch::Fetcher;
use crate::merge::{Artifact, Remuxer, StackMode, merge_images, merge_video};
use crate::resolver::{Manifest, ManifestResolver};
use crate::segment::{Job, MediaKind, SegmentFile, sanitize_title};

/// What to do with a title that has permanently failed segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapPolicy {
    /// Merge what was fetched and flag the artifact as partial.
    #[default]
    Merge,
    /// Do not merge; report the title as incomplete.
    Skip,
}

impl fmt::Display for GapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Merge => "merge",
            Self::Skip => "skip",
        })
    }
}

impl FromStr for GapPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "merge" => Ok(Self::Merge),
            "skip" => Ok(Self::Skip),
            other => Err(format!("unknown gap policy '{other}': expected merge or skip")),
        }
    }
}

/// Settings for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Directory for segments and artifacts; created if absent.
    pub output_dir: PathBuf,
    /// Segment kind, deciding extension and merge strategy.
    pub media: MediaKind,
    /// Worker-pool size.
    pub max_parallelism: usize,
    /// Retry rounds after the initial round.
    pub retry_times: u32,
    /// Stacking direction for image merges.
    pub stack_mode: StackMode,
    /// Handling of titles with permanently failed segments.
    pub gap_policy: GapPolicy,
    /// Only the first `n` titles are processed when set.
    pub max_titles: Option<usize>,
    /// Keep segment files after a successful merge.
    pub keep_segments: bool,
    /// Remux step for video merges; `None` leaves the `.ts` artifact.
    pub remuxer: Option<Remuxer>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            media: MediaKind::Video,
            max_parallelism: DEFAULT_MAX_PARALLELISM,
            retry_times: DEFAULT_RETRY_TIMES,
            stack_mode: StackMode::Vertical,
            gap_policy: GapPolicy::Merge,
            max_titles: None,
            keep_segments: true,
            remuxer: Some(Remuxer::default()),
        }
    }
}

/// Terminal state of one title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleOutcome {
    /// An artifact was written; it may be partial.
    Merged(Artifact),
    /// The title listed no segments.
    Empty,
    /// Segments were missing and the merge was skipped.
    SkippedIncomplete {
        /// Absent indices.
        missing: Vec<u32>,
    },
    /// Assembly or merge failed.
    MergeFailed {
        /// Error message.
        error: String,
    },
}

/// Per-title result.
#[derive(Debug, Clone)]
pub struct TitleReport {
    /// Sanitized (and de-duplicated) title.
    pub title: String,
    /// Segments the manifest listed.
    pub expected: usize,
    /// Segments fetched in this run.
    pub fetched: usize,
    /// Segments that exhausted every retry round.
    pub failed: Vec<FailedSegment>,
    /// What happened to the title.
    pub outcome: TitleOutcome,
}

impl TitleReport {
    /// True when the title merged without gaps or had nothing to merge.
    #[must_use]
    pub fn is_success(&self) -> bool {
        match &self.outcome {
            TitleOutcome::Merged(artifact) => !artifact.is_partial() && self.failed.is_empty(),
            TitleOutcome::Empty => true,
            TitleOutcome::SkippedIncomplete { .. } | TitleOutcome::MergeFailed { .. } => false,
        }
    }
}

/// An input the resolver could not turn into a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveFailure {
    /// The input as given.
    pub input: String,
    /// Error message.
    pub error: String,
}

/// Everything a pipeline run produced.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// One entry per processed title, in manifest order.
    pub titles: Vec<TitleReport>,
    /// Inputs that failed to resolve.
    pub resolve_failures: Vec<ResolveFailure>,
    /// Titles dropped by `max_titles`.
    pub titles_skipped: usize,
    /// Coordinator rounds run.
    pub rounds: u32,
    /// Coordinator-level attempts.
    pub attempts: usize,
}

impl PipelineReport {
    /// True when every input resolved and every title succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.resolve_failures.is_empty() && self.titles.iter().all(TitleReport::is_success)
    }

    /// Total permanently failed segments.
    #[must_use]
    pub fn failed_segments(&self) -> usize {
        self.titles.iter().map(|t| t.failed.len()).sum()
    }

    /// Artifacts written, partial ones included.
    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.titles.iter().filter_map(|t| match &t.outcome {
            TitleOutcome::Merged(artifact) => Some(artifact),
            _ => None,
        })
    }
}

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The output directory could not be created.
    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        /// Output directory.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// No input resolved.
    #[error("none of the {inputs} input(s) could be resolved")]
    NothingResolved {
        /// Number of inputs tried.
        inputs: usize,
    },

    /// The coordinator rejected its configuration or job set.
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
}

/// One title scheduled for fetching.
#[derive(Debug)]
struct PlannedTitle {
    title: String,
    segments: Vec<String>,
}

/// Resolve, fetch, assemble and merge driver.
pub struct Pipeline {
    resolver: Box<dyn ManifestResolver>,
    fetcher: Arc<dyn Fetcher>,
    options: PipelineOptions,
    progress: Option<ProgressBar>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("resolver", &self.resolver.name())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a pipeline.
    #[must_use]
    pub fn new(
        resolver: Box<dyn ManifestResolver>,
        fetcher: Arc<dyn Fetcher>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            options,
            progress: None,
        }
    }

    /// Attaches a progress bar for the fetch phase.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Options in effect.
    #[must_use]
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Resolves every input, then processes the combined manifest.
    ///
    /// Inputs that fail to resolve are reported and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NothingResolved`] when no input resolved,
    /// plus any error of [`run_manifest`](Self::run_manifest).
    #[instrument(skip(self, inputs), fields(resolver = self.resolver.name(), inputs = inputs.len()))]
    pub async fn run(&self, inputs: &[String]) -> Result<PipelineReport, PipelineError> {
        let mut manifest = Manifest::default();
        let mut failures = Vec::new();

        for input in inputs {
            match self.resolver.resolve(input).await {
                Ok(resolved) => {
                    info!(input = %input, titles = resolved.titles.len(), "input resolved");
                    manifest.extend(resolved);
                }
                Err(e) => {
                    warn!(input = %input, error = %e, "input could not be resolved");
                    failures.push(ResolveFailure {
                        input: input.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if failures.len() == inputs.len() {
            error!(inputs = inputs.len(), "nothing resolved");
            return Err(PipelineError::NothingResolved {
                inputs: inputs.len(),
            });
        }

        let mut report = self.run_manifest(manifest).await?;
        report.resolve_failures = failures;
        Ok(report)
    }

    /// Fetches, assembles and merges every title of `manifest`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::OutputDir`] or [`PipelineError::Coordinator`];
    /// per-title problems are recorded in the report instead.
    #[instrument(skip(self, manifest), fields(titles = manifest.titles.len()))]
    pub async fn run_manifest(&self, manifest: Manifest) -> Result<PipelineReport, PipelineError> {
        let output_dir = &self.options.output_dir;
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| PipelineError::OutputDir {
                path: output_dir.clone(),
                source,
            })?;

        let total_titles = manifest.titles.len();
        let planned = plan_titles(manifest, self.options.max_titles);
        let titles_skipped = total_titles - planned.len();
        if titles_skipped > 0 {
            info!(titles_skipped, "titles beyond max_titles not processed");
        }

        let jobs: Vec<Job> = planned
            .iter()
            .flat_map(|p| Job::for_title(&p.title, &p.segments))
            .collect();

        let mut coordinator = Coordinator::new(
            Arc::clone(&self.fetcher),
            self.options.max_parallelism,
            self.options.retry_times,
        )?;
        if let Some(progress) = &self.progress {
            coordinator = coordinator.with_progress(progress.clone());
        }
        let run = coordinator.run(jobs, output_dir).await?;
        if let Some(progress) = &self.progress {
            progress.finish_and_clear();
        }

        let mut titles = Vec::with_capacity(planned.len());
        for planned_title in &planned {
            titles.push(self.finish_title(planned_title, &run).await);
        }

        Ok(PipelineReport {
            titles,
            resolve_failures: Vec::new(),
            titles_skipped,
            rounds: run.rounds,
            attempts: run.attempts,
        })
    }

    /// Assembles, merges and cleans up one title.
    #[instrument(skip(self, planned, run), fields(title = %planned.title))]
    async fn finish_title(&self, planned: &PlannedTitle, run: &RunReport) -> TitleReport {
        let title = planned.title.clone();
        let failed: Vec<FailedSegment> = run.failed_for(&title).cloned().collect();
        let fetched = run.completed_for(&title).count();
        let expected = planned.segments.len();

        let outcome = if expected == 0 {
            info!("title has no segments, nothing to merge");
            TitleOutcome::Empty
        } else {
            let failed_indices: HashSet<u32> = failed.iter().map(|f| f.entry.index).collect();
            self.merge_title(&title, expected, &failed_indices).await
        };

        match &outcome {
            TitleOutcome::Merged(artifact) if artifact.is_partial() => warn!(
                path = %artifact.path.display(),
                missing = ?artifact.missing,
                "title merged with gaps"
            ),
            TitleOutcome::Merged(artifact) => {
                info!(path = %artifact.path.display(), "title merged");
            }
            TitleOutcome::Empty => {}
            TitleOutcome::SkippedIncomplete { missing } => {
                warn!(?missing, "title incomplete, merge skipped");
            }
            TitleOutcome::MergeFailed { error } => error!(%error, "title merge failed"),
        }

        TitleReport {
            title,
            expected,
            fetched,
            failed,
            outcome,
        }
    }

    /// Merges the segments of `title` found on disk.
    ///
    /// Indices in `failed` are excluded even when a file for them exists, so
    /// leftovers from an earlier run never stand in for a segment that
    /// failed in this one.
    async fn merge_title(
        &self,
        title: &str,
        expected: usize,
        failed: &HashSet<u32>,
    ) -> TitleOutcome {
        let output_dir = &self.options.output_dir;
        let extension = self.fetcher.extension().to_string();
        let expected_u32 = u32::try_from(expected).unwrap_or(u32::MAX);

        let files: Vec<SegmentFile> = match assemble::title_segments(output_dir, title, &extension)
        {
            Ok(files) => files
                .into_iter()
                .filter(|f| f.key.index() < expected_u32 && !failed.contains(&f.key.index()))
                .collect(),
            Err(e) => {
                return TitleOutcome::MergeFailed {
                    error: e.to_string(),
                };
            }
        };
        let missing = missing_indices(&files, expected_u32);
        debug!(present = files.len(), missing = missing.len(), "title assembled");

        if files.is_empty() || (!missing.is_empty() && self.options.gap_policy == GapPolicy::Skip)
        {
            return TitleOutcome::SkippedIncomplete { missing };
        }

        let ordered = match ordered_paths(output_dir, &extension, self.options.media, &files) {
            Ok(ordered) => ordered,
            Err(e) => {
                return TitleOutcome::MergeFailed {
                    error: e.to_string(),
                };
            }
        };
        let merged = match self.options.media {
            MediaKind::Video => {
                merge_video(&ordered, output_dir, title, self.options.remuxer.as_ref()).await
            }
            MediaKind::Image => {
                let path = output_dir.join(format!("{title}.png"));
                merge_images(&ordered, &path, self.options.stack_mode).await
            }
        };

        match merged {
            Ok(path) => {
                if !self.options.keep_segments {
                    remove_segments(&ordered).await;
                }
                TitleOutcome::Merged(Artifact {
                    title: title.to_string(),
                    path,
                    segments: ordered.len(),
                    missing,
                })
            }
            Err(e) => TitleOutcome::MergeFailed {
                error: e.to_string(),
            },
        }
    }
}

/// Paths of `files` in the order the media's sort strategy gives them.
fn ordered_paths(
    directory: &Path,
    extension: &str,
    media: MediaKind,
    files: &[SegmentFile],
) -> Result<Vec<PathBuf>, AssembleError> {
    let selected: HashSet<&Path> = files.iter().map(|f| f.path.as_path()).collect();
    let listing = SegmentListing::new(
        directory,
        format!(".{extension}"),
        SortStrategy::for_media(media),
    );
    Ok(listing
        .iter()?
        .filter(|path| selected.contains(path.as_path()))
        .collect())
}

async fn remove_segments(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "could not remove segment");
        }
    }
    debug!(removed = paths.len(), "segments cleaned up");
}

/// Sanitizes titles, makes them unique and applies `max_titles`.
fn plan_titles(manifest: Manifest, max_titles: Option<usize>) -> Vec<PlannedTitle> {
    let limit = max_titles.unwrap_or(usize::MAX);
    let mut used: HashSet<String> = HashSet::new();

    manifest
        .titles
        .into_iter()
        .take(limit)
        .map(|entry| {
            let base = sanitize_title(&entry.title);
            let mut title = base.clone();
            let mut suffix = 2u32;
            while !used.insert(title.clone()) {
                title = format!("{base}-{suffix}");
                suffix += 1;
            }
            if title != entry.title {
                debug!(from = %entry.title, %title, "title renamed for filesystem");
            }
            PlannedTitle {
                title,
                segments: entry.segments,
            }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::resolver::TitleManifest;

    fn manifest(titles: &[(&str, usize)]) -> Manifest {
        Manifest::new(
            titles
                .iter()
                .map(|(t, n)| {
                    TitleManifest::new(*t, (0..*n).map(|i| format!("https://x/{i}.ts")).collect())
                })
                .collect(),
        )
    }

    #[test]
    fn test_gap_policy_parse_and_default() {
        assert_eq!(GapPolicy::default(), GapPolicy::Merge);
        assert_eq!("SKIP".parse::<GapPolicy>().unwrap(), GapPolicy::Skip);
        assert!("sometimes".parse::<GapPolicy>().is_err());
        assert_eq!(GapPolicy::Skip.to_string(), "skip");
    }

    #[test]
    fn test_plan_titles_sanitizes_and_disambiguates() {
        let planned = plan_titles(manifest(&[("Ep 1", 1), ("Ep/1", 2), ("Ep_1", 0)]), None);
        let names: Vec<&str> = planned.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(names, vec!["Ep-1", "Ep-1-2", "Ep-1-3"]);
        assert_eq!(planned[1].segments.len(), 2);
    }

    #[test]
    fn test_plan_titles_applies_max_titles() {
        let planned = plan_titles(manifest(&[("a", 1), ("b", 1), ("c", 1)]), Some(2));
        assert_eq!(planned.len(), 2);
        assert_eq!(planned[1].title, "b");
    }

    #[test]
    fn test_title_report_success_rules() {
        let base = TitleReport {
            title: "t".to_string(),
            expected: 0,
            fetched: 0,
            failed: Vec::new(),
            outcome: TitleOutcome::Empty,
        };
        assert!(base.is_success());

        let skipped = TitleReport {
            outcome: TitleOutcome::SkippedIncomplete { missing: vec![1] },
            ..base.clone()
        };
        assert!(!skipped.is_success());

        let report = PipelineReport {
            titles: vec![base, skipped],
            ..PipelineReport::default()
        };
        assert!(!report.is_success());
        assert_eq!(report.artifacts().count(), 0);
    }

    #[test]
    fn test_ordered_paths_sorts_comic_pages_naturally() {
        let temp = tempfile::TempDir::new().unwrap();
        for name in ["Vol-2_10.png", "Vol-2_2.png", "Vol-2_1.png", "Vol-3_0.png"] {
            std::fs::write(temp.path().join(name), name).unwrap();
        }
        let files = assemble::title_segments(temp.path(), "Vol-2", "png").unwrap();

        let ordered = ordered_paths(temp.path(), "png", MediaKind::Image, &files).unwrap();
        let names: Vec<_> = ordered
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["Vol-2_1.png", "Vol-2_2.png", "Vol-2_10.png"]);
    }
}
