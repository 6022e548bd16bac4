//! Integration tests for the coordinator's rounds and the assembler's ordering.
//!
//! A scripted in-process fetcher stands in for HTTP so that latencies and
//! failures are deterministic.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use segmerge_core::assemble::{self, SortStrategy};
use segmerge_core::coordinator::Coordinator;
use segmerge_core::fetch::{FetchError, Fetcher};
use segmerge_core::segment::{Job, SegmentKey};
use tempfile::TempDir;

/// What the scripted fetcher does for a URL.
#[derive(Clone, Copy)]
enum Script {
    /// Succeed after sleeping this many milliseconds.
    After(u64),
    /// Fail every attempt.
    AlwaysFail,
    /// Fail this many attempts, then succeed.
    FailTimes(u32),
    /// Panic inside the worker.
    Panic,
}

struct ScriptedFetcher {
    scripts: HashMap<String, Script>,
    calls: Mutex<HashMap<String, u32>>,
}

impl ScriptedFetcher {
    fn new(scripts: &[(&str, Script)]) -> Self {
        Self {
            scripts: scripts
                .iter()
                .map(|(url, script)| ((*url).to_string(), *script))
                .collect(),
            calls: Mutex::new(HashMap::new()),
        }
    }

    fn calls(&self, url: &str) -> u32 {
        self.calls
            .lock()
            .expect("calls lock")
            .get(url)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    fn extension(&self) -> &str {
        "ts"
    }

    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        key: &SegmentKey,
    ) -> Result<PathBuf, FetchError> {
        let call = {
            let mut calls = self.calls.lock().expect("calls lock");
            let entry = calls.entry(url.to_string()).or_default();
            *entry += 1;
            *entry
        };

        match self.scripts.get(url).copied().unwrap_or(Script::After(0)) {
            Script::After(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
            Script::AlwaysFail => return Err(FetchError::http_status(url, 500)),
            Script::FailTimes(n) if call <= n => return Err(FetchError::timeout(url)),
            Script::FailTimes(_) => {}
            Script::Panic => panic!("scripted worker panic for {url}"),
        }

        let path = destination.join(key.file_name(self.extension()));
        std::fs::write(&path, url.as_bytes()).map_err(|e| FetchError::io(&path, e))?;
        Ok(path)
    }
}

#[tokio::test]
async fn test_assembled_order_ignores_completion_order() {
    // Index 3 finishes first, index 1 last.
    let fetcher = Arc::new(ScriptedFetcher::new(&[
        ("u3", Script::After(5)),
        ("u1", Script::After(80)),
        ("u2", Script::After(40)),
    ]));
    let coordinator = Coordinator::new(fetcher, 8, 0).expect("coordinator");
    let temp_dir = TempDir::new().expect("temp dir");

    let jobs = vec![
        Job::new("show", 3, "u3"),
        Job::new("show", 1, "u1"),
        Job::new("show", 2, "u2"),
    ];
    let report = coordinator
        .run(jobs, temp_dir.path())
        .await
        .expect("run should succeed");

    let completion: Vec<u32> = report.completed.iter().map(|f| f.key.index()).collect();
    assert_eq!(completion, vec![3, 2, 1]);

    let sorted = assemble::sort(temp_dir.path(), ".ts", SortStrategy::TrailingIndex)
        .expect("sort");
    assert_eq!(sorted, vec!["show_1.ts", "show_2.ts", "show_3.ts"]);

    // Sorting again over the unchanged directory yields the same order.
    let again = assemble::sort(temp_dir.path(), ".ts", SortStrategy::TrailingIndex)
        .expect("sort");
    assert_eq!(sorted, again);
}

#[tokio::test]
async fn test_always_failing_segment_bounded_by_retry_times() {
    let fetcher = Arc::new(ScriptedFetcher::new(&[("bad", Script::AlwaysFail)]));
    let coordinator = Coordinator::new(fetcher.clone(), 4, 4).expect("coordinator");
    let temp_dir = TempDir::new().expect("temp dir");

    let jobs = vec![Job::new("show", 0, "good"), Job::new("show", 1, "bad")];
    let report = coordinator.run(jobs, temp_dir.path()).await.expect("run");

    assert_eq!(fetcher.calls("bad"), 5);
    assert_eq!(fetcher.calls("good"), 1);
    assert_eq!(report.rounds, 5);
    assert_eq!(report.completed.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].entry.url, "bad");
    assert_eq!(report.failed[0].attempts, 5);
}

#[tokio::test]
async fn test_failed_segment_recovers_in_later_round() {
    let fetcher = Arc::new(ScriptedFetcher::new(&[("flaky", Script::FailTimes(2))]));
    let coordinator = Coordinator::new(fetcher.clone(), 4, 3).expect("coordinator");
    let temp_dir = TempDir::new().expect("temp dir");

    let report = coordinator
        .run(vec![Job::new("show", 0, "flaky")], temp_dir.path())
        .await
        .expect("run");

    assert!(report.is_complete());
    assert_eq!(fetcher.calls("flaky"), 3);
    assert_eq!(report.rounds, 3);
    assert_eq!(report.attempts, 3);
    assert!(temp_dir.path().join("show_0.ts").exists());
}

#[tokio::test]
async fn test_panicking_worker_counts_as_failed_attempt() {
    let fetcher = Arc::new(ScriptedFetcher::new(&[("boom", Script::Panic)]));
    let coordinator = Coordinator::new(fetcher.clone(), 2, 1).expect("coordinator");
    let temp_dir = TempDir::new().expect("temp dir");

    let jobs = vec![Job::new("show", 0, "boom"), Job::new("show", 1, "fine")];
    let report = coordinator.run(jobs, temp_dir.path()).await.expect("run");

    assert_eq!(fetcher.calls("boom"), 2);
    assert_eq!(report.completed.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].attempts, 2);
    assert!(report.failed[0].last_error.contains("stopped unexpectedly"));
}
