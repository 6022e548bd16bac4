//! Video merge: concatenate transport-stream chunks, then remux.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use super::MergeError;

/// Program invoked when no other remux tool is configured.
pub const DEFAULT_REMUX_PROGRAM: &str = "ffmpeg";

/// Default remux time limit.
pub const DEFAULT_REMUX_TIMEOUT: Duration = Duration::from_secs(600);

/// Extension of the concatenated intermediate.
const CONCAT_EXTENSION: &str = "ts";

/// Extension of the remuxed artifact.
const REMUX_EXTENSION: &str = "mp4";

/// Appends every file in `ordered` to `output`, in order.
///
/// Returns the number of bytes written.
///
/// # Errors
///
/// Returns [`MergeError::Io`] naming whichever file failed.
#[instrument(skip(ordered), fields(segments = ordered.len(), output = %output.display()))]
pub async fn concat_segments(ordered: &[PathBuf], output: &Path) -> Result<u64, MergeError> {
    let file = File::create(output)
        .await
        .map_err(|e| MergeError::io(output, e))?;
    let mut writer = BufWriter::new(file);
    let mut total = 0u64;

    for segment in ordered {
        let mut reader = File::open(segment)
            .await
            .map_err(|e| MergeError::io(segment, e))?;
        total += tokio::io::copy(&mut reader, &mut writer)
            .await
            .map_err(|e| MergeError::io(segment, e))?;
    }

    writer.flush().await.map_err(|e| MergeError::io(output, e))?;
    debug!(bytes = total, "segments concatenated");
    Ok(total)
}

/// External stream-copy remux (`<program> -y -loglevel error -i IN -c copy OUT`).
#[derive(Debug, Clone)]
pub struct Remuxer {
    program: PathBuf,
    timeout: Duration,
}

impl Default for Remuxer {
    fn default() -> Self {
        Self::new(DEFAULT_REMUX_PROGRAM, DEFAULT_REMUX_TIMEOUT)
    }
}

impl Remuxer {
    /// Creates a remuxer running `program` with a time limit.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Program that will be run.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Time limit per invocation.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map_or_else(|| self.program.to_string_lossy(), |n| n.to_string_lossy())
            .into_owned()
    }

    /// Remuxes `input` into `output` without re-encoding.
    ///
    /// The child is killed if the time limit passes.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::RemuxSpawn`], [`MergeError::RemuxFailed`] (also
    /// when the tool exits cleanly without producing `output`) or
    /// [`MergeError::RemuxTimeout`].
    #[instrument(skip(self), fields(program = %self.program.display(), input = %input.display()))]
    pub async fn remux(&self, input: &Path, output: &Path) -> Result<(), MergeError> {
        let program = self.program_name();

        let mut cmd = Command::new(&self.program);
        cmd.arg("-y")
            .args(["-loglevel", "error"])
            .arg("-i")
            .arg(input)
            .args(["-c", "copy"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| MergeError::RemuxSpawn {
            program: program.clone(),
            source,
        })?;

        let output_result = match tokio::time::timeout(self.timeout, child.wait_with_output()).await
        {
            Ok(result) => result.map_err(|source| MergeError::RemuxSpawn {
                program: program.clone(),
                source,
            })?,
            Err(_elapsed) => {
                warn!(timeout = ?self.timeout, "remux timed out, child killed");
                return Err(MergeError::RemuxTimeout {
                    program,
                    timeout: self.timeout,
                });
            }
        };

        if !output_result.status.success() {
            return Err(MergeError::RemuxFailed {
                program,
                status: output_result.status.to_string(),
                stderr: String::from_utf8_lossy(&output_result.stderr)
                    .trim()
                    .to_string(),
            });
        }

        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(MergeError::RemuxFailed {
                program,
                status: output_result.status.to_string(),
                stderr: format!("no output written to {}", output.display()),
            });
        }

        Ok(())
    }
}

/// Merges one title's ordered segments into `output_dir`.
///
/// Segments are concatenated into `<title>.ts`. With a `remuxer` the
/// intermediate is remuxed into `<title>.mp4` and removed once that
/// succeeds; on remux failure it is left in place.
///
/// # Errors
///
/// Returns [`MergeError::NoSegments`] for an empty list, plus any error of
/// [`concat_segments`] or [`Remuxer::remux`].
#[instrument(skip(ordered, remuxer), fields(segments = ordered.len()))]
pub async fn merge_video(
    ordered: &[PathBuf],
    output_dir: &Path,
    title: &str,
    remuxer: Option<&Remuxer>,
) -> Result<PathBuf, MergeError> {
    if ordered.is_empty() {
        return Err(MergeError::no_segments(title));
    }

    let concat_path = output_dir.join(format!("{title}.{CONCAT_EXTENSION}"));
    let bytes = concat_segments(ordered, &concat_path).await?;
    info!(path = %concat_path.display(), bytes, "concatenated");

    let Some(remuxer) = remuxer else {
        return Ok(concat_path);
    };

    let mp4_path = output_dir.join(format!("{title}.{REMUX_EXTENSION}"));
    remuxer.remux(&concat_path, &mp4_path).await?;

    if let Err(e) = tokio::fs::remove_file(&concat_path).await {
        warn!(path = %concat_path.display(), error = %e, "could not remove intermediate");
    }
    info!(path = %mp4_path.display(), "remuxed");
    Ok(mp4_path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn write_segments(dir: &Path, parts: &[&[u8]]) -> Vec<PathBuf> {
        parts
            .iter()
            .enumerate()
            .map(|(i, bytes)| {
                let path = dir.join(format!("show_{i}.ts"));
                std::fs::write(&path, bytes).unwrap();
                path
            })
            .collect()
    }

    #[tokio::test]
    async fn test_concat_preserves_order_and_bytes() {
        let temp = TempDir::new().unwrap();
        let segments = write_segments(temp.path(), &[b"AAA", b"B", b"CC"]);
        let out = temp.path().join("show.ts");

        let written = concat_segments(&segments, &out).await.unwrap();

        assert_eq!(written, 6);
        assert_eq!(std::fs::read(&out).unwrap(), b"AAABCC");
    }

    #[tokio::test]
    async fn test_concat_missing_segment_names_path() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("show_9.ts");
        let err = concat_segments(&[missing.clone()], &temp.path().join("show.ts"))
            .await
            .unwrap_err();
        match err {
            MergeError::Io { path, .. } => assert_eq!(path, missing),
            other => panic!("expected Io, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_merge_video_without_remux_yields_ts() {
        let temp = TempDir::new().unwrap();
        let segments = write_segments(temp.path(), &[b"x", b"y"]);

        let artifact = merge_video(&segments, temp.path(), "show", None)
            .await
            .unwrap();

        assert_eq!(artifact, temp.path().join("show.ts"));
        assert_eq!(std::fs::read(artifact).unwrap(), b"xy");
    }

    #[tokio::test]
    async fn test_merge_video_empty_is_error() {
        let temp = TempDir::new().unwrap();
        let err = merge_video(&[], temp.path(), "show", None).await.unwrap_err();
        assert!(matches!(err, MergeError::NoSegments { .. }));
    }

    #[tokio::test]
    async fn test_remux_spawn_failure() {
        let temp = TempDir::new().unwrap();
        let segments = write_segments(temp.path(), &[b"x"]);
        let remuxer = Remuxer::new("segmerge-no-such-tool-xyz", Duration::from_secs(5));

        let err = merge_video(&segments, temp.path(), "show", Some(&remuxer))
            .await
            .unwrap_err();

        assert!(matches!(err, MergeError::RemuxSpawn { .. }));
        assert!(temp.path().join("show.ts").exists());
    }

    #[test]
    fn test_remuxer_defaults() {
        let remuxer = Remuxer::default();
        assert_eq!(remuxer.program(), Path::new("ffmpeg"));
        assert_eq!(remuxer.timeout(), DEFAULT_REMUX_TIMEOUT);
        assert_eq!(remuxer.program_name(), "ffmpeg");
    }
}
