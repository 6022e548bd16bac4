//! Sequence assembly: recovering segment order from filenames on disk.
//!
//! Fetch workers finish in arbitrary order and directory listings come back
//! in arbitrary order, so the only trustworthy source of order is the index
//! embedded in each filename. [`sort`] extracts that key and orders by it;
//! names without a key sort after every keyed name, and ties are broken by
//! filename so the result is total.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::segment::{MediaKind, SegmentFile, SegmentKey};

/// Every run of ASCII digits in a filename.
static DIGIT_GROUPS: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\d+").expect("static digit pattern is valid")
});

/// Errors raised while listing a segment directory.
#[derive(Debug, Error)]
pub enum AssembleError {
    /// The directory could not be read.
    #[error("cannot list segment directory {path}: {source}")]
    ReadDir {
        /// Directory being listed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The suffix cannot be turned into a matching pattern.
    #[error("invalid segment suffix '{suffix}': {source}")]
    Pattern {
        /// Offending suffix.
        suffix: String,
        /// Regex compilation error.
        #[source]
        source: regex::Error,
    },
}

impl AssembleError {
    fn read_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadDir {
            path: path.into(),
            source,
        }
    }
}

/// How the ordering key is extracted from a filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortStrategy {
    /// The integer immediately before the suffix: `_(\d+)\.<suffix>$`.
    #[default]
    TrailingIndex,
    /// Every numeric group in the name, compared left to right.
    NumericGroups,
}

impl SortStrategy {
    /// Strategy for segments of `media`: trailing index for video,
    /// multi-level natural sort for comic pages.
    #[must_use]
    pub fn for_media(media: MediaKind) -> Self {
        match media {
            MediaKind::Video => Self::TrailingIndex,
            MediaKind::Image => Self::NumericGroups,
        }
    }
}

/// Extracted ordering key; `None` means "sort last".
type SortKey = Option<Vec<u64>>;

/// Compiled form of one `(suffix, strategy)` pair.
struct KeyExtractor {
    strategy: SortStrategy,
    trailing: Regex,
}

impl KeyExtractor {
    fn new(suffix: &str, strategy: SortStrategy) -> Result<Self, AssembleError> {
        let pattern = format!(r"_(\d+)\.{}$", regex::escape(suffix.trim_start_matches('.')));
        let trailing = Regex::new(&pattern).map_err(|source| AssembleError::Pattern {
            suffix: suffix.to_string(),
            source,
        })?;
        Ok(Self { strategy, trailing })
    }

    fn key(&self, name: &str) -> SortKey {
        match self.strategy {
            SortStrategy::TrailingIndex => self
                .trailing
                .captures(name)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse().ok())
                .map(|n| vec![n]),
            SortStrategy::NumericGroups => {
                let groups: Option<Vec<u64>> = DIGIT_GROUPS
                    .find_iter(name)
                    .map(|m| m.as_str().parse().ok())
                    .collect();
                groups.filter(|g| !g.is_empty())
            }
        }
    }
}

fn compare_keyed(a: &(SortKey, String), b: &(SortKey, String)) -> Ordering {
    match (&a.0, &b.0) {
        (Some(ka), Some(kb)) => ka.cmp(kb).then_with(|| a.1.cmp(&b.1)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.1.cmp(&b.1),
    }
}

/// Orders the files in `directory` ending with `file_suffix`.
///
/// Only regular files are considered; hidden part files never match because
/// they end in `.part`.
///
/// # Errors
///
/// Returns [`AssembleError::ReadDir`] if the directory cannot be listed and
/// [`AssembleError::Pattern`] for a suffix that cannot be matched.
#[instrument(skip(directory), fields(directory = %directory.display()))]
pub fn sort(
    directory: &Path,
    file_suffix: &str,
    strategy: SortStrategy,
) -> Result<Vec<String>, AssembleError> {
    let extractor = KeyExtractor::new(file_suffix, strategy)?;
    let entries = std::fs::read_dir(directory).map_err(|e| AssembleError::read_dir(directory, e))?;

    let mut keyed = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| AssembleError::read_dir(directory, e))?;
        let is_file = entry.file_type().is_ok_and(|t| t.is_file());
        if !is_file {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !name.ends_with(file_suffix) {
            continue;
        }
        keyed.push((extractor.key(&name), name));
    }

    keyed.sort_by(compare_keyed);
    let unkeyed = keyed.iter().filter(|(k, _)| k.is_none()).count();
    if unkeyed > 0 {
        debug!(unkeyed, "files without an ordering key sorted last");
    }

    Ok(keyed.into_iter().map(|(_, name)| name).collect())
}

/// Restartable view over the ordered contents of a segment directory.
///
/// Each call to [`iter`](Self::iter) lists the directory afresh.
#[derive(Debug, Clone)]
pub struct SegmentListing {
    directory: PathBuf,
    suffix: String,
    strategy: SortStrategy,
}

impl SegmentListing {
    /// Creates a listing; nothing is read until iteration.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>, suffix: impl Into<String>, strategy: SortStrategy) -> Self {
        Self {
            directory: directory.into(),
            suffix: suffix.into(),
            strategy,
        }
    }

    /// Lists and sorts the directory, yielding full paths.
    ///
    /// # Errors
    ///
    /// Same as [`sort`].
    pub fn iter(&self) -> Result<impl Iterator<Item = PathBuf> + '_, AssembleError> {
        let names = sort(&self.directory, &self.suffix, self.strategy)?;
        Ok(names.into_iter().map(|name| self.directory.join(name)))
    }
}

/// Segment files of one sanitized `title`, sorted by index.
///
/// Names are parsed strictly back into [`SegmentKey`]s, so other titles'
/// segments, artifacts and part files are all ignored.
///
/// # Errors
///
/// Same as [`sort`].
#[instrument(skip(directory), fields(directory = %directory.display()))]
pub fn title_segments(
    directory: &Path,
    title: &str,
    extension: &str,
) -> Result<Vec<SegmentFile>, AssembleError> {
    let suffix = format!(".{extension}");
    let mut files: Vec<SegmentFile> = sort(directory, &suffix, SortStrategy::TrailingIndex)?
        .into_iter()
        .filter_map(|name| {
            let key = SegmentKey::parse_file_name(&name, extension)?;
            (key.title() == title).then(|| SegmentFile {
                path: directory.join(&name),
                key,
            })
        })
        .collect();

    files.sort_by(|a, b| a.key.cmp(&b.key));
    files.dedup_by(|a, b| a.key == b.key);
    debug!(title, segments = files.len(), "title segments listed");
    Ok(files)
}

/// Indices in `0..expected` with no corresponding file.
///
/// `files` must be sorted by index, as [`title_segments`] returns them.
#[must_use]
pub fn missing_indices(files: &[SegmentFile], expected: u32) -> Vec<u32> {
    let mut present = files.iter().map(|f| f.key.index()).peekable();
    let mut missing = Vec::new();
    for index in 0..expected {
        while present.next_if(|&p| p < index).is_some() {}
        if present.next_if_eq(&index).is_none() {
            missing.push(index);
        }
    }
    missing
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn touch(dir: &Path, names: &[&str]) {
        for name in names {
            std::fs::write(dir.join(name), name.as_bytes()).unwrap();
        }
    }

    #[test]
    fn test_trailing_index_is_numeric_not_lexical() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), &["ep_10.ts", "ep_2.ts", "ep_1.ts", "ep_0.ts"]);

        let order = sort(temp.path(), ".ts", SortStrategy::TrailingIndex).unwrap();
        assert_eq!(order, vec!["ep_0.ts", "ep_1.ts", "ep_2.ts", "ep_10.ts"]);
    }

    #[test]
    fn test_unkeyed_names_sort_last_by_name() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), &["zeta.ts", "ep_3.ts", "alpha.ts", "ep_1.ts"]);

        let order = sort(temp.path(), ".ts", SortStrategy::TrailingIndex).unwrap();
        assert_eq!(order, vec!["ep_1.ts", "ep_3.ts", "alpha.ts", "zeta.ts"]);
    }

    #[test]
    fn test_suffix_filter_and_directories_ignored() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), &["ep_1.ts", "ep_2.png", ".ep_3.ts.part"]);
        std::fs::create_dir(temp.path().join("dir_4.ts")).unwrap();

        let order = sort(temp.path(), ".ts", SortStrategy::TrailingIndex).unwrap();
        assert_eq!(order, vec!["ep_1.ts"]);
    }

    #[test]
    fn test_numeric_groups_multi_level() {
        let temp = TempDir::new().unwrap();
        touch(
            temp.path(),
            &["c2_p10.png", "c10_p1.png", "c2_p2.png", "c1_p5.png"],
        );

        let order = sort(temp.path(), ".png", SortStrategy::NumericGroups).unwrap();
        assert_eq!(
            order,
            vec!["c1_p5.png", "c2_p2.png", "c2_p10.png", "c10_p1.png"]
        );
    }

    #[test]
    fn test_sort_missing_directory_errors() {
        let temp = TempDir::new().unwrap();
        let result = sort(&temp.path().join("absent"), ".ts", SortStrategy::TrailingIndex);
        assert!(matches!(result, Err(AssembleError::ReadDir { .. })));
    }

    #[test]
    fn test_listing_is_restartable() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), &["s_2.ts", "s_0.ts", "s_1.ts"]);
        let listing = SegmentListing::new(temp.path(), ".ts", SortStrategy::TrailingIndex);

        let first: Vec<PathBuf> = listing.iter().unwrap().collect();
        let second: Vec<PathBuf> = listing.iter().unwrap().collect();
        assert_eq!(first, second);
        assert_eq!(first[0], temp.path().join("s_0.ts"));
    }

    #[test]
    fn test_title_segments_filters_other_titles_and_artifacts() {
        let temp = TempDir::new().unwrap();
        touch(
            temp.path(),
            &["a_1.ts", "a_0.ts", "b_0.ts", "a.ts", ".a_2.ts.part"],
        );

        let files = title_segments(temp.path(), "a", "ts").unwrap();
        let indices: Vec<u32> = files.iter().map(|f| f.key.index()).collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(files[1].path, temp.path().join("a_1.ts"));
    }

    #[test]
    fn test_missing_indices_reports_gaps() {
        let files: Vec<SegmentFile> = [0u32, 2, 3]
            .iter()
            .map(|&i| SegmentFile {
                key: SegmentKey::new("t", i),
                path: PathBuf::from(format!("t_{i}.ts")),
            })
            .collect();

        assert_eq!(missing_indices(&files, 5), vec![1, 4]);
        assert!(missing_indices(&files, 0).is_empty());
        assert!(missing_indices(&files[..1], 1).is_empty());
    }

    #[test]
    fn test_sort_strategy_for_media() {
        assert_eq!(
            SortStrategy::for_media(MediaKind::Video),
            SortStrategy::TrailingIndex
        );
        assert_eq!(
            SortStrategy::for_media(MediaKind::Image),
            SortStrategy::NumericGroups
        );
    }
}
