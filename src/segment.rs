//! Segment identity and the job types that flow through the pipeline.
//!
//! A [`SegmentKey`] (`title` + `index`) is the only ordering contract in the
//! system. It travels as data from job submission to the fetch-write
//! boundary, where [`SegmentKey::file_name`] serializes it, and is recovered
//! at the assemble-read boundary by [`SegmentKey::parse_file_name`].

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Separator between the sanitized title and the index in segment filenames.
///
/// [`sanitize_title`] never emits this character, so a segment filename
/// contains it exactly once.
const INDEX_SEPARATOR: char = '_';

/// Title used when sanitization leaves nothing behind.
const FALLBACK_TITLE: &str = "untitled";

/// What kind of segments a run fetches, which decides file extensions,
/// fetch-time validation and the merge strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Transport-stream chunks concatenated and remuxed into one video.
    #[default]
    Video,
    /// Comic pages decoded, validated and stitched into one image.
    Image,
}

impl MediaKind {
    /// Extension of persisted segment files.
    #[must_use]
    pub fn segment_extension(self) -> &'static str {
        match self {
            Self::Video => "ts",
            Self::Image => "png",
        }
    }

    /// Stable lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "video" => Ok(Self::Video),
            "image" => Ok(Self::Image),
            other => Err(format!("unknown media kind '{other}': expected video or image")),
        }
    }
}

/// Maps a free-form title to a filesystem-safe name.
///
/// Path separators, reserved characters, whitespace, control characters and
/// the index separator `_` all become `-`; runs of `-` collapse and are
/// trimmed from both ends. Unicode letters and digits are kept as-is.
#[must_use]
pub fn sanitize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut prev_dash = false;
    for ch in title.chars() {
        let mapped = match ch {
            c if c.is_alphanumeric() || c == '.' => c,
            _ => '-',
        };
        if mapped == '-' {
            if !prev_dash {
                out.push('-');
                prev_dash = true;
            }
        } else {
            out.push(mapped);
            prev_dash = false;
        }
    }
    let trimmed = out.trim_matches(|c| c == '-' || c == '.');
    if trimmed.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Identity of one segment: which title it belongs to and where it sits.
///
/// `title` is always stored sanitized so that a key round-trips through its
/// filename unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentKey {
    title: String,
    index: u32,
}

impl SegmentKey {
    /// Creates a key, sanitizing the title.
    #[must_use]
    pub fn new(title: &str, index: u32) -> Self {
        Self {
            title: sanitize_title(title),
            index,
        }
    }

    /// Sanitized title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Position of the segment within its title.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Serializes the key into `<title>_<index>.<extension>`.
    #[must_use]
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}{INDEX_SEPARATOR}{}.{extension}", self.title, self.index)
    }

    /// Parses a filename produced by [`file_name`](Self::file_name).
    ///
    /// Returns `None` for anything that does not have exactly the
    /// `<title>_<index>.<extension>` shape, including hidden part files and
    /// merged artifacts.
    #[must_use]
    pub fn parse_file_name(file_name: &str, extension: &str) -> Option<Self> {
        if file_name.starts_with('.') {
            return None;
        }
        let stem = file_name.strip_suffix(extension)?.strip_suffix('.')?;
        let (title, index) = stem.split_once(INDEX_SEPARATOR)?;
        if title.is_empty() || index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if title.contains(INDEX_SEPARATOR) || sanitize_title(title) != title {
            return None;
        }
        let index = index.parse().ok()?;
        Some(Self {
            title: title.to_string(),
            index,
        })
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.title, self.index)
    }
}

/// One segment to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Ordering identity, fixed at submission time.
    pub key: SegmentKey,
    /// Where to fetch the segment from.
    pub url: String,
}

impl Job {
    /// Creates a job for `url` at position `index` of `title`.
    #[must_use]
    pub fn new(title: &str, index: u32, url: impl Into<String>) -> Self {
        Self {
            key: SegmentKey::new(title, index),
            url: url.into(),
        }
    }

    /// Builds the job set for one title from its resolved URL list.
    ///
    /// Indices follow enumeration order of `urls`.
    #[must_use]
    pub fn for_title(title: &str, urls: &[String]) -> Vec<Self> {
        urls.iter()
            .zip(0u32..)
            .map(|(url, index)| Self::new(title, index, url.clone()))
            .collect()
    }

    /// Strips the job down to what a later round needs to resubmit it.
    #[must_use]
    pub fn to_retry_entry(&self) -> RetryEntry {
        RetryEntry {
            index: self.key.index,
            url: self.url.clone(),
            title: self.key.title.clone(),
        }
    }
}

/// A job waiting in the retry set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryEntry {
    /// Segment position within its title.
    pub index: u32,
    /// Segment URL.
    pub url: String,
    /// Sanitized title.
    pub title: String,
}

impl RetryEntry {
    /// Key of the segment this entry retries.
    #[must_use]
    pub fn key(&self) -> SegmentKey {
        SegmentKey {
            title: self.title.clone(),
            index: self.index,
        }
    }

    /// Rebuilds a job for resubmission.
    #[must_use]
    pub fn to_job(&self) -> Job {
        Job {
            key: self.key(),
            url: self.url.clone(),
        }
    }
}

/// A segment persisted on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFile {
    /// Identity recovered from (or written into) the filename.
    pub key: SegmentKey,
    /// Location of the file.
    pub path: PathBuf,
}
