//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use segmerge_core::{MediaKind, StackMode};

/// How positional inputs are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum InputKind {
    /// JSON manifest files: {"titles": [{"title", "segments"}]}
    #[default]
    Manifest,
    /// HLS media playlist URLs
    Playlist,
}

/// Fetch media segments concurrently and merge them per title.
///
/// Video titles are concatenated and remuxed into one file; comic titles are
/// stitched into one image.
#[derive(Parser, Debug)]
#[command(name = "segmerge")]
#[command(author, version, about)]
pub struct Args {
    /// Manifest files or playlist URLs to process
    #[arg(required = true, value_name = "INPUT")]
    pub inputs: Vec<String>,

    /// Directory for segments and merged artifacts
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Maximum concurrent segment fetches (1-256) [default: 32]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u16).range(1..=256))]
    pub max_parallelism: Option<u16>,

    /// Retry rounds for failed segments (0-10) [default: 3]
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub retry_times: Option<u8>,

    /// Segment kind: video or image [default: video]
    #[arg(long)]
    pub media: Option<MediaKind>,

    /// Stacking direction for image merges: vertical or horizontal [default: vertical]
    #[arg(long)]
    pub merge_mode: Option<StackMode>,

    /// How inputs are resolved
    #[arg(long = "from", value_enum, default_value_t = InputKind::Manifest)]
    pub input_kind: InputKind,

    /// Title for playlist inputs (default: the playlist's directory name)
    #[arg(long)]
    pub title: Option<String>,

    /// Process at most this many titles
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_titles: Option<u32>,

    /// Do not merge titles with permanently failed segments
    #[arg(long)]
    pub skip_incomplete: bool,

    /// Delete segment files after a successful merge
    #[arg(long)]
    pub clean_segments: bool,

    /// Keep the concatenated .ts instead of remuxing to .mp4
    #[arg(long)]
    pub no_remux: bool,

    /// Path to the ffmpeg binary used for remuxing
    #[arg(long, value_name = "PATH")]
    pub ffmpeg: Option<PathBuf>,

    /// Config file (default: $XDG_CONFIG_HOME/segmerge/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
