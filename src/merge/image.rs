//! Image merge: stacking comic pages onto a single canvas.
//!
//! Pages are placed one after another along the stacking axis and aligned
//! to the top (horizontal) or left (vertical) edge on the cross axis. The
//! canvas is as large as the sum of extents along the stacking axis and the
//! largest extent across it; uncovered areas stay transparent.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ::image::{DynamicImage, ImageFormat, RgbaImage, imageops};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, instrument};

use super::MergeError;

/// Stacking direction for comic pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StackMode {
    /// Pages top to bottom.
    #[default]
    Vertical,
    /// Pages left to right.
    Horizontal,
}

impl StackMode {
    /// Stable lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vertical => "vertical",
            Self::Horizontal => "horizontal",
        }
    }
}

impl fmt::Display for StackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StackMode {
    type Err = MergeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "vertical" => Ok(Self::Vertical),
            "horizontal" => Ok(Self::Horizontal),
            _ => Err(MergeError::InvalidMode {
                value: value.to_string(),
            }),
        }
    }
}

impl<'de> Deserialize<'de> for StackMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Canvas dimensions for pages of the given `(width, height)` sizes.
///
/// Returns `None` if the stacking axis would overflow `u32`.
#[must_use]
pub fn canvas_size(sizes: &[(u32, u32)], mode: StackMode) -> Option<(u32, u32)> {
    let max_w = sizes.iter().map(|s| s.0).max().unwrap_or(0);
    let max_h = sizes.iter().map(|s| s.1).max().unwrap_or(0);
    match mode {
        StackMode::Vertical => {
            let total = sizes.iter().try_fold(0u32, |acc, s| acc.checked_add(s.1))?;
            Some((max_w, total))
        }
        StackMode::Horizontal => {
            let total = sizes.iter().try_fold(0u32, |acc, s| acc.checked_add(s.0))?;
            Some((total, max_h))
        }
    }
}

/// Paste offsets for each page, in order.
fn offsets(sizes: &[(u32, u32)], mode: StackMode) -> Vec<(u32, u32)> {
    let mut cursor = 0u32;
    sizes
        .iter()
        .map(|&(w, h)| {
            let at = match mode {
                StackMode::Vertical => (0, cursor),
                StackMode::Horizontal => (cursor, 0),
            };
            cursor = cursor.saturating_add(match mode {
                StackMode::Vertical => h,
                StackMode::Horizontal => w,
            });
            at
        })
        .collect()
}

/// Stacks `pages` onto one RGBA canvas.
///
/// # Errors
///
/// Returns [`MergeError::CanvasTooLarge`] if the stacked extent overflows.
pub fn compose(pages: &[DynamicImage], mode: StackMode) -> Result<RgbaImage, MergeError> {
    let sizes: Vec<(u32, u32)> = pages.iter().map(|p| (p.width(), p.height())).collect();
    let (width, height) = canvas_size(&sizes, mode).ok_or(MergeError::CanvasTooLarge {
        count: pages.len(),
        max: u32::MAX,
    })?;

    let mut canvas = RgbaImage::new(width, height);
    for (page, (x, y)) in pages.iter().zip(offsets(&sizes, mode)) {
        imageops::replace(&mut canvas, &page.to_rgba8(), i64::from(x), i64::from(y));
    }
    Ok(canvas)
}

fn load_page(path: &Path) -> Result<DynamicImage, MergeError> {
    ::image::open(path).map_err(|source| MergeError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

fn compose_to_file(
    ordered: &[PathBuf],
    output_path: &Path,
    mode: StackMode,
) -> Result<(u32, u32), MergeError> {
    let pages = ordered
        .iter()
        .map(|p| load_page(p))
        .collect::<Result<Vec<_>, _>>()?;
    let canvas = compose(&pages, mode)?;
    canvas
        .save_with_format(output_path, ImageFormat::Png)
        .map_err(|source| MergeError::Encode {
            path: output_path.to_path_buf(),
            source,
        })?;
    Ok(canvas.dimensions())
}

/// Stacks the pages in `ordered` and writes the result as PNG to
/// `output_path`.
///
/// Decoding and encoding run on the blocking pool.
///
/// # Errors
///
/// Returns [`MergeError::NoSegments`] for an empty list,
/// [`MergeError::Decode`] for an unreadable page and
/// [`MergeError::Encode`] if the PNG cannot be written.
#[instrument(skip(ordered), fields(pages = ordered.len(), output = %output_path.display()))]
pub async fn merge_images(
    ordered: &[PathBuf],
    output_path: &Path,
    mode: StackMode,
) -> Result<PathBuf, MergeError> {
    let title = output_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    if ordered.is_empty() {
        return Err(MergeError::no_segments(title));
    }

    let pages = ordered.to_vec();
    let output = output_path.to_path_buf();
    let (width, height) =
        tokio::task::spawn_blocking(move || compose_to_file(&pages, &output, mode))
            .await
            .map_err(|_| MergeError::TaskFailed { title })??;

    debug!(width, height, %mode, "composite written");
    info!(path = %output_path.display(), "pages stitched");
    Ok(output_path.to_path_buf())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use ::image::Rgba;
    use tempfile::TempDir;

    use super::*;

    fn solid(w: u32, h: u32, px: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba(px)))
    }

    #[test]
    fn test_stack_mode_parse() {
        assert_eq!("vertical".parse::<StackMode>().unwrap(), StackMode::Vertical);
        assert_eq!(" Horizontal ".parse::<StackMode>().unwrap(), StackMode::Horizontal);
        assert!(matches!(
            "diagonal".parse::<StackMode>(),
            Err(MergeError::InvalidMode { value }) if value == "diagonal"
        ));
    }

    #[test]
    fn test_canvas_size_vertical_and_horizontal() {
        let sizes = [(100, 50), (80, 60)];
        assert_eq!(canvas_size(&sizes, StackMode::Vertical), Some((100, 110)));
        assert_eq!(canvas_size(&sizes, StackMode::Horizontal), Some((180, 60)));
        assert_eq!(canvas_size(&[], StackMode::Vertical), Some((0, 0)));
    }

    #[test]
    fn test_canvas_size_overflow_is_none() {
        let sizes = [(1, u32::MAX), (1, 1)];
        assert_eq!(canvas_size(&sizes, StackMode::Vertical), None);
    }

    #[test]
    fn test_offsets_accumulate_along_axis() {
        let sizes = [(100, 50), (80, 60), (10, 10)];
        assert_eq!(
            offsets(&sizes, StackMode::Vertical),
            vec![(0, 0), (0, 50), (0, 110)]
        );
        assert_eq!(
            offsets(&sizes, StackMode::Horizontal),
            vec![(0, 0), (100, 0), (180, 0)]
        );
    }

    #[test]
    fn test_compose_vertical_places_pages() {
        let red = [255, 0, 0, 255];
        let blue = [0, 0, 255, 255];
        let canvas = compose(
            &[solid(100, 50, red), solid(80, 60, blue)],
            StackMode::Vertical,
        )
        .unwrap();

        assert_eq!(canvas.dimensions(), (100, 110));
        assert_eq!(canvas.get_pixel(0, 0).0, red);
        assert_eq!(canvas.get_pixel(99, 49).0, red);
        assert_eq!(canvas.get_pixel(0, 50).0, blue);
        assert_eq!(canvas.get_pixel(79, 109).0, blue);
        // Right of the narrower page stays empty.
        assert_eq!(canvas.get_pixel(90, 80).0, [0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_merge_images_writes_png() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("c_0.png");
        let b = temp.path().join("c_1.png");
        solid(4, 3, [1, 2, 3, 255]).save(&a).unwrap();
        solid(5, 2, [4, 5, 6, 255]).save(&b).unwrap();
        let out = temp.path().join("c.png");

        let path = merge_images(&[a, b], &out, StackMode::Horizontal)
            .await
            .unwrap();

        let merged = ::image::open(path).unwrap();
        assert_eq!((merged.width(), merged.height()), (9, 3));
    }

    #[tokio::test]
    async fn test_merge_images_rejects_empty_and_bad_pages() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("c.png");
        assert!(matches!(
            merge_images(&[], &out, StackMode::Vertical).await,
            Err(MergeError::NoSegments { title }) if title == "c"
        ));

        let bogus = temp.path().join("c_0.png");
        std::fs::write(&bogus, b"not a png").unwrap();
        assert!(matches!(
            merge_images(&[bogus], &out, StackMode::Vertical).await,
            Err(MergeError::Decode { .. })
        ));
    }
}
