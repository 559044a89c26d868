//! Autocrop of rendered screenshots.
//!
//! Renderer screenshots are full-viewport captures with the diagram somewhere
//! on a white page. Trimming finds the smallest box holding every non-white
//! pixel, crops to it and optionally pastes the crop onto a white canvas with
//! a uniform margin.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::error::{LimitError, LimitErrorKind, ParameterError, ParameterErrorKind};
use image::{DynamicImage, ImageError, ImageFormat, Rgb, RgbImage, imageops};
use mmdshot_config::EmptyContentPolicy;

use crate::consts::{BACKGROUND, MAX_CANVAS_BYTES, SCREENSHOT_EXT, SCREENSHOT_PREFIX};

/// Per-image trim failure, tagged with the diagram index.
#[derive(Debug, thiserror::Error)]
#[error("image {index}: {kind}")]
pub struct TrimError {
    /// Zero-based index of the diagram in the batch.
    pub index: usize,
    /// What went wrong.
    #[source]
    pub kind: TrimErrorKind,
}

impl TrimError {
    #[must_use]
    pub fn new(index: usize, kind: TrimErrorKind) -> Self {
        Self { index, kind }
    }
}

/// Kind of per-image failure.
#[derive(Debug, thiserror::Error)]
pub enum TrimErrorKind {
    /// The renderer output is not valid base64.
    #[error("invalid base64: {0}")]
    Decode(#[from] base64::DecodeError),
    /// The decoded bytes are not a supported image, or encoding failed.
    #[error("image error: {0}")]
    Image(#[from] ImageError),
    /// The trimmed image could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The image is blank and the policy rejects blank images.
    #[error("image has no content to trim to")]
    EmptyContent,
}

/// Rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Box covering the whole image.
    #[must_use]
    pub fn full(image: &DynamicImage) -> Self {
        Self {
            x: 0,
            y: 0,
            width: image.width(),
            height: image.height(),
        }
    }
}

/// How trimmed images are finished.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrimOptions {
    /// Border added around the crop, in pixels. Zero leaves the crop as-is.
    pub margin: u32,
    /// What to do when an image has no content.
    pub empty_content: EmptyContentPolicy,
}

/// Smallest box containing every pixel that is not pure white.
///
/// Pixels are compared on their grayscale value, inverted so that background
/// becomes zero. Returns `None` for a blank image.
#[must_use]
pub fn content_bounds(image: &DynamicImage) -> Option<BoundingBox> {
    let mut gray = image.to_luma8();
    imageops::invert(&mut gray);

    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in gray.enumerate_pixels() {
        if pixel.0[0] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((min_x, min_y, max_x, max_y)) => {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            }
        });
    }

    bounds.map(|(min_x, min_y, max_x, max_y)| BoundingBox {
        x: min_x,
        y: min_y,
        width: max_x - min_x + 1,
        height: max_y - min_y + 1,
    })
}

/// Paste `image` onto a white RGB canvas `2 * margin` larger in each dimension.
///
/// # Errors
///
/// Returns an error if the canvas dimensions overflow or the canvas would
/// exceed the memory budget.
pub fn add_margin(image: &DynamicImage, margin: u32) -> Result<DynamicImage, ImageError> {
    let grow = |side: u32| {
        margin
            .checked_mul(2)
            .and_then(|m| side.checked_add(m))
            .ok_or_else(|| {
                ImageError::Parameter(ParameterError::from_kind(
                    ParameterErrorKind::DimensionMismatch,
                ))
            })
    };
    let width = grow(image.width())?;
    let height = grow(image.height())?;

    let bytes = u64::from(width)
        .checked_mul(u64::from(height))
        .and_then(|pixels| pixels.checked_mul(3));
    if bytes.is_none_or(|bytes| bytes > MAX_CANVAS_BYTES) {
        return Err(ImageError::Limits(LimitError::from_kind(
            LimitErrorKind::InsufficientMemory,
        )));
    }

    let mut canvas = RgbImage::from_pixel(width, height, Rgb(BACKGROUND));
    imageops::replace(
        &mut canvas,
        &image.to_rgb8(),
        i64::from(margin),
        i64::from(margin),
    );
    Ok(DynamicImage::ImageRgb8(canvas))
}

/// Crop `image` to its content and apply the margin.
///
/// # Errors
///
/// Returns [`TrimErrorKind::EmptyContent`] for a blank image under
/// [`EmptyContentPolicy::Reject`], or an image error if bordering fails.
pub fn trim_image(
    image: &DynamicImage,
    options: TrimOptions,
) -> Result<DynamicImage, TrimErrorKind> {
    let bounds = match content_bounds(image) {
        Some(bounds) => bounds,
        None => match options.empty_content {
            EmptyContentPolicy::Reject => return Err(TrimErrorKind::EmptyContent),
            EmptyContentPolicy::FullFrame => {
                tracing::warn!(
                    width = image.width(),
                    height = image.height(),
                    "Image has no content, keeping full frame"
                );
                BoundingBox::full(image)
            }
        },
    };

    let cropped = image.crop_imm(bounds.x, bounds.y, bounds.width, bounds.height);
    if options.margin == 0 {
        return Ok(cropped);
    }
    Ok(add_margin(&cropped, options.margin)?)
}

/// Decode one base64-encoded renderer image.
///
/// # Errors
///
/// Returns an error if the text is not base64 or the bytes are not an image.
pub fn decode_image(encoded: &str) -> Result<DynamicImage, TrimErrorKind> {
    let bytes = STANDARD.decode(encoded.trim())?;
    Ok(image::load_from_memory(&bytes)?)
}

/// Encode an image as PNG.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

/// File name of the screenshot for diagram `index`.
#[must_use]
pub fn screenshot_filename(index: usize) -> String {
    format!("{SCREENSHOT_PREFIX}-{index}.{SCREENSHOT_EXT}")
}

/// Decode, trim and persist one screenshot into `output_dir`.
///
/// # Errors
///
/// Returns a [`TrimError`] tagged with `index` on any failure.
pub fn trim_to_file(
    index: usize,
    encoded: &str,
    options: TrimOptions,
    output_dir: &Path,
) -> Result<PathBuf, TrimError> {
    let tag = |kind| TrimError::new(index, kind);

    let image = decode_image(encoded).map_err(tag)?;
    let trimmed = trim_image(&image, options).map_err(tag)?;
    let png = encode_png(&trimmed).map_err(|e| tag(e.into()))?;

    let path = output_dir.join(screenshot_filename(index));
    std::fs::write(&path, png).map_err(|source| {
        tag(TrimErrorKind::Io {
            path: path.clone(),
            source,
        })
    })?;

    tracing::debug!(
        index,
        width = trimmed.width(),
        height = trimmed.height(),
        path = %path.display(),
        "Saved screenshot"
    );
    Ok(path)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    /// White `width x height` page with a black rectangle at `content`.
    pub(crate) fn page(width: u32, height: u32, content: Option<BoundingBox>) -> DynamicImage {
        let mut img = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
        if let Some(b) = content {
            for y in b.y..b.y + b.height {
                for x in b.x..b.x + b.width {
                    img.put_pixel(x, y, Rgb([0, 0, 0]));
                }
            }
        }
        DynamicImage::ImageRgb8(img)
    }

    pub(crate) fn encode_base64(image: &DynamicImage) -> String {
        STANDARD.encode(encode_png(image).unwrap())
    }

    fn rect(x: u32, y: u32, width: u32, height: u32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width,
            height,
        }
    }

    #[test]
    fn test_content_bounds_finds_box() {
        let img = page(40, 30, Some(rect(5, 7, 10, 4)));
        assert_eq!(content_bounds(&img), Some(rect(5, 7, 10, 4)));
    }

    #[test]
    fn test_content_bounds_single_pixel() {
        let img = page(10, 10, Some(rect(9, 0, 1, 1)));
        assert_eq!(content_bounds(&img), Some(rect(9, 0, 1, 1)));
    }

    #[test]
    fn test_content_bounds_blank_page() {
        assert_eq!(content_bounds(&page(10, 10, None)), None);
    }

    #[test]
    fn test_content_bounds_near_white_is_content() {
        let mut img = RgbImage::from_pixel(8, 8, Rgb([255, 255, 255]));
        img.put_pixel(3, 4, Rgb([250, 250, 250]));
        let img = DynamicImage::ImageRgb8(img);
        assert_eq!(content_bounds(&img), Some(rect(3, 4, 1, 1)));
    }

    #[test]
    fn test_trim_without_margin_is_exact_crop() {
        let img = page(50, 40, Some(rect(10, 5, 20, 15)));
        let trimmed = trim_image(&img, TrimOptions::default()).unwrap();
        assert_eq!((trimmed.width(), trimmed.height()), (20, 15));
        // Crop keeps the source color type.
        assert!(matches!(trimmed, DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn test_trim_without_margin_keeps_alpha() {
        let mut img = RgbaImage::from_pixel(6, 6, Rgba([255, 255, 255, 255]));
        img.put_pixel(2, 2, Rgba([0, 0, 0, 255]));
        let img = DynamicImage::ImageRgba8(img);
        let trimmed = trim_image(&img, TrimOptions::default()).unwrap();
        assert!(matches!(trimmed, DynamicImage::ImageRgba8(_)));
        assert_eq!((trimmed.width(), trimmed.height()), (1, 1));
    }

    #[test]
    fn test_margin_geometry() {
        let img = page(50, 40, Some(rect(10, 5, 20, 15)));
        let options = TrimOptions {
            margin: 7,
            ..TrimOptions::default()
        };
        let trimmed = trim_image(&img, options).unwrap().to_rgb8();

        assert_eq!(trimmed.dimensions(), (20 + 14, 15 + 14));
        // Content sits at (m, m) and the border is white.
        assert_eq!(trimmed.get_pixel(7, 7), &Rgb([0, 0, 0]));
        assert_eq!(trimmed.get_pixel(7 + 19, 7 + 14), &Rgb([0, 0, 0]));
        assert_eq!(trimmed.get_pixel(6, 7), &Rgb([255, 255, 255]));
        assert_eq!(trimmed.get_pixel(7, 6), &Rgb([255, 255, 255]));
        assert_eq!(trimmed.get_pixel(7 + 20, 7 + 15), &Rgb([255, 255, 255]));
        assert_eq!(content_bounds(&DynamicImage::ImageRgb8(trimmed)), Some(rect(7, 7, 20, 15)));
    }

    #[test]
    fn test_add_margin_converts_to_rgb() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 2, Rgba([0, 0, 0, 255])));
        let bordered = add_margin(&img, 1).unwrap();
        assert!(matches!(bordered, DynamicImage::ImageRgb8(_)));
        assert_eq!((bordered.width(), bordered.height()), (5, 4));
    }

    #[test]
    fn test_add_margin_overflow() {
        let img = page(2, 2, None);
        assert!(add_margin(&img, u32::MAX).is_err());
    }

    #[test]
    fn test_huge_margin_is_an_error() {
        let img = page(4, 4, Some(rect(1, 1, 2, 2)));
        let options = TrimOptions {
            margin: 1_000_000,
            ..TrimOptions::default()
        };
        let err = trim_image(&img, options).unwrap_err();
        assert!(matches!(err, TrimErrorKind::Image(ImageError::Limits(_))));
    }

    #[test]
    fn test_trim_is_idempotent() {
        let img = page(64, 48, Some(rect(12, 9, 30, 20)));
        let options = TrimOptions {
            margin: 4,
            ..TrimOptions::default()
        };
        let first = encode_png(&trim_image(&img, options).unwrap()).unwrap();
        let second = encode_png(&trim_image(&img, options).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_content_full_frame() {
        let img = page(12, 9, None);
        let options = TrimOptions {
            margin: 2,
            empty_content: EmptyContentPolicy::FullFrame,
        };
        let trimmed = trim_image(&img, options).unwrap();
        assert_eq!((trimmed.width(), trimmed.height()), (16, 13));
    }

    #[test]
    fn test_empty_content_reject() {
        let img = page(12, 9, None);
        let options = TrimOptions {
            margin: 0,
            empty_content: EmptyContentPolicy::Reject,
        };
        let err = trim_image(&img, options).unwrap_err();
        assert!(matches!(err, TrimErrorKind::EmptyContent));
    }

    #[test]
    fn test_decode_image_errors() {
        assert!(matches!(
            decode_image("not base64!!").unwrap_err(),
            TrimErrorKind::Decode(_)
        ));
        // "hello" is valid base64 text but not an image.
        assert!(matches!(
            decode_image("aGVsbG8=").unwrap_err(),
            TrimErrorKind::Image(_)
        ));
    }

    #[test]
    fn test_screenshot_filename() {
        assert_eq!(screenshot_filename(0), "screenshot-0.png");
        assert_eq!(screenshot_filename(12), "screenshot-12.png");
    }

    #[test]
    fn test_trim_to_file() {
        let tmp = TempDir::new().unwrap();
        let encoded = encode_base64(&page(30, 30, Some(rect(3, 4, 5, 6))));

        let path = trim_to_file(2, &encoded, TrimOptions::default(), tmp.path()).unwrap();

        assert_eq!(path, tmp.path().join("screenshot-2.png"));
        let saved = image::open(&path).unwrap();
        assert_eq!((saved.width(), saved.height()), (5, 6));
    }

    #[test]
    fn test_trim_to_file_tags_index() {
        let tmp = TempDir::new().unwrap();
        let err = trim_to_file(4, "%%%", TrimOptions::default(), tmp.path()).unwrap_err();
        assert_eq!(err.index, 4);
        assert!(err.to_string().starts_with("image 4:"));
        assert!(!tmp.path().join("screenshot-4.png").exists());
    }

    #[test]
    fn test_trim_to_file_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let encoded = encode_base64(&page(4, 4, Some(rect(1, 1, 1, 1))));
        let err = trim_to_file(0, &encoded, TrimOptions::default(), &tmp.path().join("gone"))
            .unwrap_err();
        assert!(matches!(err.kind, TrimErrorKind::Io { .. }));
    }
}
