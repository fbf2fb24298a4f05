//! Pure Rust image backend built on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `ImageReader::with_guessed_format` + `into_dimensions` (header only) |
//! | Decode (JPEG, PNG, GIF, WebP) | `image::load_from_memory` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Box with another aspect ratio | `DynamicImage::resize_to_fill` (center crop) |
//! | Encode → WebP | `WebPEncoder::new_lossless` (ignores quality) |
//! | Encode → AVIF | `AvifEncoder` (rav1e, speed 6) |
//! | Encode → JPEG | `JpegEncoder::new_with_quality` |
//! | Encode → PNG | `PngEncoder` |
//!
//! AVIF is encode-only: the `avif` feature does not bring a decoder, so AVIF
//! sources fail to decode and the optimizer leaves those images untouched.

use super::backend::{BackendError, Dimensions, ImageBackend};
use super::params::{OutputFormat, TranscodeParams};
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::fs;
use std::io::{BufWriter, Cursor};
use std::path::Path;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn decode(source: &[u8]) -> Result<DynamicImage, BackendError> {
    image::load_from_memory(source)
        .map_err(|e| BackendError::ProcessingFailed(format!("Failed to decode image: {e}")))
}

/// Scale to `width`x`height`. A box whose aspect ratio differs from the
/// source by more than a pixel is filled and center-cropped, never stretched.
fn resize(img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    if (width, height) == (img.width(), img.height()) {
        return img.clone();
    }
    let natural_height =
        (u64::from(img.height()) * u64::from(width)).div_ceil(u64::from(img.width().max(1)));
    if natural_height.abs_diff(u64::from(height)) <= 1 {
        img.resize_exact(width, height, FilterType::Lanczos3)
    } else {
        img.resize_to_fill(width, height, FilterType::Lanczos3)
    }
}

/// Encode `img` into `path` in the requested format.
fn save_image(
    img: &DynamicImage,
    path: &Path,
    format: OutputFormat,
    quality: u32,
) -> Result<(), BackendError> {
    let file = fs::File::create(path)?;
    let writer = BufWriter::new(file);
    let encoded = match format {
        OutputFormat::Webp => {
            // The pure Rust WebP encoder is lossless-only; quality does not apply.
            let rgba = DynamicImage::from(img.to_rgba8());
            rgba.write_with_encoder(image::codecs::webp::WebPEncoder::new_lossless(writer))
        }
        OutputFormat::Avif => img.write_with_encoder(
            image::codecs::avif::AvifEncoder::new_with_speed_quality(writer, 6, quality as u8),
        ),
        OutputFormat::Jpeg => {
            let rgb = DynamicImage::from(img.to_rgb8());
            rgb.write_with_encoder(image::codecs::jpeg::JpegEncoder::new_with_quality(
                writer,
                quality as u8,
            ))
        }
        OutputFormat::Png => {
            img.write_with_encoder(image::codecs::png::PngEncoder::new(writer))
        }
    };
    encoded.map_err(|e| {
        BackendError::ProcessingFailed(format!(
            "{} encode failed for {}: {e}",
            format,
            path.display()
        ))
    })
}

impl ImageBackend for RustBackend {
    fn identify(&self, source: &[u8]) -> Result<Dimensions, BackendError> {
        let (width, height) = ImageReader::new(Cursor::new(source))
            .with_guessed_format()?
            .into_dimensions()
            .map_err(|e| {
                BackendError::ProcessingFailed(format!("Failed to read dimensions: {e}"))
            })?;
        Ok(Dimensions { width, height })
    }

    fn supports(&self, format: OutputFormat) -> bool {
        matches!(
            format,
            OutputFormat::Webp | OutputFormat::Avif | OutputFormat::Jpeg | OutputFormat::Png
        )
    }

    fn transcode(
        &self,
        source: &[u8],
        variants: &[TranscodeParams],
    ) -> Result<Vec<u64>, BackendError> {
        if variants.is_empty() {
            return Ok(Vec::new());
        }
        let img = decode(source)?;
        let mut sizes = Vec::with_capacity(variants.len());
        for params in variants {
            let resized = resize(&img, params.width, params.height);
            save_image(&resized, &params.output, params.format, params.quality.value())?;
            sizes.push(fs::metadata(&params.output)?.len());
        }
        Ok(sizes)
    }
}
