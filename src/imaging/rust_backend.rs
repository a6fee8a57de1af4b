//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, WebP, GIF) | `image` crate (pure Rust decoders) |
//! | Orientation | `ImageDecoder::orientation` + `DynamicImage::apply_orientation` |
//! | Flatten alpha | per-pixel composite onto the matte colour |
//! | Resize | `image::imageops::resize` with `Lanczos3` filter |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` |

use super::backend::{BackendError, ImageBackend};
use super::calculations::calculate_fit_dimensions;
use super::params::RenditionParams;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageDecoder, ImageReader, Rgb, RgbImage};
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

/// Load and decode an image from disk, upright according to its EXIF
/// orientation.
fn load_oriented(path: &Path) -> Result<DynamicImage, BackendError> {
    let decode_err = |e: image::ImageError| {
        BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
    };

    let mut decoder = ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()
        .map_err(decode_err)?;
    let orientation = decoder.orientation().map_err(decode_err)?;
    let mut img = DynamicImage::from_decoder(decoder).map_err(decode_err)?;
    img.apply_orientation(orientation);
    Ok(img)
}

/// Composite onto an opaque background. Images without alpha are converted
/// as-is.
fn flatten(img: &DynamicImage, matte: [u8; 3]) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as u32;
        let blend =
            |c: u8, bg: u8| ((c as u32 * alpha + bg as u32 * (255 - alpha) + 127) / 255) as u8;
        Rgb([blend(r, matte[0]), blend(g, matte[1]), blend(b, matte[2])])
    })
}

/// Encode as baseline JPEG at the given quality.
fn save_jpeg(img: RgbImage, path: &Path, quality: u32) -> Result<(), BackendError> {
    let file = std::fs::File::create(path)?;
    let writer = std::io::BufWriter::new(file);
    let encoder = JpegEncoder::new_with_quality(writer, quality.min(100) as u8);
    DynamicImage::ImageRgb8(img)
        .write_with_encoder(encoder)
        .map_err(|e| BackendError::ProcessingFailed(format!("JPEG encode failed: {}", e)))
}

impl ImageBackend for RustBackend {
    fn render(&self, params: &RenditionParams) -> Result<(), BackendError> {
        let img = load_oriented(&params.source)?;
        let rgb = flatten(&img, params.matte);

        let (width, height) = calculate_fit_dimensions(rgb.dimensions(), params.max_dimension);
        let fitted = if (width, height) == rgb.dimensions() {
            rgb
        } else {
            image::imageops::resize(&rgb, width, height, FilterType::Lanczos3)
        };

        save_jpeg(fitted, &params.output, params.quality.value())
    }
}
