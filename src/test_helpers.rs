//! Shared test utilities for the tagview test suite.
//!
//! Provides fixture writers (plain files, side-cars, synthetic images) and
//! bulk extractors that work with index data structures (`DatasetItem`).
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! write_file(tmp.path(), "cats/a.png", b"png");
//! write_file(tmp.path(), "cats/a.png.caption.txt", b"a cat");
//!
//! let root = DatasetRoot::open(tmp.path()).unwrap();
//! let built = build_index(&root, &IndexSource::Scan, &IndexOptions::default(), &mut |_| {}).unwrap();
//! assert_eq!(item_names(&built.items), vec!["a.png"]);
//! ```

use std::path::{Path, PathBuf};

use crate::scan::DatasetItem;

// =========================================================================
// Fixture setup
// =========================================================================

/// Write `bytes` to `dir/relative`, creating parent directories. Returns the
/// full path.
pub fn write_file(dir: &Path, relative: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Write a side-car tag file for `image` in the `tag_string_*` layout.
pub fn write_tag_sidecar(image: &Path, artist: &str, general: &str) -> PathBuf {
    let path = crate::metadata::sidecar_path(image, crate::metadata::TAGS_SUFFIX);
    let body = serde_json::json!({
        "tag_string_artist": artist,
        "tag_string_copyright": "",
        "tag_string_character": "",
        "tag_string_general": general,
    });
    std::fs::write(&path, body.to_string()).unwrap();
    path
}

/// Create a small valid JPEG file with the given dimensions.
#[cfg(feature = "imaging")]
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    use image::ImageEncoder;

    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let file = std::fs::File::create(path).unwrap();
    let writer = std::io::BufWriter::new(file);
    image::codecs::jpeg::JpegEncoder::new(writer)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
}

/// Create a JPEG like [`create_test_jpeg`] carrying an EXIF orientation tag.
#[cfg(feature = "imaging")]
pub fn create_test_jpeg_with_orientation(path: &Path, width: u32, height: u32, orientation: u8) {
    create_test_jpeg(path, width, height);
    let jpeg = std::fs::read(path).unwrap();

    // APP1: "Exif\0\0", big-endian TIFF header, one IFD entry 0x0112 SHORT.
    #[rustfmt::skip]
    let app1: [u8; 36] = [
        0xFF, 0xE1, 0x00, 0x22,
        b'E', b'x', b'i', b'f', 0x00, 0x00,
        b'M', b'M', 0x00, 0x2A, 0x00, 0x00, 0x00, 0x08,
        0x00, 0x01,
        0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01, 0x00, orientation, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00,
    ];
    let mut spliced = Vec::with_capacity(jpeg.len() + app1.len());
    spliced.extend_from_slice(&jpeg[..2]);
    spliced.extend_from_slice(&app1);
    spliced.extend_from_slice(&jpeg[2..]);
    std::fs::write(path, spliced).unwrap();
}

/// Create an RGBA PNG where every pixel is white with the given alpha.
#[cfg(feature = "imaging")]
pub fn create_test_png(path: &Path, width: u32, height: u32, alpha: u8) {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([255, 255, 255, alpha]));
    img.save_with_format(path, image::ImageFormat::Png).unwrap();
}

// =========================================================================
// Bulk extractors
// =========================================================================

/// All item names in index order.
pub fn item_names(items: &[DatasetItem]) -> Vec<&str> {
    items.iter().map(|i| i.name.as_str()).collect()
}

/// All item image paths in index order.
pub fn item_paths(items: &[DatasetItem]) -> Vec<&str> {
    items.iter().map(|i| i.image_path.as_str()).collect()
}
