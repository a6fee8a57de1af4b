//! Dataset index construction.
//!
//! Produces the ordered list of [`DatasetItem`]s the viewer serves. There are
//! two ways to find items, chosen once per build by [`IndexSource::discover`]:
//!
//! ## Manifest mode
//!
//! A newline-delimited JSON file lists the items explicitly. Each line is an
//! object with optional `image_path`, `caption_path` and tag-slot fields (see
//! [`ManifestRow`]). Lines that fail to parse, rows whose image escapes the
//! root, and rows whose image no longer exists are skipped.
//!
//! ## Scan mode
//!
//! Without a manifest the whole root is walked and every file with a known
//! image extension becomes an item. Captions and tags come from side-car
//! files next to each image (see [`crate::metadata`]).
//!
//! ```text
//! dataset/
//! ├── .thumbs/                   # derivative cache, never indexed
//! ├── 001.png
//! ├── 001.png.caption.txt
//! ├── 001.png.json
//! └── more/
//!     └── 002.JPG
//! ```
//!
//! ## Ordering
//!
//! The finished list is sorted by lowercase file name, ties broken by the
//! relative path. Re-running a build over unchanged input produces the same
//! sequence, which is what lets the UI paginate predictably.

use crate::metadata::{self, ManifestRow, Tags};
use crate::sandbox::{self, DatasetRoot};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error reading manifest {0}: {1}")]
    Manifest(PathBuf, #[source] io::Error),
}

/// Extensions (lowercase) of files picked up by a directory scan.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

/// URL prefix under which original files are served.
pub const FILES_PREFIX: &str = "files";

/// One dataset entry as served by the items query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetItem {
    /// Display name: the source image's file name.
    pub name: String,
    /// Root-relative path of the original image, forward slashes.
    pub image_path: String,
    pub image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_url: Option<String>,
    pub caption: String,
    pub tags: Tags,
}

impl DatasetItem {
    fn new(name: String, relative: &Path, caption: String, tags: Tags) -> Self {
        let image_path = sandbox::to_posix(relative);
        Self {
            name,
            image_url: sandbox::url_path(FILES_PREFIX, &image_path),
            image_path,
            thumb_url: None,
            display_url: None,
            caption,
            tags,
        }
    }
}

/// Where the items of a build come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexSource {
    Manifest(PathBuf),
    Scan,
}

impl IndexSource {
    /// Pick the index source for a root.
    ///
    /// First existing wins: the explicit path, `<root>/<manifest_name>`,
    /// then `<root>/../<manifest_name>` when `parent_fallback` is set.
    /// Falls back to scanning.
    pub fn discover(
        root: &DatasetRoot,
        explicit: Option<&Path>,
        manifest_name: &str,
        parent_fallback: bool,
    ) -> Self {
        if let Some(path) = explicit {
            if path.is_file() {
                return Self::Manifest(path.to_path_buf());
            }
            warn!("manifest {} not found, looking for a default", path.display());
        }
        if manifest_name.is_empty() {
            return Self::Scan;
        }
        let in_root = root.path().join(manifest_name);
        if in_root.is_file() {
            return Self::Manifest(in_root);
        }
        if parent_fallback
            && let Some(parent) = root.path().parent()
        {
            let in_parent = parent.join(manifest_name);
            if in_parent.is_file() {
                return Self::Manifest(in_parent);
            }
        }
        Self::Scan
    }
}

/// Knobs for a single build.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Invoke the progress callback every this many processed items.
    pub progress_interval: usize,
    /// Top-level directory names never descended into (derivative caches).
    pub skip_dirs: Vec<String>,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            progress_interval: 500,
            skip_dirs: Vec::new(),
        }
    }
}

/// Result of a build: the sorted items plus how many records were processed.
///
/// For a scan, `processed` equals `items.len()`; for a manifest it counts
/// non-blank lines, including skipped ones.
#[derive(Debug, Default)]
pub struct BuiltIndex {
    pub items: Vec<DatasetItem>,
    pub processed: usize,
}

/// Build the index from `source`.
///
/// `progress` receives the cumulative processed count every
/// `options.progress_interval` records.
pub fn build_index(
    root: &DatasetRoot,
    source: &IndexSource,
    options: &IndexOptions,
    progress: &mut dyn FnMut(usize),
) -> Result<BuiltIndex, ScanError> {
    let mut built = match source {
        IndexSource::Manifest(path) => {
            info!("indexing from manifest {}", path.display());
            load_manifest(root, path, options, progress)?
        }
        IndexSource::Scan => {
            info!("indexing by scanning {}", root.path().display());
            scan_root(root, options, progress)
        }
    };
    sort_items(&mut built.items);
    Ok(built)
}

/// Case-insensitive name order, relative path as tie-breaker.
pub fn sort_items(items: &mut [DatasetItem]) {
    items.sort_by_cached_key(|item| (item.name.to_lowercase(), item.image_path.clone()));
}

fn load_manifest(
    root: &DatasetRoot,
    manifest: &Path,
    options: &IndexOptions,
    progress: &mut dyn FnMut(usize),
) -> Result<BuiltIndex, ScanError> {
    let io_err = |e| ScanError::Manifest(manifest.to_path_buf(), e);
    let mut reader = BufReader::new(File::open(manifest).map_err(io_err)?);
    let mut built = BuiltIndex::default();
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).map_err(io_err)? == 0 {
            break;
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        built.processed += 1;

        match serde_json::from_slice::<ManifestRow>(&line) {
            Ok(row) => {
                if let Some(item) = item_from_row(root, &row) {
                    built.items.push(item);
                }
            }
            Err(e) => debug!("skipping manifest line {}: {}", built.processed, e),
        }

        report(built.processed, options.progress_interval, progress);
    }
    Ok(built)
}

fn item_from_row(root: &DatasetRoot, row: &ManifestRow) -> Option<DatasetItem> {
    let image_path = row.image_path.as_deref().filter(|p| !p.trim().is_empty())?;
    let resolved = match root.resolve(image_path) {
        Ok(p) => p,
        Err(e) => {
            debug!("skipping manifest row: {}", e);
            return None;
        }
    };
    if !resolved.is_file() {
        debug!("skipping manifest row, image missing: {}", image_path);
        return None;
    }
    let relative = root.relative(&resolved)?;
    let name = Path::new(image_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (caption, tags) = metadata::resolve_manifest_row(root, row);
    Some(DatasetItem::new(name, relative, caption, tags))
}

fn scan_root(
    root: &DatasetRoot,
    options: &IndexOptions,
    progress: &mut dyn FnMut(usize),
) -> BuiltIndex {
    let mut built = BuiltIndex::default();
    for path in image_files(root.path(), &options.skip_dirs) {
        let Some(item) = item_from_file(root, &path) else {
            continue;
        };
        built.items.push(item);
        built.processed = built.items.len();
        report(built.processed, options.progress_interval, progress);
    }
    built
}

fn item_from_file(root: &DatasetRoot, path: &Path) -> Option<DatasetItem> {
    let resolved = match root.resolve(path) {
        Ok(p) => p,
        Err(e) => {
            debug!("skipping {}: {}", path.display(), e);
            return None;
        }
    };
    let relative = root.relative(&resolved)?;
    let name = path.file_name()?.to_string_lossy().into_owned();
    let caption = metadata::read_sidecar_caption(path);
    let tags = metadata::read_sidecar_tags(path);
    Some(DatasetItem::new(name, relative, caption, tags))
}

fn report(count: usize, interval: usize, progress: &mut dyn FnMut(usize)) {
    if interval > 0 && count % interval == 0 {
        progress(count);
    }
}

/// Every image file under `root`, in file-name order.
///
/// Top-level directories named in `skip_dirs` are not descended into.
/// Unreadable directory entries are skipped.
pub fn image_files<'a>(
    root: &Path,
    skip_dirs: &'a [String],
) -> impl Iterator<Item = PathBuf> + use<'a> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| {
            !(entry.depth() == 1
                && entry.file_type().is_dir()
                && skip_dirs
                    .iter()
                    .any(|d| entry.file_name().to_string_lossy() == d.as_str()))
        })
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.into_path())
        .filter(|path| is_image(path))
}

/// Whether `path` is a regular file (symlinks followed) with an image extension.
pub fn is_image(path: &Path) -> bool {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    IMAGE_EXTENSIONS.contains(&ext.as_str()) && path.is_file()
}
