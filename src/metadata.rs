//! Caption and tag resolution.
//!
//! Each dataset item carries a caption and four tag slots (`artist`,
//! `copyright`, `character`, `general`). They come from one of two places,
//! depending on how the item was discovered:
//!
//! ## Manifest rows
//!
//! A manifest line already carries the tag slots as JSON arrays. The caption
//! lives in a separate text file named by `caption_path`:
//!
//! ```json
//! {"image_path": "img/001.png", "caption_path": "img/001.txt",
//!  "artist": ["someone"], "general": ["cat", "outdoor"]}
//! ```
//!
//! ## Side-car files
//!
//! During a directory scan, image `X` is paired with two optional siblings:
//!
//! ```text
//! 001.png
//! 001.png.caption.txt    # caption, trimmed
//! 001.png.json           # {"tag_string_general": "cat outdoor", ...}
//! ```
//!
//! The side-car JSON stores each slot as one whitespace-delimited string.
//!
//! ## Leniency
//!
//! Nothing in here returns an error. A missing caption file is an empty
//! caption, a malformed side-car is four empty slots, a tag field of the
//! wrong type is an empty slot. One bad record must never stop an index build.

use crate::sandbox::DatasetRoot;
use serde::{Deserialize, Deserializer, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Suffix appended to an image's file name to find its caption side-car.
pub const CAPTION_SUFFIX: &str = ".caption.txt";
/// Suffix appended to an image's file name to find its tag side-car.
pub const TAGS_SUFFIX: &str = ".json";

/// The four tag slots of a dataset item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Tags {
    pub artist: Vec<String>,
    pub copyright: Vec<String>,
    pub character: Vec<String>,
    pub general: Vec<String>,
}

impl Tags {
    pub fn is_empty(&self) -> bool {
        self.artist.is_empty()
            && self.copyright.is_empty()
            && self.character.is_empty()
            && self.general.is_empty()
    }
}

/// One parsed manifest line. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestRow {
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub caption_path: Option<String>,
    #[serde(default, deserialize_with = "tag_list")]
    pub artist: Vec<String>,
    #[serde(default, deserialize_with = "tag_list")]
    pub copyright: Vec<String>,
    #[serde(default, deserialize_with = "tag_list")]
    pub character: Vec<String>,
    #[serde(default, deserialize_with = "tag_list")]
    pub general: Vec<String>,
}

/// Accept a tag slot as an array of strings, a whitespace-delimited string,
/// or null.
fn tag_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Slot {
        List(Vec<String>),
        Text(String),
    }

    Ok(match Option::<Slot>::deserialize(deserializer)? {
        Some(Slot::List(tags)) => tags,
        Some(Slot::Text(text)) => split_tags(Some(&text)),
        None => Vec::new(),
    })
}

/// Split a whitespace-delimited tag string into non-empty tokens.
pub fn split_tags(value: Option<&str>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split_whitespace()
        .map(String::from)
        .collect()
}

/// Read a caption file and trim it. Anything unreadable is an empty caption.
pub fn read_caption(path: &Path) -> String {
    if !path.is_file() {
        return String::new();
    }
    match std::fs::read_to_string(path) {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            debug!("unreadable caption {}: {}", path.display(), e);
            String::new()
        }
    }
}

/// `photo.png` → `photo.png<suffix>`, in the same directory.
pub fn sidecar_path(image: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = image.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    image.with_file_name(name)
}

/// Caption for a scanned image, from `<image>.caption.txt`.
pub fn read_sidecar_caption(image: &Path) -> String {
    read_caption(&sidecar_path(image, CAPTION_SUFFIX))
}

/// Tags for a scanned image, from `<image>.json`.
///
/// Each `tag_string_*` field is read independently: a non-string field
/// empties only that slot.
pub fn read_sidecar_tags(image: &Path) -> Tags {
    let path = sidecar_path(image, TAGS_SUFFIX);
    let Ok(content) = std::fs::read_to_string(&path) else {
        return Tags::default();
    };
    let meta: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            debug!("malformed tag side-car {}: {}", path.display(), e);
            return Tags::default();
        }
    };
    let field = |key: &str| split_tags(meta.get(key).and_then(|v| v.as_str()));
    Tags {
        artist: field("tag_string_artist"),
        copyright: field("tag_string_copyright"),
        character: field("tag_string_character"),
        general: field("tag_string_general"),
    }
}

/// Caption and tags for a manifest row.
///
/// `caption_path` is resolved against the root like `image_path`; a caption
/// outside the root is treated as absent.
pub fn resolve_manifest_row(root: &DatasetRoot, row: &ManifestRow) -> (String, Tags) {
    let caption = row
        .caption_path
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .and_then(|p| root.resolve(p).ok())
        .map(|path| read_caption(&path))
        .unwrap_or_default();

    let tags = Tags {
        artist: row.artist.clone(),
        copyright: row.copyright.clone(),
        character: row.character.clone(),
        general: row.general.clone(),
    };
    (caption, tags)
}
