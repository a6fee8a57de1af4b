//! Request policy, independent of the HTTP framework.
//!
//! [`Viewer`] decides what every route answers: the items query, raw files
//! under `/files/`, and derivatives under `/thumbs/` and `/display/`. It
//! returns a [`Served`] value describing the response; [`crate::server`]
//! turns that into bytes on the wire.
//!
//! | Situation | Answer |
//! |---|---|
//! | path escapes the root | `Forbidden` |
//! | file missing, or not a regular file | `NotFound` |
//! | derivative route without the profile suffix | `NotFound` |
//! | derivative could not be produced | the original, raw-file lifetime |

use crate::derivative::{DerivativeCache, ProfileKind};
use crate::sandbox::{DatasetRoot, SandboxError};
use crate::scan::DatasetItem;
use crate::store::{ItemStore, Snapshot};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// `Cache-Control` lifetime for original files, in seconds.
pub const RAW_MAX_AGE: u32 = 3_600;

const CONTENT_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("webp", "image/webp"),
    ("gif", "image/gif"),
    ("txt", "text/plain; charset=utf-8"),
    ("json", "application/json"),
];

/// Content type for a file, by extension (case-insensitive).
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    CONTENT_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
        .unwrap_or("application/octet-stream")
}

/// What to answer for a file request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Served {
    File {
        path: PathBuf,
        content_type: &'static str,
        max_age: u32,
    },
    Forbidden,
    NotFound,
}

/// Body of `GET /api/items`.
#[derive(Debug, Serialize)]
pub struct ItemsResponse<'a> {
    pub root: String,
    pub ready: bool,
    pub scanned: usize,
    pub items: &'a [DatasetItem],
}

pub struct Viewer {
    root: DatasetRoot,
    store: Arc<ItemStore>,
    cache: Option<Arc<DerivativeCache>>,
}

impl Viewer {
    pub fn new(
        root: DatasetRoot,
        store: Arc<ItemStore>,
        cache: Option<Arc<DerivativeCache>>,
    ) -> Self {
        Self { root, store, cache }
    }

    pub fn has_derivatives(&self) -> bool {
        self.cache.is_some()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }

    /// The items query for a snapshot. `items` is empty until the store is
    /// ready.
    pub fn items<'a>(&self, snapshot: &'a Snapshot) -> ItemsResponse<'a> {
        ItemsResponse {
            root: self.root.path().display().to_string(),
            ready: snapshot.ready,
            scanned: snapshot.scanned,
            items: &snapshot.items,
        }
    }

    /// An original file, by root-relative path.
    pub fn raw_file(&self, requested: &str) -> Served {
        match self.existing_file(requested) {
            Ok(path) => raw(path),
            Err(denied) => denied,
        }
    }

    /// A derivative, by root-relative source path plus the profile suffix.
    ///
    /// Blocks while the derivative is generated.
    pub fn derivative(&self, kind: ProfileKind, requested: &str) -> Served {
        let Some(cache) = &self.cache else {
            return Served::NotFound;
        };
        let Some(relative) = cache.profile(kind).strip_suffix(requested) else {
            return Served::NotFound;
        };
        let source = match self.existing_file(relative) {
            Ok(path) => path,
            Err(denied) => return denied,
        };

        match cache.materialize(&source, kind).path() {
            Some(path) => Served::File {
                path: path.to_path_buf(),
                content_type: "image/jpeg",
                max_age: cache.profile(kind).max_age,
            },
            None => raw(source),
        }
    }

    fn existing_file(&self, requested: &str) -> Result<PathBuf, Served> {
        let path = match self.root.resolve(requested) {
            Ok(path) => path,
            Err(SandboxError::Forbidden(p)) => {
                debug!("rejected request outside root: {}", p.display());
                return Err(Served::Forbidden);
            }
            Err(e) => {
                debug!("cannot resolve {}: {}", requested, e);
                return Err(Served::NotFound);
            }
        };
        if path.is_file() {
            Ok(path)
        } else {
            Err(Served::NotFound)
        }
    }
}

fn raw(path: PathBuf) -> Served {
    Served::File {
        content_type: content_type_for(&path),
        path,
        max_age: RAW_MAX_AGE,
    }
}
