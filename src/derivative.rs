//! On-demand derivative cache.
//!
//! Serving multi-megabyte originals to a grid of thumbnails is what makes a
//! dataset viewer crawl. This module keeps size-reduced JPEG copies of each
//! source image on disk, next to the dataset, and creates them the first time
//! they are requested (or ahead of time, see [`DerivativeCache::prebuild`]).
//!
//! # Layout
//!
//! Each [`Profile`] owns a hidden directory under the dataset root. A cache
//! entry mirrors the source's relative path with the profile suffix appended:
//!
//! ```text
//! dataset/
//! ├── cats/a.png
//! ├── .thumbs/cats/a.png.thumb.jpg       # max 360px, q82
//! └── .display/cats/a.png.display.jpg    # max 1600px, q88
//! ```
//!
//! The existence of the file is the cache-hit signal. There is no manifest
//! and no invalidation: delete the directory to force regeneration.
//!
//! # Writes
//!
//! Renditions are encoded into a temporary file inside the destination
//! directory and renamed into place, so a reader never sees a half-written
//! entry. Concurrent requests for the same entry are collapsed by a per-key
//! lock: the second caller waits, re-checks, and finds the hit.

use crate::config::ProfileConfig;
use crate::imaging::{BackendError, ImageBackend, MATTE, Quality, RenditionParams};
use crate::sandbox::{self, DatasetRoot};
use crate::scan::{self, DatasetItem};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

pub const THUMB_CACHE_DIR: &str = ".thumbs";
pub const THUMB_SUFFIX: &str = ".thumb.jpg";
pub const DISPLAY_CACHE_DIR: &str = ".display";
pub const DISPLAY_SUFFIX: &str = ".display.jpg";

/// Prebuild logs progress every this many images.
const PREBUILD_PROGRESS_INTERVAL: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileKind {
    Thumb,
    Display,
}

impl ProfileKind {
    pub const ALL: [ProfileKind; 2] = [ProfileKind::Thumb, ProfileKind::Display];
}

/// One derivative size class.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub name: &'static str,
    /// Directory under the dataset root holding this profile's entries.
    pub cache_dir: String,
    pub suffix: String,
    /// First URL path segment, e.g. `thumbs` for `/thumbs/...`.
    pub route: &'static str,
    pub max_dimension: u32,
    pub quality: Quality,
    pub max_age: u32,
}

impl Profile {
    pub fn thumb(config: &ProfileConfig) -> Self {
        Self {
            name: "thumb",
            cache_dir: THUMB_CACHE_DIR.to_string(),
            suffix: THUMB_SUFFIX.to_string(),
            route: "thumbs",
            max_dimension: config.max_dimension,
            quality: Quality::new(config.quality),
            max_age: config.max_age,
        }
    }

    pub fn display(config: &ProfileConfig) -> Self {
        Self {
            name: "display",
            cache_dir: DISPLAY_CACHE_DIR.to_string(),
            suffix: DISPLAY_SUFFIX.to_string(),
            route: "display",
            max_dimension: config.max_dimension,
            quality: Quality::new(config.quality),
            max_age: config.max_age,
        }
    }

    /// `<root>/<cache_dir>/<relative><suffix>`.
    pub fn cache_path(&self, root: &Path, relative: &Path) -> PathBuf {
        let mut file: OsString = root.join(&self.cache_dir).join(relative).into_os_string();
        file.push(&self.suffix);
        PathBuf::from(file)
    }

    /// Public URL of the derivative of the image at `image_path`.
    pub fn url_for(&self, image_path: &str) -> String {
        sandbox::url_path(self.route, &format!("{image_path}{}", self.suffix))
    }

    /// The source-relative path named by a derivative request, or `None` if
    /// the request does not carry this profile's suffix.
    pub fn strip_suffix<'a>(&self, requested: &'a str) -> Option<&'a str> {
        requested
            .strip_suffix(self.suffix.as_str())
            .filter(|rest| !rest.is_empty())
    }
}

/// Outcome of [`DerivativeCache::materialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialized {
    /// The entry already existed.
    Cached(PathBuf),
    /// The entry was generated by this call.
    Created(PathBuf),
    /// No derivative could be produced; serve the original instead.
    Unavailable,
}

impl Materialized {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Cached(p) | Self::Created(p) => Some(p),
            Self::Unavailable => None,
        }
    }
}

/// Counters reported by a prebuild pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrebuildStats {
    pub images: usize,
    pub created: usize,
}

impl fmt::Display for PrebuildStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Images: {}, files created: {}", self.images, self.created)
    }
}

pub struct DerivativeCache {
    root: DatasetRoot,
    thumb: Profile,
    display: Profile,
    backend: Arc<dyn ImageBackend>,
    in_flight: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl DerivativeCache {
    pub fn new(
        root: DatasetRoot,
        thumb: Profile,
        display: Profile,
        backend: Arc<dyn ImageBackend>,
    ) -> Self {
        Self {
            root,
            thumb,
            display,
            backend,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &DatasetRoot {
        &self.root
    }

    pub fn profile(&self, kind: ProfileKind) -> &Profile {
        match kind {
            ProfileKind::Thumb => &self.thumb,
            ProfileKind::Display => &self.display,
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }

    /// Top-level directories holding cache entries. Never indexed.
    pub fn cache_dirs(&self) -> Vec<String> {
        vec![self.thumb.cache_dir.clone(), self.display.cache_dir.clone()]
    }

    /// Fill in the derivative URLs of an indexed item.
    pub fn attach_urls(&self, item: &mut DatasetItem) {
        item.thumb_url = Some(self.thumb.url_for(&item.image_path));
        item.display_url = Some(self.display.url_for(&item.image_path));
    }

    /// Return the cache entry for `source` under `kind`, creating it if needed.
    ///
    /// `source` must be an absolute path already accepted by the sandbox.
    /// Failures are logged and reported as [`Materialized::Unavailable`].
    pub fn materialize(&self, source: &Path, kind: ProfileKind) -> Materialized {
        let Some(relative) = self.root.relative(source) else {
            warn!("derivative source outside root: {}", source.display());
            return Materialized::Unavailable;
        };
        let profile = self.profile(kind);
        let dest = profile.cache_path(self.root.path(), relative);
        if dest.is_file() {
            return Materialized::Cached(dest);
        }
        if !self.backend.is_available() {
            return Materialized::Unavailable;
        }

        let key_lock = self.key_lock(&dest);
        let _held = key_lock.lock();
        if dest.is_file() {
            return Materialized::Cached(dest);
        }

        let outcome = match self.render(source, &dest, profile) {
            Ok(()) => {
                debug!("created {} {}", profile.name, dest.display());
                Materialized::Created(dest.clone())
            }
            Err(e) => {
                warn!(
                    "failed to create {} for {}: {}",
                    profile.name,
                    source.display(),
                    e
                );
                Materialized::Unavailable
            }
        };
        self.in_flight.lock().remove(&dest);
        outcome
    }

    fn key_lock(&self, dest: &Path) -> Arc<Mutex<()>> {
        self.in_flight
            .lock()
            .entry(dest.to_path_buf())
            .or_default()
            .clone()
    }

    fn render(&self, source: &Path, dest: &Path, profile: &Profile) -> Result<(), BackendError> {
        let parent = dest
            .parent()
            .ok_or_else(|| BackendError::ProcessingFailed("cache path has no parent".into()))?;
        std::fs::create_dir_all(parent)?;

        // Dropping the temp file on any early return removes it.
        let staging = NamedTempFile::new_in(parent)?;
        self.backend.render(&RenditionParams {
            source: source.to_path_buf(),
            output: staging.path().to_path_buf(),
            max_dimension: profile.max_dimension,
            quality: profile.quality,
            matte: MATTE,
        })?;
        staging.persist(dest).map_err(|e| BackendError::Io(e.error))?;
        Ok(())
    }

    /// Materialize both profiles for every image under the root.
    ///
    /// Runs on the global rayon pool. Existing entries are skipped.
    pub fn prebuild(&self) -> PrebuildStats {
        if !self.backend.is_available() {
            warn!("image processing unavailable, skipping prebuild");
            return PrebuildStats::default();
        }
        info!("prebuilding derivatives under {}", self.root.path().display());

        let skip_dirs = self.cache_dirs();
        let sources: Vec<PathBuf> = scan::image_files(self.root.path(), &skip_dirs).collect();
        let images = AtomicUsize::new(0);
        let created = AtomicUsize::new(0);

        sources.par_iter().for_each(|path| {
            match self.root.resolve(path) {
                Ok(source) => {
                    for kind in ProfileKind::ALL {
                        if matches!(self.materialize(&source, kind), Materialized::Created(_)) {
                            created.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
                Err(e) => debug!("prebuild skipping {}: {}", path.display(), e),
            }
            let seen = images.fetch_add(1, Ordering::Relaxed) + 1;
            if seen % PREBUILD_PROGRESS_INTERVAL == 0 {
                info!(
                    "Prebuild progress: {} images, {} files created",
                    seen,
                    created.load(Ordering::Relaxed)
                );
            }
        });

        let stats = PrebuildStats {
            images: images.into_inner(),
            created: created.into_inner(),
        };
        info!("Prebuild done. {}", stats);
        stats
    }
}
