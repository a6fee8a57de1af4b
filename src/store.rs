//! Process-wide holder of the built index.
//!
//! The index is built exactly once, on a background thread, while the HTTP
//! server is already answering requests. Readers never block on the builder:
//!
//! - `scanned` is an atomic counter the builder raises as it goes. It only
//!   ever grows.
//! - The finished items live in a set-once cell. Setting the cell *is* the
//!   ready transition, so no reader can observe `ready` without the full
//!   item list, or a partial list at all.
//!
//! [`spawn_population`] wires the builder thread: optional derivative
//! prebuild first, then the index build, then a single publish.

use crate::derivative::DerivativeCache;
use crate::sandbox::DatasetRoot;
use crate::scan::{self, DatasetItem, IndexOptions, IndexSource};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("index already published ({0} items)")]
    AlreadyPublished(usize),
}

#[derive(Debug, Default)]
pub struct ItemStore {
    scanned: AtomicUsize,
    items: OnceLock<Arc<[DatasetItem]>>,
}

/// A consistent view of the store at one instant.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub ready: bool,
    pub scanned: usize,
    /// Empty until ready.
    pub items: Arc<[DatasetItem]>,
}

impl ItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the processed-records counter. Lower values are ignored.
    pub fn record_progress(&self, count: usize) {
        self.scanned.fetch_max(count, Ordering::AcqRel);
    }

    /// Publish the finished index. Only the first call succeeds.
    pub fn publish(&self, items: Vec<DatasetItem>, processed: usize) -> Result<(), StoreError> {
        if let Some(existing) = self.items.get() {
            return Err(StoreError::AlreadyPublished(existing.len()));
        }
        self.record_progress(processed);
        self.items
            .set(items.into())
            .map_err(|_| StoreError::AlreadyPublished(self.items.get().map_or(0, |i| i.len())))
    }

    pub fn is_ready(&self) -> bool {
        self.items.get().is_some()
    }

    pub fn scanned(&self) -> usize {
        self.scanned.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> Snapshot {
        // Items first: once set, `scanned` already holds the final count.
        let items = self.items.get().cloned();
        Snapshot {
            ready: items.is_some(),
            scanned: self.scanned(),
            items: items.unwrap_or_else(|| Arc::from(Vec::new())),
        }
    }
}

/// Everything the builder thread needs.
pub struct Population {
    pub source: IndexSource,
    pub options: IndexOptions,
    /// When present, items get derivative URLs.
    pub cache: Option<Arc<DerivativeCache>>,
    /// Materialize all derivatives before indexing.
    pub prebuild: bool,
}

/// Run prebuild (if requested) and the index build, then publish.
///
/// A failed build is logged and published as an empty index so readers stop
/// waiting.
pub fn populate(store: &ItemStore, root: &DatasetRoot, job: &Population) {
    if job.prebuild
        && let Some(cache) = &job.cache
    {
        cache.prebuild();
    }

    let built = scan::build_index(root, &job.source, &job.options, &mut |count| {
        store.record_progress(count);
        info!("Indexed {} items...", count);
    });

    let (mut items, processed) = match built {
        Ok(built) => (built.items, built.processed),
        Err(e) => {
            warn!("index build failed: {}", e);
            (Vec::new(), store.scanned())
        }
    };
    if let Some(cache) = &job.cache {
        for item in &mut items {
            cache.attach_urls(item);
        }
    }

    let count = items.len();
    match store.publish(items, processed) {
        Ok(()) => info!("Index ready: {} items", count),
        Err(e) => warn!("{}", e),
    }
}

/// Start [`populate`] on a dedicated thread named `indexer`.
pub fn spawn_population(
    store: Arc<ItemStore>,
    root: DatasetRoot,
    job: Population,
) -> io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("indexer".into())
        .spawn(move || populate(&store, &root, &job))
}
