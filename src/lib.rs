//! # tagview
//!
//! A local-network viewer for image datasets annotated with captions and
//! tags. Point it at a directory, open the browser, and page through images
//! with their metadata while thumbnails are produced on the fly.
//!
//! # Architecture
//!
//! Two independent halves share one dataset root:
//!
//! ```text
//! Index       manifest.jsonl | directory scan  →  ItemStore   (built once, background)
//! Derivatives source image                     →  .thumbs/ .display/ (on demand)
//! ```
//!
//! The HTTP server starts answering before the index is finished. The items
//! query reports `ready: false` with a growing `scanned` count until the
//! background thread publishes the complete, sorted list in one step.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`sandbox`] | Resolves request and manifest paths, rejecting anything outside the root |
//! | [`metadata`] | Captions and tags from manifest rows or side-car files |
//! | [`scan`] | Builds the sorted item list from a manifest or a directory walk |
//! | [`store`] | Set-once holder of the index plus the background builder thread |
//! | [`derivative`] | On-disk cache of resized JPEGs, created on first access or by prebuild |
//! | [`imaging`] | Pure-Rust decode, orient, flatten, resize, encode |
//! | [`serve`] | What each route answers, independent of the HTTP framework |
//! | [`server`] | Axum router and listener |
//! | [`config`] | `viewer.toml` loading, merging, clamping, validation |
//!
//! # Design Decisions
//!
//! ## The filesystem is the cache index
//!
//! A derivative's existence on disk is the only cache-hit signal. There is
//! no database to corrupt and nothing to migrate: deleting `.thumbs/` is a
//! complete reset. Writes go through a temporary file and a rename, so an
//! interrupted encode never leaves a truncated JPEG behind.
//!
//! ## Lenient indexing
//!
//! Real datasets are messy. A malformed manifest line, a missing image or an
//! unreadable side-car drops or empties that one item and the build carries
//! on. Skips are logged at debug level.
//!
//! ## One sandbox
//!
//! Every path derived from user input, whether a URL or a manifest row, goes
//! through [`sandbox::DatasetRoot::resolve`]. Symlinks are followed before
//! the containment check, so a link pointing outside the dataset is treated
//! exactly like `../`.
//!
//! ## Imaging as a feature
//!
//! The `imaging` cargo feature (on by default) compiles the `image`-crate
//! backend. Builds without it still serve everything; derivative routes just
//! answer with the original file.

pub mod config;
pub mod derivative;
pub mod imaging;
pub mod metadata;
pub mod sandbox;
pub mod scan;
pub mod serve;
pub mod server;
pub mod store;

#[cfg(test)]
pub(crate) mod test_helpers;
