//! Image processing for derivatives, pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode + orient** | `image::ImageReader` + `apply_orientation` |
//! | **Flatten** | composite onto [`MATTE`] |
//! | **Fit** | [`calculate_fit_dimensions`] + Lanczos3 |
//! | **Encode** | `JpegEncoder` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing a rendition
//! - **Backend**: [`ImageBackend`] trait, [`UnavailableBackend`], and
//!   `RustBackend` when built with the `imaging` feature

pub mod backend;
mod calculations;
mod params;
#[cfg(feature = "imaging")]
pub mod rust_backend;

use std::sync::Arc;

pub use backend::{BackendError, ImageBackend, UnavailableBackend};
pub use calculations::calculate_fit_dimensions;
pub use params::{MATTE, Quality, RenditionParams};
#[cfg(feature = "imaging")]
pub use rust_backend::RustBackend;

/// The best backend compiled into this build.
pub fn default_backend() -> Arc<dyn ImageBackend> {
    #[cfg(feature = "imaging")]
    {
        Arc::new(RustBackend::new())
    }
    #[cfg(not(feature = "imaging"))]
    {
        Arc::new(UnavailableBackend)
    }
}
