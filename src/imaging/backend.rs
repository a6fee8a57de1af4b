//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait is the single seam between the derivative cache
//! and pixel work. The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), compiled with the
//! `imaging` feature. Without it, [`UnavailableBackend`] stands in and every
//! derivative request falls back to the original file.

use super::params::RenditionParams;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error("Image processing is not available in this build")]
    Unavailable,
}

/// Trait for image processing backends.
///
/// Implementations must be shareable across request handlers and rayon
/// workers.
pub trait ImageBackend: Send + Sync {
    /// Whether this backend can produce renditions at all.
    fn is_available(&self) -> bool {
        true
    }

    /// Decode `params.source`, apply its orientation, flatten onto
    /// `params.matte`, fit within `params.max_dimension`, and encode a JPEG
    /// at `params.output`.
    fn render(&self, params: &RenditionParams) -> Result<(), BackendError>;
}

/// Backend used when the crate is built without image support.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableBackend;

impl ImageBackend for UnavailableBackend {
    fn is_available(&self) -> bool {
        false
    }

    fn render(&self, _params: &RenditionParams) -> Result<(), BackendError> {
        Err(BackendError::Unavailable)
    }
}
