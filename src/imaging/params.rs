//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the derivative cache (which decides what renditions to
//! create and where) and the [`backend`](super::backend) (which does the
//! actual pixel work). This separation allows swapping backends (e.g. for
//! testing with a mock) without changing cache logic.
//!
//! ## Types
//!
//! - [`Quality`]: lossy encoding quality (1-100). Clamped on construction.
//! - [`RenditionParams`]: full description of one derivative.

use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

/// Opaque colour that transparent regions are composited onto.
pub const MATTE: [u8; 3] = [16, 16, 16];

/// Parameters for one derivative: decode, orient, flatten, fit, encode.
#[derive(Debug, Clone, PartialEq)]
pub struct RenditionParams {
    pub source: PathBuf,
    /// Where the encoded JPEG is written. The caller owns atomicity.
    pub output: PathBuf,
    /// Bound on the longer edge.
    pub max_dimension: u32,
    pub quality: Quality,
    /// Background for images with an alpha channel.
    pub matte: [u8; 3],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }
}
