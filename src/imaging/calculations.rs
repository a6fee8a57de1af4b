//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate the dimensions of a uniform-scale fit inside a square bound.
///
/// The longer edge becomes `max_dimension`, the shorter edge keeps the aspect
/// ratio (rounded, never below 1px). Images already within the bound are
/// returned unchanged. Derivatives never upscale.
///
/// # Arguments
/// * `original` - Source dimensions (width, height)
/// * `max_dimension` - Bound on both edges, in pixels
///
/// # Returns
/// * `(width, height)` - Output dimensions
///
/// # Examples
/// ```
/// # use tagview::imaging::calculate_fit_dimensions;
/// // 4000x3000 landscape into a 360px box → 360x270
/// assert_eq!(calculate_fit_dimensions((4000, 3000), 360), (360, 270));
///
/// // Small images are left alone
/// assert_eq!(calculate_fit_dimensions((200, 100), 360), (200, 100));
/// ```
pub fn calculate_fit_dimensions(original: (u32, u32), max_dimension: u32) -> (u32, u32) {
    let (orig_w, orig_h) = original;
    let max_dimension = max_dimension.max(1);
    if orig_w <= max_dimension && orig_h <= max_dimension {
        return original;
    }

    if orig_w >= orig_h {
        // Landscape or square
        let ratio = max_dimension as f64 / orig_w as f64;
        (
            max_dimension,
            ((orig_h as f64 * ratio).round() as u32).max(1),
        )
    } else {
        // Portrait
        let ratio = max_dimension as f64 / orig_h as f64;
        (
            ((orig_w as f64 * ratio).round() as u32).max(1),
            max_dimension,
        )
    }
}
