use anyhow::Result;

use crate::detect::raw::RawDetections;

/// Detector backend trait.
///
/// A backend wraps one loaded model. It receives packed RGB8 pixels in
/// source-image resolution and must report box coordinates in that same
/// pixel space, whatever resizing it performs internally.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on an image.
    ///
    /// `pixels` holds `width * height * 3` bytes in row-major RGB order.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<RawDetections>;
}
