//! Detector seam.
//!
//! Backends report detections in whichever shape their model produces
//! (`RawDetections`). The adapter normalizes both shapes into a single
//! `DetectionResult`; nothing past `adapter::run_detection` sees the native form.

pub mod adapter;
mod backend;
mod backends;
pub mod decode;
mod raw;
mod result;

pub use adapter::{normalize, run_detection};
pub use backend::DetectorBackend;
pub use backends::{StubBackend, StubObject};
pub use raw::{DetectedObject, RawDetections};
pub use result::{Detection, DetectionBox, DetectionResult};

#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
