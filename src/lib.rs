//! Fracture prediction pipeline
//!
//! Runs a pretrained object detector against a single image, draws the
//! detected boxes onto a copy of that image, and reports the outcome as one
//! JSON record.
//!
//! # Architecture
//!
//! Control flow is strictly linear:
//!
//! 1. **Model Loader** (`loader`): resolves the weights file and builds a backend.
//! 2. **Detector Adapter** (`detect`): decodes the image, runs the backend, and
//!    normalizes its native output into a `DetectionResult`.
//! 3. **Annotator** (`annotate`): draws one rectangle per box and writes
//!    `processed_<basename>` into the uploads directory.
//! 4. **Result Encoder** (`output`): collapses the outcome into an `OutputRecord`.
//!
//! `pipeline` orchestrates the stages. Any stage failure becomes the error
//! variant of the record; nothing is retried.
//!
//! # Module Structure
//!
//! - `config`: Pipeline configuration (defaults, config file, env overrides)
//! - `detect`: Detector backends, raw output shapes, normalization
//! - `loader`, `annotate`, `output`, `pipeline`: The stages above

use std::path::PathBuf;

use thiserror::Error;

pub mod annotate;
pub mod config;
pub mod detect;
pub mod loader;
pub mod output;
pub mod pipeline;

pub use annotate::{processed_file_name, AnnotatedImage};
pub use config::{AnnotationStyle, PipelineConfig};
pub use detect::{
    DetectedObject, DetectionBox, DetectionResult, DetectorBackend, RawDetections, StubBackend,
};
pub use loader::load_detector;
pub use output::OutputRecord;
pub use pipeline::{Pipeline, Stage};

/// Failure of a single pipeline invocation.
///
/// The display string of each variant is what callers see in the `error`
/// field of the output record.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Usage(String),

    #[error("Model file not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("failed to load model {}: {source:#}", .path.display())]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("inference failed: {0:#}")]
    Inference(#[source] anyhow::Error),

    #[error("failed to write annotated image: {0:#}")]
    ImageWrite(#[source] anyhow::Error),

    #[error("invalid configuration: {0:#}")]
    Config(#[source] anyhow::Error),
}
