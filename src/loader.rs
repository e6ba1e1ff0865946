//! Model Loader.
//!
//! The detector is loaded eagerly on every invocation; each run is its own
//! process, so there is nothing to cache.

use crate::config::PipelineConfig;
use crate::detect::DetectorBackend;
use crate::PipelineError;

/// Resolve the configured weights file and build a ready-to-query backend.
pub fn load_detector(config: &PipelineConfig) -> Result<Box<dyn DetectorBackend>, PipelineError> {
    let path = &config.model_path;
    if !path.is_file() {
        return Err(PipelineError::ModelNotFound(path.clone()));
    }
    log::info!("loading detector from {}", path.display());
    build_backend(config)
}

#[cfg(feature = "backend-tract")]
fn build_backend(config: &PipelineConfig) -> Result<Box<dyn DetectorBackend>, PipelineError> {
    use crate::detect::TractBackend;

    let backend = TractBackend::new(&config.model_path, config.input_size)
        .map_err(|source| PipelineError::ModelLoad {
            path: config.model_path.clone(),
            source,
        })?
        .with_threshold(config.confidence_threshold)
        .with_iou_threshold(config.iou_threshold);
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn build_backend(config: &PipelineConfig) -> Result<Box<dyn DetectorBackend>, PipelineError> {
    Err(PipelineError::ModelLoad {
        path: config.model_path.clone(),
        source: anyhow::anyhow!("built without an inference backend (enable backend-tract)"),
    })
}
