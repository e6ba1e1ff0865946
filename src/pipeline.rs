//! Pipeline orchestration.
//!
//! `Start → Loading → Inferring → Annotating → Encoding → Done`. A failure in
//! any of the middle stages jumps straight to `Encoding` with the error, so
//! every run ends in exactly one `OutputRecord`.

use std::path::Path;

use crate::annotate::{self, AnnotatedImage};
use crate::config::PipelineConfig;
use crate::detect::{self, DetectionResult, DetectorBackend};
use crate::loader;
use crate::output::OutputRecord;
use crate::PipelineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Start,
    Loading,
    Inferring,
    Annotating,
    Encoding,
    Done,
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline against one image with the configured detector.
    pub fn run(&self, image_path: &Path) -> OutputRecord {
        self.run_with(image_path, loader::load_detector)
    }

    /// Run the pipeline with a caller-supplied loader in place of
    /// `load_detector`.
    pub fn run_with<F>(&self, image_path: &Path, load: F) -> OutputRecord
    where
        F: FnOnce(&PipelineConfig) -> Result<Box<dyn DetectorBackend>, PipelineError>,
    {
        let mut tracker = StageTracker::new();
        let outcome = self.execute(&mut tracker, image_path, load);

        tracker.enter(Stage::Encoding);
        let record = match outcome {
            Ok((result, annotated)) => {
                OutputRecord::success(&result, &annotated, &self.config.public_prefix)
            }
            Err((stage, err)) => {
                log::warn!("{} failed during {:?}: {}", image_path.display(), stage, err);
                OutputRecord::error(&err)
            }
        };
        tracker.enter(Stage::Done);
        record
    }

    fn execute<F>(
        &self,
        tracker: &mut StageTracker,
        image_path: &Path,
        load: F,
    ) -> Result<(DetectionResult, AnnotatedImage), (Stage, PipelineError)>
    where
        F: FnOnce(&PipelineConfig) -> Result<Box<dyn DetectorBackend>, PipelineError>,
    {
        let stage = tracker.enter(Stage::Loading);
        let mut backend = load(&self.config).map_err(|e| (stage, e))?;

        let stage = tracker.enter(Stage::Inferring);
        let result = detect::run_detection(backend.as_mut(), image_path).map_err(|e| (stage, e))?;
        log::info!("{} detections in {}", result.len(), image_path.display());
        // release the model before touching the filesystem
        drop(backend);

        let stage = tracker.enter(Stage::Annotating);
        let annotated = annotate::annotate(
            image_path,
            &result,
            &self.config.annotation,
            &self.config.uploads_dir,
        )
        .map_err(|e| (stage, e))?;

        Ok((result, annotated))
    }
}

struct StageTracker {
    current: Stage,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            current: Stage::Start,
        }
    }

    fn enter(&mut self, next: Stage) -> Stage {
        log::debug!("pipeline stage {:?} -> {:?}", self.current, next);
        self.current = next;
        next
    }
}
