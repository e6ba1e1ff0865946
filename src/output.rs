//! Result Encoder.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::annotate::AnnotatedImage;
use crate::detect::DetectionResult;
use crate::PipelineError;

/// The single record emitted per invocation.
///
/// Serialized untagged, so the two variants are told apart by their fields:
/// `{"boxes": .., "confidences": .., "image_path": ..}` or `{"error": ..}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputRecord {
    Success {
        boxes: Vec<[f32; 4]>,
        confidences: Vec<f32>,
        image_path: String,
    },
    Error {
        error: String,
    },
}

impl OutputRecord {
    /// Success record; `image_path` is `<public_prefix>/<derived name>`.
    pub fn success(
        result: &DetectionResult,
        annotated: &AnnotatedImage,
        public_prefix: &str,
    ) -> Self {
        OutputRecord::Success {
            boxes: result.boxes(),
            confidences: result.confidences(),
            image_path: public_path(public_prefix, &annotated.file_name),
        }
    }

    pub fn error(err: &PipelineError) -> Self {
        OutputRecord::Error {
            error: err.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OutputRecord::Success { .. })
    }

    /// Compact single-line JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

fn public_path(prefix: &str, file_name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    format!("{}/{}", prefix, file_name)
}
