//! Detector Adapter: image in, uniform `DetectionResult` out.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, ImageFormat, ImageReader};

use crate::detect::backend::DetectorBackend;
use crate::detect::raw::RawDetections;
use crate::detect::result::{Detection, DetectionBox, DetectionResult};
use crate::PipelineError;

/// Decode an image from disk, sniffing the format from its content.
pub(crate) fn decode_image(path: &Path) -> Result<DynamicImage> {
    decode_image_with_format(path).map(|(image, _)| image)
}

/// Like `decode_image`, also reporting the format detected from the content.
pub(crate) fn decode_image_with_format(
    path: &Path,
) -> Result<(DynamicImage, Option<ImageFormat>)> {
    let reader = ImageReader::open(path)
        .with_context(|| format!("failed to open image {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("failed to read image {}", path.display()))?;
    let format = reader.format();
    let image = reader
        .decode()
        .with_context(|| format!("failed to decode image {}", path.display()))?;
    Ok((image, format))
}

/// Run the backend against the image at `image_path` and normalize its output.
pub fn run_detection(
    backend: &mut dyn DetectorBackend,
    image_path: &Path,
) -> Result<DetectionResult, PipelineError> {
    let rgb = decode_image(image_path)
        .map_err(PipelineError::Inference)?
        .into_rgb8();
    let (width, height) = rgb.dimensions();

    let raw = backend
        .detect(rgb.as_raw(), width, height)
        .with_context(|| format!("{} backend failed", backend.name()))
        .map_err(PipelineError::Inference)?;
    log::debug!(
        "{} backend returned {} {} detections",
        backend.name(),
        raw.len(),
        raw.shape_name()
    );

    normalize(raw).map_err(PipelineError::Inference)
}

/// Collapse either native output shape into a `DetectionResult`.
///
/// Detections keep their native order. Individual detections with invalid
/// geometry or confidence are dropped; a batched row too short to hold a box
/// and a confidence invalidates the whole output.
pub fn normalize(raw: RawDetections) -> Result<DetectionResult> {
    let pairs: Vec<([f32; 4], f32)> = match raw {
        RawDetections::Batched(rows) => rows
            .into_iter()
            .enumerate()
            .map(|(idx, row)| match row.as_slice() {
                [x1, y1, x2, y2, confidence, ..] => Ok(([*x1, *y1, *x2, *y2], *confidence)),
                _ => Err(anyhow!(
                    "detection row {} has {} values, expected at least 5",
                    idx,
                    row.len()
                )),
            })
            .collect::<Result<_>>()?,
        RawDetections::Objects(objects) => objects
            .iter()
            .map(|object| (object.xyxy(), object.confidence()))
            .collect(),
    };

    let mut detections = Vec::with_capacity(pairs.len());
    for (idx, ([x1, y1, x2, y2], confidence)) in pairs.into_iter().enumerate() {
        match DetectionBox::new(x1, y1, x2, y2).and_then(|bbox| Detection::new(bbox, confidence)) {
            Ok(detection) => detections.push(detection),
            Err(err) => log::warn!("skipping detection {}: {}", idx, err),
        }
    }
    Ok(DetectionResult::new(detections))
}
