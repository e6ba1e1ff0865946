#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::decode::{self, Letterbox, LETTERBOX_FILL};
use crate::detect::raw::{DetectedObject, RawDetections};

/// Tract-based backend for ONNX exports of YOLO detectors.
///
/// Frames are letterboxed into the model's square input. Both raw-head and
/// end-to-end (NMS included) exports are accepted; boxes are mapped back to
/// source pixels before they leave the backend.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Override the default NMS IoU threshold.
    pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<(Tensor, Letterbox)> {
        let frame = RgbImage::from_raw(width, height, pixels.to_vec()).ok_or_else(|| {
            anyhow!(
                "expected {}x{} RGB frame, received {} bytes",
                width,
                height,
                pixels.len()
            )
        })?;

        let geometry = Letterbox::fit(width, height, self.input_size);
        let resized = imageops::resize(
            &frame,
            geometry.scaled_width,
            geometry.scaled_height,
            FilterType::Triangle,
        );
        let mut canvas = RgbImage::from_pixel(
            self.input_size,
            self.input_size,
            Rgb([LETTERBOX_FILL; 3]),
        );
        imageops::overlay(
            &mut canvas,
            &resized,
            geometry.pad_x as i64,
            geometry.pad_y as i64,
        );

        let size = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, channel, y, x)| {
            canvas.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0
        });

        Ok((input.into_tensor(), geometry))
    }

    fn extract_detections(
        &self,
        outputs: TVec<TValue>,
        geometry: &Letterbox,
    ) -> Result<RawDetections> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        let values: Vec<f32> = view.iter().copied().collect();

        match shape.as_slice() {
            [1, rows, 6] => {
                let rows = decode::decode_rows(&values, *rows, 6, self.confidence_threshold)?;
                Ok(RawDetections::Batched(
                    rows.into_iter()
                        .map(|mut row| {
                            let [x1, y1, x2, y2] =
                                geometry.box_to_source([row[0], row[1], row[2], row[3]]);
                            row[..4].copy_from_slice(&[x1, y1, x2, y2]);
                            row
                        })
                        .collect(),
                ))
            }
            [1, channels, anchors] if *channels >= 5 => {
                let candidates = decode::decode_head(
                    &values,
                    *channels,
                    *anchors,
                    self.confidence_threshold,
                )?;
                let kept = decode::non_max_suppression(candidates, self.iou_threshold);
                Ok(RawDetections::Objects(
                    kept.into_iter()
                        .map(|mut candidate| {
                            candidate.xyxy = geometry.box_to_source(candidate.xyxy);
                            Box::new(candidate) as Box<dyn DetectedObject>
                        })
                        .collect(),
                ))
            }
            other => Err(anyhow!("unsupported detector output shape {:?}", other)),
        }
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<RawDetections> {
        let (input, geometry) = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.extract_detections(outputs, &geometry)
    }
}
