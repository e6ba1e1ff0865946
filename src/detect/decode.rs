//! YOLO output decoding.
//!
//! Pure functions over flat `f32` buffers so they can be exercised without a
//! model. Two output layouts are understood:
//!
//! - raw head `[1, 4 + C, N]`: centre/size boxes followed by `C` class scores
//!   per anchor, needing thresholding and NMS;
//! - end-to-end `[1, N, 6]`: rows of `[x1, y1, x2, y2, confidence, class]`
//!   in model-input pixels, already suppressed.

use anyhow::{anyhow, Result};

use crate::detect::raw::DetectedObject;

/// Gray used to pad letterboxed inputs.
pub const LETTERBOX_FILL: u8 = 114;

/// Aspect-preserving fit of a source image into a square model input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    pub fn fit(width: u32, height: u32, size: u32) -> Self {
        let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
        let scaled_width = ((width as f32 * scale).round() as u32).clamp(1, size);
        let scaled_height = ((height as f32 * scale).round() as u32).clamp(1, size);
        Self {
            scale,
            scaled_width,
            scaled_height,
            pad_x: (size - scaled_width) / 2,
            pad_y: (size - scaled_height) / 2,
        }
    }

    /// Map a point from model-input pixels back to source pixels.
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }

    pub fn box_to_source(&self, [x1, y1, x2, y2]: [f32; 4]) -> [f32; 4] {
        let (x1, y1) = self.to_source(x1, y1);
        let (x2, y2) = self.to_source(x2, y2);
        [x1, y1, x2, y2]
    }
}

/// Detection decoded from a raw head, before and after suppression.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub xyxy: [f32; 4],
    pub confidence: f32,
    pub class_id: usize,
}

impl DetectedObject for Candidate {
    fn xyxy(&self) -> [f32; 4] {
        self.xyxy
    }

    fn confidence(&self) -> f32 {
        self.confidence
    }
}

/// Decode a raw `[1, channels, anchors]` head into candidates whose best
/// class score reaches `confidence_threshold`.
pub fn decode_head(
    output: &[f32],
    channels: usize,
    anchors: usize,
    confidence_threshold: f32,
) -> Result<Vec<Candidate>> {
    if channels < 5 {
        return Err(anyhow!(
            "head has {} channels, expected 4 box values plus class scores",
            channels
        ));
    }
    if output.len() != channels * anchors {
        return Err(anyhow!(
            "head buffer holds {} values, expected {}x{}",
            output.len(),
            channels,
            anchors
        ));
    }

    let at = |channel: usize, anchor: usize| output[channel * anchors + anchor];
    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let (class_id, confidence) = (4..channels)
            .map(|channel| (channel - 4, at(channel, anchor)))
            .fold((0, f32::NEG_INFINITY), |best, next| {
                if next.1 > best.1 {
                    next
                } else {
                    best
                }
            });
        if confidence.is_nan() || confidence < confidence_threshold {
            continue;
        }
        let (cx, cy, w, h) = (at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
        candidates.push(Candidate {
            xyxy: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
            confidence,
            class_id,
        });
    }
    Ok(candidates)
}

/// Split an end-to-end `[1, rows, width]` output into rows reaching
/// `confidence_threshold`. Padding rows with zero confidence fall away here.
pub fn decode_rows(
    output: &[f32],
    rows: usize,
    width: usize,
    confidence_threshold: f32,
) -> Result<Vec<Vec<f32>>> {
    if width < 5 {
        return Err(anyhow!("rows have {} values, expected at least 5", width));
    }
    if output.len() != rows * width {
        return Err(anyhow!(
            "row buffer holds {} values, expected {}x{}",
            output.len(),
            rows,
            width
        ));
    }
    Ok(output
        .chunks_exact(width)
        .filter(|row| row[4] >= confidence_threshold)
        .map(<[f32]>::to_vec)
        .collect())
}

/// Intersection over union of two corner-form boxes.
pub fn iou(a: [f32; 4], b: [f32; 4]) -> f32 {
    let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let intersection = ix * iy;
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - intersection;
    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Class-wise greedy NMS. Survivors are ordered by descending confidence.
pub fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && iou(k.xyxy, candidate.xyxy) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letterbox_pads_the_short_side() {
        let lb = Letterbox::fit(1280, 640, 640);
        assert_eq!(lb.scale, 0.5);
        assert_eq!((lb.scaled_width, lb.scaled_height), (640, 320));
        assert_eq!((lb.pad_x, lb.pad_y), (0, 160));

        assert_eq!(lb.to_source(320.0, 320.0), (640.0, 320.0));
        assert_eq!(
            lb.box_to_source([0.0, 160.0, 640.0, 480.0]),
            [0.0, 0.0, 1280.0, 640.0]
        );
    }

    #[test]
    fn decode_head_thresholds_on_best_class() {
        // channels: cx, cy, w, h, class0, class1; three anchors
        let output = vec![
            100.0, 200.0, 300.0, // cx
            100.0, 200.0, 300.0, // cy
            20.0, 40.0, 10.0, // w
            20.0, 40.0, 10.0, // h
            0.1, 0.05, 0.2, // class0
            0.8, 0.6, 0.1, // class1
        ];
        let candidates = decode_head(&output, 6, 3, 0.25).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].xyxy, [90.0, 90.0, 110.0, 110.0]);
        assert_eq!(candidates[0].class_id, 1);
        assert_eq!(candidates[0].confidence, 0.8);
        assert_eq!(candidates[1].xyxy, [180.0, 180.0, 220.0, 220.0]);
    }

    #[test]
    fn decode_head_rejects_mismatched_buffer() {
        assert!(decode_head(&[0.0; 10], 6, 3, 0.25).is_err());
        assert!(decode_head(&[0.0; 12], 4, 3, 0.25).is_err());
    }

    #[test]
    fn decode_rows_drops_padding() {
        let output = vec![
            10.0, 10.0, 50.0, 50.0, 0.9, 0.0, //
            0.0, 0.0, 0.0, 0.0, 0.0, 0.0, //
        ];
        let rows = decode_rows(&output, 2, 6, 0.25).unwrap();
        assert_eq!(rows, vec![vec![10.0, 10.0, 50.0, 50.0, 0.9, 0.0]]);
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        assert_eq!(iou([0.0, 0.0, 10.0, 10.0], [0.0, 0.0, 10.0, 10.0]), 1.0);
        assert_eq!(iou([0.0, 0.0, 10.0, 10.0], [20.0, 20.0, 30.0, 30.0]), 0.0);
        let half = iou([0.0, 0.0, 10.0, 10.0], [5.0, 0.0, 15.0, 10.0]);
        assert!((half - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn nms_suppresses_overlaps_within_a_class_only() {
        let candidates = vec![
            Candidate {
                xyxy: [0.0, 0.0, 10.0, 10.0],
                confidence: 0.6,
                class_id: 0,
            },
            Candidate {
                xyxy: [1.0, 1.0, 11.0, 11.0],
                confidence: 0.9,
                class_id: 0,
            },
            Candidate {
                xyxy: [1.0, 1.0, 11.0, 11.0],
                confidence: 0.7,
                class_id: 1,
            },
        ];
        let kept = non_max_suppression(candidates, 0.45);
        let confidences: Vec<f32> = kept.iter().map(|c| c.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.7]);
    }
}
