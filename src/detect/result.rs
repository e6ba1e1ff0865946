use anyhow::{anyhow, Result};

/// Axis-aligned box in source-image pixel coordinates.
///
/// Construction guarantees finite coordinates with `x1 < x2` and `y1 < y2`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionBox {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

impl DetectionBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Result<Self> {
        if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
            return Err(anyhow!(
                "box [{}, {}, {}, {}] has non-finite coordinates",
                x1,
                y1,
                x2,
                y2
            ));
        }
        if x1 >= x2 || y1 >= y2 {
            return Err(anyhow!(
                "box [{}, {}, {}, {}] is empty or inverted",
                x1,
                y1,
                x2,
                y2
            ));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    pub fn coords(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub bbox: DetectionBox,
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: DetectionBox, confidence: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(anyhow!("confidence {} is outside [0, 1]", confidence));
        }
        Ok(Self { bbox, confidence })
    }
}

/// Result of running detection on one image.
///
/// Boxes and confidences are stored pairwise, so both sequences always have
/// the same length. Order follows the detector's native output.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionResult {
    detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn boxes(&self) -> Vec<[f32; 4]> {
        self.detections.iter().map(|d| d.bbox.coords()).collect()
    }

    pub fn confidences(&self) -> Vec<f32> {
        self.detections.iter().map(|d| d.confidence).collect()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}
