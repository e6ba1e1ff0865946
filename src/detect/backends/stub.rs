use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::raw::{DetectedObject, RawDetections};

/// Per-object detection used by `StubBackend`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StubObject {
    xyxy: [f32; 4],
    confidence: f32,
}

impl StubObject {
    pub fn new(xyxy: [f32; 4], confidence: f32) -> Self {
        Self { xyxy, confidence }
    }
}

impl DetectedObject for StubObject {
    fn xyxy(&self) -> [f32; 4] {
        self.xyxy
    }

    fn confidence(&self) -> f32 {
        self.confidence
    }
}

#[derive(Clone, Debug)]
enum Scripted {
    Rows(Vec<Vec<f32>>),
    Objects(Vec<StubObject>),
    Fail(String),
}

/// Stub backend for testing. Replays a scripted output on every call.
#[derive(Clone, Debug)]
pub struct StubBackend {
    scripted: Scripted,
    calls: usize,
    last_dimensions: Option<(u32, u32)>,
}

impl StubBackend {
    /// Always reports zero detections.
    pub fn empty() -> Self {
        Self::batched(Vec::new())
    }

    /// Replays `[x1, y1, x2, y2, confidence, class]` rows.
    pub fn batched(rows: Vec<Vec<f32>>) -> Self {
        Self::scripted(Scripted::Rows(rows))
    }

    /// Replays per-object detections.
    pub fn objects(objects: Vec<StubObject>) -> Self {
        Self::scripted(Scripted::Objects(objects))
    }

    /// Fails every call with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::scripted(Scripted::Fail(message.into()))
    }

    fn scripted(scripted: Scripted) -> Self {
        Self {
            scripted,
            calls: 0,
            last_dimensions: None,
        }
    }

    /// Number of `detect` calls so far.
    pub fn calls(&self) -> usize {
        self.calls
    }

    /// Dimensions of the most recent frame passed to `detect`.
    pub fn last_dimensions(&self) -> Option<(u32, u32)> {
        self.last_dimensions
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<RawDetections> {
        self.calls += 1;
        self.last_dimensions = Some((width, height));

        let expected_len = (width as usize) * (height as usize) * 3;
        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }

        match &self.scripted {
            Scripted::Rows(rows) => Ok(RawDetections::Batched(rows.clone())),
            Scripted::Objects(objects) => Ok(RawDetections::Objects(
                objects
                    .iter()
                    .map(|o| Box::new(*o) as Box<dyn DetectedObject>)
                    .collect(),
            )),
            Scripted::Fail(message) => Err(anyhow!("{}", message)),
        }
    }
}
