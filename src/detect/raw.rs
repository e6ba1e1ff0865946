/// A single detection as exposed by per-object detector output.
pub trait DetectedObject: Send {
    /// Corner coordinates `[x1, y1, x2, y2]` in source-image pixels.
    fn xyxy(&self) -> [f32; 4];

    /// Detector confidence in `[0, 1]`.
    fn confidence(&self) -> f32;
}

/// Native detector output, before normalization.
pub enum RawDetections {
    /// One row per detection: `[x1, y1, x2, y2, confidence, class]`.
    ///
    /// The class column is optional; rows need at least five values.
    Batched(Vec<Vec<f32>>),
    /// One object per detection with separate coordinate and confidence accessors.
    Objects(Vec<Box<dyn DetectedObject>>),
}

impl RawDetections {
    pub fn len(&self) -> usize {
        match self {
            RawDetections::Batched(rows) => rows.len(),
            RawDetections::Objects(objects) => objects.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shape_name(&self) -> &'static str {
        match self {
            RawDetections::Batched(_) => "batched",
            RawDetections::Objects(_) => "objects",
        }
    }
}

impl std::fmt::Debug for RawDetections {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawDetections::Batched(rows) => f.debug_tuple("Batched").field(rows).finish(),
            RawDetections::Objects(objects) => f
                .debug_list()
                .entries(objects.iter().map(|o| (o.xyxy(), o.confidence())))
                .finish(),
        }
    }
}
