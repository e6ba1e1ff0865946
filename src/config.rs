use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_MODEL_FILE: &str = "best.onnx";
const DEFAULT_UPLOADS_DIR: &str = "uploads";
const DEFAULT_PUBLIC_PREFIX: &str = "/uploads";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_STROKE_COLOR: [u8; 3] = [255, 0, 0];
const DEFAULT_STROKE_WIDTH: u32 = 2;

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    model_path: Option<PathBuf>,
    uploads_dir: Option<PathBuf>,
    public_prefix: Option<String>,
    detector: Option<DetectorConfigFile>,
    annotation: Option<AnnotationConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct AnnotationConfigFile {
    stroke_color: Option<[u8; 3]>,
    stroke_width: Option<u32>,
    clamp_boxes: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// ONNX export of the detector weights.
    pub model_path: PathBuf,
    /// Directory annotated copies are written into.
    pub uploads_dir: PathBuf,
    /// URL prefix reported in `image_path` of the success record.
    pub public_prefix: String,
    /// Side of the square model input, in pixels.
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub annotation: AnnotationStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotationStyle {
    pub stroke_color: [u8; 3],
    pub stroke_width: u32,
    /// Clamp box coordinates to the image bounds before drawing.
    pub clamp_boxes: bool,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            stroke_color: DEFAULT_STROKE_COLOR,
            stroke_width: DEFAULT_STROKE_WIDTH,
            clamp_boxes: false,
        }
    }
}

impl PipelineConfig {
    /// Built-in defaults with every path anchored at `script_dir`.
    pub fn defaults_in(script_dir: &Path) -> Self {
        Self {
            model_path: script_dir.join(DEFAULT_MODEL_FILE),
            uploads_dir: script_dir.join(DEFAULT_UPLOADS_DIR),
            public_prefix: DEFAULT_PUBLIC_PREFIX.to_string(),
            input_size: DEFAULT_INPUT_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            annotation: AnnotationStyle::default(),
        }
    }

    /// Resolve configuration relative to the running executable's directory.
    pub fn load() -> Result<Self> {
        Self::load_in(&script_dir()?)
    }

    /// Resolve configuration: defaults, then `PREDICT_CONFIG`, then env overrides.
    pub fn load_in(script_dir: &Path) -> Result<Self> {
        let config_path = std::env::var("PREDICT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(script_dir, file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(script_dir: &Path, file: PipelineConfigFile) -> Self {
        let defaults = Self::defaults_in(script_dir);
        let detector = file.detector.unwrap_or_default();
        let annotation = file.annotation.unwrap_or_default();
        Self {
            model_path: file
                .model_path
                .map(|path| anchor(script_dir, path))
                .unwrap_or(defaults.model_path),
            uploads_dir: file
                .uploads_dir
                .map(|path| anchor(script_dir, path))
                .unwrap_or(defaults.uploads_dir),
            public_prefix: file.public_prefix.unwrap_or(defaults.public_prefix),
            input_size: detector.input_size.unwrap_or(defaults.input_size),
            confidence_threshold: detector
                .confidence_threshold
                .unwrap_or(defaults.confidence_threshold),
            iou_threshold: detector.iou_threshold.unwrap_or(defaults.iou_threshold),
            annotation: AnnotationStyle {
                stroke_color: annotation
                    .stroke_color
                    .unwrap_or(defaults.annotation.stroke_color),
                stroke_width: annotation
                    .stroke_width
                    .unwrap_or(defaults.annotation.stroke_width),
                clamp_boxes: annotation
                    .clamp_boxes
                    .unwrap_or(defaults.annotation.clamp_boxes),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("PREDICT_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.model_path = PathBuf::from(path);
            }
        }
        if let Ok(dir) = std::env::var("PREDICT_UPLOADS_DIR") {
            if !dir.trim().is_empty() {
                self.uploads_dir = PathBuf::from(dir);
            }
        }
        if let Ok(value) = std::env::var("PREDICT_CONFIDENCE") {
            self.confidence_threshold = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("PREDICT_CONFIDENCE must be a number between 0 and 1"))?;
        }
        if let Ok(value) = std::env::var("PREDICT_IOU") {
            self.iou_threshold = value
                .trim()
                .parse()
                .map_err(|_| anyhow!("PREDICT_IOU must be a number between 0 and 1"))?;
        }
        if let Ok(value) = std::env::var("PREDICT_CLAMP_BOXES") {
            self.annotation.clamp_boxes = parse_bool(&value)
                .ok_or_else(|| anyhow!("PREDICT_CLAMP_BOXES must be true or false"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(anyhow!(
                "confidence threshold {} is outside [0, 1]",
                self.confidence_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(anyhow!(
                "IoU threshold {} is outside [0, 1]",
                self.iou_threshold
            ));
        }
        if self.input_size == 0 || self.input_size % 32 != 0 {
            return Err(anyhow!(
                "input size {} must be a positive multiple of 32",
                self.input_size
            ));
        }
        if self.annotation.stroke_width == 0 {
            return Err(anyhow!("stroke width must be at least 1"));
        }
        Ok(())
    }
}

/// Directory containing the running executable.
pub fn script_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("failed to resolve executable path")?;
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow!("executable path {} has no parent", exe.display()))
}

fn anchor(script_dir: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        script_dir.join(path)
    }
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
