//! Annotator: draws detections onto a copy of the source image.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, ImageFormat, Rgba};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::config::AnnotationStyle;
use crate::detect::adapter::decode_image_with_format;
use crate::detect::DetectionResult;
use crate::PipelineError;

const PROCESSED_PREFIX: &str = "processed_";

/// Annotated copy written by the pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotatedImage {
    /// Derived name, `processed_<basename>`.
    pub file_name: String,
    /// Location on disk.
    pub path: PathBuf,
}

/// `processed_<basename(source)>`.
pub fn processed_file_name(source: &Path) -> Result<String> {
    let base = source
        .file_name()
        .ok_or_else(|| anyhow!("image path {} has no file name", source.display()))?;
    Ok(format!("{}{}", PROCESSED_PREFIX, base.to_string_lossy()))
}

/// Draw `result` onto the image at `source` and persist it under `uploads_dir`.
///
/// The file is staged next to its destination and renamed into place, so a
/// failed write never leaves a partial annotated image behind.
pub fn annotate(
    source: &Path,
    result: &DetectionResult,
    style: &AnnotationStyle,
    uploads_dir: &Path,
) -> Result<AnnotatedImage, PipelineError> {
    write_annotated(source, result, style, uploads_dir).map_err(PipelineError::ImageWrite)
}

fn write_annotated(
    source: &Path,
    result: &DetectionResult,
    style: &AnnotationStyle,
    uploads_dir: &Path,
) -> Result<AnnotatedImage> {
    let file_name = processed_file_name(source)?;
    let (mut image, detected_format) = decode_image_with_format(source)?;
    draw_detections(&mut image, result, style);

    fs::create_dir_all(uploads_dir)
        .with_context(|| format!("failed to create {}", uploads_dir.display()))?;
    let path = uploads_dir.join(&file_name);
    // upload stores often drop the extension; fall back to the sniffed format
    let format = ImageFormat::from_path(&path)
        .ok()
        .or(detected_format)
        .ok_or_else(|| anyhow!("cannot infer image format for {}", file_name))?;

    let staging = uploads_dir.join(format!(".{}.{}.tmp", file_name, std::process::id()));
    if let Err(err) = save_as(&image, &staging, format) {
        let _ = fs::remove_file(&staging);
        return Err(err);
    }
    fs::rename(&staging, &path).map_err(|e| {
        let _ = fs::remove_file(&staging);
        anyhow!("failed to move annotated image into {}: {}", path.display(), e)
    })?;

    log::info!("wrote {} with {} boxes", path.display(), result.len());
    Ok(AnnotatedImage { file_name, path })
}

fn save_as(image: &DynamicImage, path: &Path, format: ImageFormat) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    image
        .write_to(&mut writer, format)
        .with_context(|| format!("failed to encode {}", path.display()))?;
    writer
        .into_inner()
        .map_err(|e| anyhow!("failed to flush {}: {}", path.display(), e.error()))?
        .sync_all()
        .with_context(|| format!("failed to sync {}", path.display()))
}

/// Draw one hollow rectangle per detection, `stroke_width` pixels thick,
/// growing inward from the box edge. Both corners are inclusive.
///
/// Grayscale images are promoted to RGB (keeping alpha and bit depth) before
/// the first box is drawn so the stroke keeps its colour.
pub fn draw_detections(
    image: &mut DynamicImage,
    result: &DetectionResult,
    style: &AnnotationStyle,
) {
    if result.is_empty() {
        return;
    }
    if let Some(promoted) = promote_to_color(image) {
        *image = promoted;
    }

    let [r, g, b] = style.stroke_color;
    let color = Rgba([r, g, b, 255]);
    let (width, height) = (image.width(), image.height());
    let stroke = i64::from(style.stroke_width);

    for detection in result.detections() {
        let [x1, y1, x2, y2] = if style.clamp_boxes {
            clamp_to_image(detection.bbox.coords(), width, height)
        } else {
            detection.bbox.coords()
        };
        if x2 <= x1 || y2 <= y1 {
            // clamped entirely off-canvas
            continue;
        }
        // Edges further off-canvas than the stroke are invisible; pinning them
        // there keeps the arithmetic small without changing what is drawn.
        let pin_x = |v: f32| (v.round() as i64).clamp(-stroke, i64::from(width) + stroke);
        let pin_y = |v: f32| (v.round() as i64).clamp(-stroke, i64::from(height) + stroke);
        let (left, top) = (pin_x(x1), pin_y(y1));
        let (right, bottom) = (pin_x(x2), pin_y(y2));

        for inset in 0..stroke {
            let w = right - left + 1 - 2 * inset;
            let h = bottom - top + 1 - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at((left + inset) as i32, (top + inset) as i32)
                .of_size(w as u32, h as u32);
            draw_hollow_rect_mut(image, rect, color);
        }
    }
}

fn promote_to_color(image: &DynamicImage) -> Option<DynamicImage> {
    match image {
        DynamicImage::ImageLuma8(_) => Some(DynamicImage::ImageRgb8(image.to_rgb8())),
        DynamicImage::ImageLumaA8(_) => Some(DynamicImage::ImageRgba8(image.to_rgba8())),
        DynamicImage::ImageLuma16(_) => Some(DynamicImage::ImageRgb16(image.to_rgb16())),
        DynamicImage::ImageLumaA16(_) => Some(DynamicImage::ImageRgba16(image.to_rgba16())),
        _ => None,
    }
}

fn clamp_to_image([x1, y1, x2, y2]: [f32; 4], width: u32, height: u32) -> [f32; 4] {
    let max_x = width.saturating_sub(1) as f32;
    let max_y = height.saturating_sub(1) as f32;
    [
        x1.clamp(0.0, max_x),
        y1.clamp(0.0, max_y),
        x2.clamp(0.0, max_x),
        y2.clamp(0.0, max_y),
    ]
}
