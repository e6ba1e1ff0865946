//! End-to-end pipeline behaviour with a scripted detector standing in for
//! the real model.

use std::path::{Path, PathBuf};

use image::{
    DynamicImage, GenericImageView, GrayImage, ImageBuffer, ImageFormat, Luma, LumaA, Rgb,
    RgbImage, Rgba, RgbaImage,
};
use tempfile::TempDir;

use fracture_predict::{
    DetectorBackend, OutputRecord, Pipeline, PipelineConfig, PipelineError, StubBackend,
};
use fracture_predict::detect::StubObject;

struct Fixture {
    dir: TempDir,
    config: PipelineConfig,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = PipelineConfig::defaults_in(dir.path());
        Self { dir, config }
    }

    fn write_png(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        let img = RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 3) as u8, (y * 5) as u8, 90]));
        img.save(&path).expect("write source image");
        path
    }

    fn write_image(&self, name: &str, image: DynamicImage, format: ImageFormat) -> PathBuf {
        let path = self.dir.path().join(name);
        image
            .save_with_format(&path, format)
            .expect("write source image");
        path
    }

    fn write_gray_png(&self, name: &str) -> PathBuf {
        let img = GrayImage::from_fn(64, 48, |x, y| Luma([(x * 2 + y) as u8]));
        self.write_image(name, DynamicImage::ImageLuma8(img), ImageFormat::Png)
    }

    fn write_gray_alpha_png(&self, name: &str) -> PathBuf {
        let img = ImageBuffer::from_fn(64, 48, |x, _| LumaA([(x * 3) as u8, 200u8]));
        self.write_image(name, DynamicImage::ImageLumaA8(img), ImageFormat::Png)
    }

    fn write_gray16_png(&self, name: &str) -> PathBuf {
        let img = ImageBuffer::from_fn(64, 48, |x, y| Luma([(x * 1000 + y) as u16]));
        self.write_image(name, DynamicImage::ImageLuma16(img), ImageFormat::Png)
    }

    fn write_rgba_png(&self, name: &str) -> PathBuf {
        let img = RgbaImage::from_fn(64, 48, |x, y| Rgba([x as u8, y as u8, 7, 255]));
        self.write_image(name, DynamicImage::ImageRgba8(img), ImageFormat::Png)
    }

    fn uploads(&self) -> &Path {
        &self.config.uploads_dir
    }

    fn uploads_is_empty(&self) -> bool {
        match std::fs::read_dir(self.uploads()) {
            Ok(mut entries) => entries.next().is_none(),
            Err(_) => true,
        }
    }

    fn run(&self, image: &Path, backend: StubBackend) -> OutputRecord {
        Pipeline::new(self.config.clone())
            .run_with(image, move |_| Ok(Box::new(backend) as Box<dyn DetectorBackend>))
    }
}

#[test]
fn single_detection_produces_success_record_and_red_rectangle() {
    let fx = Fixture::new();
    let source = fx.write_png("scan.png");

    let record = fx.run(
        &source,
        StubBackend::batched(vec![vec![10.0, 10.0, 50.0, 40.0, 0.9, 0.0]]),
    );

    assert_eq!(
        record.to_json().unwrap(),
        r#"{"boxes":[[10.0,10.0,50.0,40.0]],"confidences":[0.9],"image_path":"/uploads/processed_scan.png"}"#
    );

    let annotated = image::open(fx.uploads().join("processed_scan.png")).expect("annotated image");
    let red = Rgba([255, 0, 0, 255]);
    assert_eq!(annotated.get_pixel(10, 10), red);
    assert_eq!(annotated.get_pixel(50, 25), red);
    assert_eq!(annotated.get_pixel(30, 40), red);
    // interior untouched
    let original = image::open(&source).unwrap();
    assert_eq!(annotated.get_pixel(30, 25), original.get_pixel(30, 25));
}

#[test]
fn zero_detections_copy_the_source_pixel_for_pixel() {
    let fx = Fixture::new();
    let source = fx.write_png("clean.png");

    let record = fx.run(&source, StubBackend::empty());

    match &record {
        OutputRecord::Success {
            boxes,
            confidences,
            image_path,
        } => {
            assert!(boxes.is_empty());
            assert!(confidences.is_empty());
            assert_eq!(image_path, "/uploads/processed_clean.png");
        }
        other => panic!("expected success, got {:?}", other),
    }

    let original = image::open(&source).unwrap();
    let annotated = image::open(fx.uploads().join("processed_clean.png")).unwrap();
    assert_eq!(original, annotated);
}

#[test]
fn per_object_output_yields_paired_boxes_and_confidences() {
    let fx = Fixture::new();
    let source = fx.write_png("scan.png");

    let record = fx.run(
        &source,
        StubBackend::objects(vec![
            StubObject::new([1.0, 2.0, 20.0, 22.0], 0.31),
            StubObject::new([30.0, 5.0, 60.0, 45.0], 0.77),
            StubObject::new([40.0, 5.0, 30.0, 45.0], 0.5),
        ]),
    );

    match record {
        OutputRecord::Success {
            boxes, confidences, ..
        } => {
            assert_eq!(boxes.len(), confidences.len());
            assert_eq!(boxes, vec![[1.0, 2.0, 20.0, 22.0], [30.0, 5.0, 60.0, 45.0]]);
            assert_eq!(confidences, vec![0.31, 0.77]);
        }
        other => panic!("expected success, got {:?}", other),
    }
}

#[test]
fn missing_weights_yield_error_record_and_no_upload() {
    let fx = Fixture::new();
    let source = fx.write_png("scan.png");

    let record = Pipeline::new(fx.config.clone()).run(&source);

    assert_eq!(
        record,
        OutputRecord::Error {
            error: format!(
                "Model file not found: {}",
                fx.dir.path().join("best.onnx").display()
            ),
        }
    );
    assert!(fx.uploads_is_empty());
}

#[test]
fn missing_image_yields_error_record_and_no_upload() {
    let fx = Fixture::new();
    let source = fx.dir.path().join("does_not_exist.png");

    let record = fx.run(&source, StubBackend::empty());

    match record {
        OutputRecord::Error { error } => assert!(error.starts_with("inference failed")),
        other => panic!("expected error, got {:?}", other),
    }
    assert!(fx.uploads_is_empty());
}

#[test]
fn corrupt_image_yields_error_record_and_no_upload() {
    let fx = Fixture::new();
    let source = fx.dir.path().join("corrupt.png");
    std::fs::write(&source, b"\x89PNG\r\n\x1a\ntruncated").unwrap();

    let record = fx.run(&source, StubBackend::empty());

    assert!(!record.is_success());
    assert!(fx.uploads_is_empty());
}

#[test]
fn detector_failure_is_reported_not_swallowed() {
    let fx = Fixture::new();
    let source = fx.write_png("scan.png");

    let record = fx.run(&source, StubBackend::failing("unsupported image mode"));

    match record {
        OutputRecord::Error { error } => assert!(error.contains("unsupported image mode")),
        other => panic!("expected error, got {:?}", other),
    }
    assert!(fx.uploads_is_empty());
}

#[test]
fn unwritable_uploads_dir_is_an_error_record() {
    let mut fx = Fixture::new();
    let source = fx.write_png("scan.png");
    // a regular file where the directory should be
    let blocker = fx.dir.path().join("blocked");
    std::fs::write(&blocker, b"").unwrap();
    fx.config.uploads_dir = blocker.join("uploads");

    let record = fx.run(&source, StubBackend::empty());

    match record {
        OutputRecord::Error { error } => {
            assert!(error.starts_with("failed to write annotated image"))
        }
        other => panic!("expected error, got {:?}", other),
    }
}

#[test]
fn rerunning_produces_byte_identical_annotation() {
    let fx = Fixture::new();
    let source = fx.write_png("scan.png");
    let rows = vec![vec![5.0, 5.0, 25.0, 30.0, 0.6, 0.0]];
    let target = fx.uploads().join("processed_scan.png");

    let first = fx.run(&source, StubBackend::batched(rows.clone()));
    let first_bytes = std::fs::read(&target).unwrap();
    let second = fx.run(&source, StubBackend::batched(rows));
    let second_bytes = std::fs::read(&target).unwrap();

    assert_eq!(first, second);
    assert_eq!(first_bytes, second_bytes);
}

#[test]
fn error_display_matches_record_message() {
    let err = PipelineError::ModelNotFound(PathBuf::from("/srv/best.onnx"));
    assert_eq!(
        OutputRecord::error(&err),
        OutputRecord::Error {
            error: "Model file not found: /srv/best.onnx".to_string()
        }
    );
}

const BOX_ROW: [f32; 6] = [10.0, 10.0, 50.0, 40.0, 0.9, 0.0];

fn assert_red_outline(path: &Path) {
    let annotated = image::ImageReader::open(path).and_then(|r| r.with_guessed_format()).map_err(image::ImageError::from).and_then(|r| r.decode()).expect("annotated image");
    let red = Rgba([255, 0, 0, 255]);
    assert_eq!(annotated.get_pixel(10, 10), red);
    assert_eq!(annotated.get_pixel(50, 25), red);
    assert_eq!(annotated.get_pixel(30, 40), red);
    assert_ne!(annotated.get_pixel(30, 25), red);
}

#[test]
fn extensionless_upload_is_annotated_in_its_sniffed_format() {
    let fx = Fixture::new();
    let source = fx.write_image(
        "3f2a9c0e1b7d4a55",
        DynamicImage::ImageRgb8(RgbImage::new(64, 48)),
        ImageFormat::Png,
    );

    let record = fx.run(&source, StubBackend::batched(vec![BOX_ROW.to_vec()]));

    match &record {
        OutputRecord::Success { image_path, .. } => {
            assert_eq!(image_path, "/uploads/processed_3f2a9c0e1b7d4a55")
        }
        other => panic!("expected success, got {:?}", other),
    }
    let target = fx.uploads().join("processed_3f2a9c0e1b7d4a55");
    let bytes = std::fs::read(&target).unwrap();
    assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
    assert_red_outline(&target);
}

#[test]
fn grayscale_source_gets_a_red_outline() {
    let fx = Fixture::new();
    let source = fx.write_gray_png("radiograph.png");

    let record = fx.run(&source, StubBackend::batched(vec![BOX_ROW.to_vec()]));

    assert!(record.is_success());
    assert_red_outline(&fx.uploads().join("processed_radiograph.png"));
}

#[test]
fn grayscale_with_alpha_keeps_alpha_and_gets_red() {
    let fx = Fixture::new();
    let source = fx.write_gray_alpha_png("overlay.png");

    let record = fx.run(&source, StubBackend::batched(vec![BOX_ROW.to_vec()]));

    assert!(record.is_success());
    let target = fx.uploads().join("processed_overlay.png");
    assert_red_outline(&target);
    let annotated = image::open(&target).unwrap();
    assert!(annotated.color().has_alpha());
    assert_eq!(annotated.get_pixel(30, 25)[3], 200);
}

#[test]
fn sixteen_bit_grayscale_gets_a_red_outline() {
    let fx = Fixture::new();
    let source = fx.write_gray16_png("deep.png");

    let record = fx.run(&source, StubBackend::batched(vec![BOX_ROW.to_vec()]));

    assert!(record.is_success());
    let target = fx.uploads().join("processed_deep.png");
    assert_red_outline(&target);
    assert_eq!(image::open(&target).unwrap().color().bytes_per_pixel(), 6);
}

#[test]
fn rgba_source_gets_a_red_outline() {
    let fx = Fixture::new();
    let source = fx.write_rgba_png("scan.png");

    let record = fx.run(&source, StubBackend::batched(vec![BOX_ROW.to_vec()]));

    assert!(record.is_success());
    assert_red_outline(&fx.uploads().join("processed_scan.png"));
}

#[test]
fn grayscale_without_detections_is_copied_unchanged() {
    let fx = Fixture::new();
    let source = fx.write_gray16_png("clean.png");

    let record = fx.run(&source, StubBackend::empty());

    assert!(record.is_success());
    let original = image::open(&source).unwrap();
    let annotated = image::open(fx.uploads().join("processed_clean.png")).unwrap();
    assert_eq!(original, annotated);
}

#[test]
fn extreme_box_coordinates_do_not_abort_the_run() {
    let fx = Fixture::new();
    let source = fx.write_png("wide.png");

    let record = fx.run(
        &source,
        StubBackend::batched(vec![vec![-1e10, 0.0, 1e10, 10.0, 0.9, 0.0]]),
    );

    match record {
        OutputRecord::Success { boxes, .. } => assert_eq!(boxes, vec![[-1e10, 0.0, 1e10, 10.0]]),
        other => panic!("expected success, got {:?}", other),
    }
    let annotated = image::open(fx.uploads().join("processed_wide.png")).unwrap();
    assert_eq!(annotated.get_pixel(32, 0), Rgba([255, 0, 0, 255]));
}
