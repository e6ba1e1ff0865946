//! predict - run the detector on one image and print one JSON record
//!
//! stdout carries exactly one line: the success record
//! `{"boxes", "confidences", "image_path"}` or `{"error"}`. Logs go to stderr.
//!
//! Exit status: 0 on success, 1 on an error record, 2 on a usage error.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

use fracture_predict::{OutputRecord, Pipeline, PipelineConfig, PipelineError};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image to run detection on.
    #[arg(value_name = "IMAGE_PATH")]
    image_path: Option<PathBuf>,
    /// ONNX weights (defaults to best.onnx next to the executable).
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,
    /// Directory annotated images are written into.
    #[arg(long, value_name = "DIR")]
    uploads_dir: Option<PathBuf>,
    /// Minimum detection confidence.
    #[arg(long, value_name = "THRESHOLD")]
    confidence: Option<f32>,
    /// Clamp boxes to the image bounds before drawing.
    #[arg(long)]
    clamp_boxes: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let Some(image_path) = args.image_path.clone() else {
        let usage = PipelineError::Usage(format!("Usage: {} <image_path>", program_name()));
        eprintln!("{}", encode(&OutputRecord::error(&usage)));
        return ExitCode::from(2);
    };

    let record = match resolve_config(&args) {
        Ok(config) => Pipeline::new(config).run(&image_path),
        Err(err) => OutputRecord::error(&err),
    };

    let mut stdout = std::io::stdout().lock();
    if let Err(err) = writeln!(stdout, "{}", encode(&record)).and_then(|_| stdout.flush()) {
        log::error!("failed to write output record: {}", err);
        return ExitCode::FAILURE;
    }

    if record.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn resolve_config(args: &Args) -> Result<PipelineConfig, PipelineError> {
    let mut config = PipelineConfig::load().map_err(PipelineError::Config)?;
    if let Some(model) = &args.model {
        config.model_path = model.clone();
    }
    if let Some(dir) = &args.uploads_dir {
        config.uploads_dir = dir.clone();
    }
    if let Some(confidence) = args.confidence {
        config.confidence_threshold = confidence;
    }
    if args.clamp_boxes {
        config.annotation.clamp_boxes = true;
    }
    config.validate().map_err(PipelineError::Config)?;
    Ok(config)
}

fn encode(record: &OutputRecord) -> String {
    record.to_json().unwrap_or_else(|err| {
        log::error!("failed to serialize output record: {}", err);
        r#"{"error":"failed to serialize output record"}"#.to_string()
    })
}

fn program_name() -> String {
    std::env::args()
        .next()
        .as_deref()
        .and_then(|arg0| Path::new(arg0).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "predict".to_string())
}
