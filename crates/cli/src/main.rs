mod services;

use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use detect_classify_core::pipeline::detect_and_classify_use_case::DetectClassifyService;
use detect_classify_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use detect_classify_core::shared::cancellation::CancelToken;
use detect_classify_core::shared::classification::Classification;
use detect_classify_core::shared::constants::IMAGE_EXTENSIONS;
use detect_classify_core::source::infrastructure::image_file_source::read_image_frame;

use crate::services::ServiceFile;

/// Detect objects, crop them, and classify the crops.
#[derive(Parser)]
#[command(name = "detect-classify")]
struct Cli {
    /// Service file: named detectors, classifiers, cameras and the pipeline settings.
    #[arg(long, short)]
    config: PathBuf,

    /// Images or directories of images to classify. Without any, one frame
    /// is taken from the configured camera.
    inputs: Vec<PathBuf>,

    /// Print results as JSON instead of text.
    #[arg(long)]
    json: bool,

    /// Override the pipeline's max_classifications.
    #[arg(long)]
    max_classifications: Option<usize>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut services = ServiceFile::load(&cli.config)?;
    if let Some(max) = cli.max_classifications {
        services.pipeline.max_classifications = max;
    }

    let registry = services.build_registry()?;
    let service = DetectClassifyService::from_config(
        &services.pipeline,
        &registry,
        Box::new(StdoutPipelineLogger::new()),
    )?;
    let cancel = CancelToken::new();

    let result = classify_all(&service, &cli, &cancel);
    service.close()?;
    result
}

fn classify_all(
    service: &DetectClassifyService,
    cli: &Cli,
    cancel: &CancelToken,
) -> Result<(), Box<dyn std::error::Error>> {
    if cli.inputs.is_empty() {
        let classifications = service.classifications_from_source(cancel)?;
        return print_results("camera", &classifications, cli.json);
    }
    classify_inputs(service, &collect_images(&cli.inputs)?, cancel, cli.json)
}

fn classify_inputs(
    service: &DetectClassifyService,
    images: &[PathBuf],
    cancel: &CancelToken,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    for (index, path) in images.iter().enumerate() {
        let frame = read_image_frame(path, index).map_err(|e| e as Box<dyn std::error::Error>)?;
        let classifications = service
            .classifications(&frame, cancel)
            .map_err(|e| format!("{}: {e}", path.display()))?;
        print_results(&path.display().to_string(), &classifications, json)?;
    }
    Ok(())
}

fn print_results(
    name: &str,
    classifications: &[Classification],
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        let value = serde_json::json!({
            "input": name,
            "classifications": classifications,
        });
        println!("{}", serde_json::to_string(&value)?);
    } else {
        println!("{name}:");
        if classifications.is_empty() {
            println!("  (no classifications)");
        }
        for c in classifications {
            println!("  {:<24} {:.3}", c.label, c.score);
        }
    }
    Ok(())
}

/// Expands directories into the image files they contain, sorted by name.
fn collect_images(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut images = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(input)?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| is_image(p))
                .collect();
            entries.sort();
            images.extend(entries);
        } else if input.exists() {
            images.push(input.clone());
        } else {
            return Err(format!("Input file not found: {}", input.display()).into());
        }
    }
    Ok(images)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
