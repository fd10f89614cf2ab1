use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use detect_classify_core::classification::infrastructure::onnx_image_classifier::{
    Normalization, OnnxImageClassifier, IMAGENET_MEAN, IMAGENET_STD,
};
use detect_classify_core::detection::infrastructure::onnx_yolo_detector::{
    OnnxYoloDetector, DEFAULT_CONFIDENCE,
};
use detect_classify_core::pipeline::pipeline_config::PipelineConfig;
use detect_classify_core::pipeline::service_registry::ServiceRegistry;
use detect_classify_core::shared::model_resolver;
use detect_classify_core::source::infrastructure::image_file_source::ImageFileSource;

/// Labels given inline or as a file with one label per line.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Labels {
    Inline(Vec<String>),
    File(PathBuf),
}

impl Default for Labels {
    fn default() -> Self {
        Labels::Inline(Vec::new())
    }
}

impl Labels {
    pub fn load(&self, base_dir: &Path) -> Result<Vec<String>, Box<dyn std::error::Error>> {
        match self {
            Labels::Inline(labels) => Ok(labels.clone()),
            Labels::File(path) => {
                let path = base_dir.join(path);
                let text = fs::read_to_string(&path)
                    .map_err(|e| format!("Cannot read labels {}: {e}", path.display()))?;
                Ok(text
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(String::from)
                    .collect())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DetectorSpec {
    /// Local path or URL of a YOLO ONNX model.
    pub model: String,
    #[serde(default)]
    pub labels: Labels,
    /// Raw score floor applied inside the model before NMS.
    #[serde(default = "default_detector_confidence")]
    pub confidence: f64,
}

fn default_detector_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

#[derive(Debug, Deserialize)]
pub struct ClassifierSpec {
    pub model: String,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default = "default_true")]
    pub softmax: bool,
    #[serde(default = "default_mean")]
    pub mean: [f32; 3],
    #[serde(default = "default_std")]
    pub std: [f32; 3],
}

fn default_true() -> bool {
    true
}

fn default_mean() -> [f32; 3] {
    IMAGENET_MEAN
}

fn default_std() -> [f32; 3] {
    IMAGENET_STD
}

#[derive(Debug, Deserialize)]
pub struct CameraSpec {
    /// Image file re-read on every frame request.
    pub path: PathBuf,
}

/// Everything the CLI needs: named backends plus the pipeline tunables.
#[derive(Debug, Deserialize)]
pub struct ServiceFile {
    #[serde(default)]
    pub detectors: HashMap<String, DetectorSpec>,
    #[serde(default)]
    pub classifiers: HashMap<String, ClassifierSpec>,
    #[serde(default)]
    pub cameras: HashMap<String, CameraSpec>,
    pub pipeline: PipelineConfig,
    /// Directory relative paths are resolved against; set by [`ServiceFile::load`].
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl ServiceFile {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let json = fs::read_to_string(path)
            .map_err(|e| format!("Cannot read config {}: {e}", path.display()))?;
        let mut file: ServiceFile = serde_json::from_str(&json)
            .map_err(|e| format!("Invalid config {}: {e}", path.display()))?;
        file.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(file)
    }

    /// Builds only the backends the pipeline config refers to.
    pub fn build_registry(&self) -> Result<ServiceRegistry, Box<dyn std::error::Error>> {
        let mut registry = ServiceRegistry::new();
        for name in self.pipeline.validate()? {
            if let Some(spec) = self.detectors.get(&name) {
                log::info!("Loading detector '{name}'");
                let model = self.resolve_model(&spec.model)?;
                let labels = spec.labels.load(&self.base_dir)?;
                let detector = OnnxYoloDetector::new(&model, labels, spec.confidence)?;
                registry.add_detector(name, Arc::new(detector));
            } else if let Some(spec) = self.classifiers.get(&name) {
                log::info!("Loading classifier '{name}'");
                let model = self.resolve_model(&spec.model)?;
                let labels = spec.labels.load(&self.base_dir)?;
                let normalization = Normalization {
                    mean: spec.mean,
                    std: spec.std,
                };
                let classifier =
                    OnnxImageClassifier::new(&model, labels, normalization, spec.softmax)?;
                registry.add_classifier(name, Arc::new(classifier));
            } else if let Some(spec) = self.cameras.get(&name) {
                let source = ImageFileSource::new(self.base_dir.join(&spec.path));
                registry.add_frame_source(name, Arc::new(source));
            } else {
                return Err(format!("No detector, classifier or camera named '{name}'").into());
            }
        }
        Ok(registry)
    }

    fn resolve_model(&self, reference: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let local = self.base_dir.join(reference);
        let reference = if local.exists() {
            local.to_string_lossy().into_owned()
        } else {
            reference.to_string()
        };
        let path = model_resolver::resolve(&reference, Some(Box::new(download_progress)))?;
        Ok(path)
    }
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading model... {pct}%");
        if downloaded >= total {
            eprintln!();
        }
    } else {
        eprint!("\rDownloading model... {downloaded} bytes");
    }
}
