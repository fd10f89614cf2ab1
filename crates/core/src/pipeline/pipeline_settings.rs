use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::audit::domain::image_logger::ImageLogger;
use crate::audit::infrastructure::content_addressed_jpeg_logger::ContentAddressedJpegLogger;
use crate::classification::domain::classification_merger::ClassifierStage;
use crate::detection::domain::object_detector::ObjectDetector;
use crate::pipeline::pipeline_config::{ConfigError, PipelineConfig};
use crate::pipeline::service_registry::ServiceRegistry;
use crate::source::domain::frame_source::FrameSource;

/// A frame source together with the name it was configured under.
#[derive(Clone)]
pub struct NamedFrameSource {
    pub name: String,
    pub source: Arc<dyn FrameSource>,
}

/// Resolved, immutable pipeline configuration.
///
/// An invocation holds one `Arc<PipelineSettings>` from start to finish, so a
/// concurrent reconfigure never changes the settings under it.
#[derive(Clone)]
pub struct PipelineSettings {
    pub detector_name: String,
    pub detector: Arc<dyn ObjectDetector>,
    pub min_confidence: f64,
    pub max_detections: usize,
    pub allowed_labels: HashSet<String>,
    pub padding: i32,
    pub classifiers: Vec<ClassifierStage>,
    pub max_classifications: usize,
    pub image_logger: Option<Arc<dyn ImageLogger>>,
    pub frame_source: Option<NamedFrameSource>,
    pub dependencies: Vec<String>,
}

impl PipelineSettings {
    /// Validates `config` and looks up every named collaborator.
    pub fn resolve(config: &PipelineConfig, registry: &ServiceRegistry) -> Result<Self, ConfigError> {
        let dependencies = config.validate()?;

        let detector = registry.detector(&config.detector)?;
        let classifiers = config
            .classifier_list()
            .into_iter()
            .map(|c| {
                let classifier = registry.classifier(&c.classifier)?;
                Ok(ClassifierStage::new(c.classifier, classifier, c.count))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        let frame_source = config
            .camera_name()
            .map(|name| {
                registry.frame_source(name).map(|source| NamedFrameSource {
                    name: name.to_string(),
                    source,
                })
            })
            .transpose()?;

        let image_logger: Option<Arc<dyn ImageLogger>> = match (&config.image_path, config.log_image) {
            (Some(dir), true) => Some(Arc::new(ContentAddressedJpegLogger::new(dir))),
            (None, true) => return Err(ConfigError::MissingImagePath),
            (_, false) => None,
        };

        Ok(Self {
            detector_name: config.detector.clone(),
            detector,
            min_confidence: config.detector_confidence,
            max_detections: config.max_detections,
            allowed_labels: config.detector_labels.iter().cloned().collect(),
            padding: config.padding,
            classifiers,
            max_classifications: config.max_classifications,
            image_logger,
            frame_source,
            dependencies,
        })
    }

    /// Replaces the crop logger, e.g. with one writing somewhere else.
    pub fn with_image_logger(mut self, logger: Arc<dyn ImageLogger>) -> Self {
        self.image_logger = Some(logger);
        self
    }
}

impl fmt::Debug for PipelineSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineSettings")
            .field("detector", &self.detector_name)
            .field("min_confidence", &self.min_confidence)
            .field("max_detections", &self.max_detections)
            .field("allowed_labels", &self.allowed_labels)
            .field("padding", &self.padding)
            .field("classifiers", &self.classifiers)
            .field("max_classifications", &self.max_classifications)
            .field("log_image", &self.image_logger.is_some())
            .field("camera", &self.frame_source.as_ref().map(|s| &s.name))
            .finish()
    }
}
