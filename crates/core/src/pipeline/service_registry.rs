use std::collections::HashMap;
use std::sync::Arc;

use crate::classification::domain::image_classifier::ImageClassifier;
use crate::detection::domain::object_detector::ObjectDetector;
use crate::pipeline::pipeline_config::ConfigError;
use crate::source::domain::frame_source::FrameSource;

/// Named collaborator instances that a [`PipelineConfig`] refers to.
///
/// [`PipelineConfig`]: crate::pipeline::pipeline_config::PipelineConfig
#[derive(Default)]
pub struct ServiceRegistry {
    detectors: HashMap<String, Arc<dyn ObjectDetector>>,
    classifiers: HashMap<String, Arc<dyn ImageClassifier>>,
    frame_sources: HashMap<String, Arc<dyn FrameSource>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_detector(&mut self, name: impl Into<String>, detector: Arc<dyn ObjectDetector>) {
        self.detectors.insert(name.into(), detector);
    }

    pub fn add_classifier(
        &mut self,
        name: impl Into<String>,
        classifier: Arc<dyn ImageClassifier>,
    ) {
        self.classifiers.insert(name.into(), classifier);
    }

    pub fn add_frame_source(&mut self, name: impl Into<String>, source: Arc<dyn FrameSource>) {
        self.frame_sources.insert(name.into(), source);
    }

    pub fn detector(&self, name: &str) -> Result<Arc<dyn ObjectDetector>, ConfigError> {
        self.detectors
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownDetector(name.to_string()))
    }

    pub fn classifier(&self, name: &str) -> Result<Arc<dyn ImageClassifier>, ConfigError> {
        self.classifiers
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownClassifier(name.to_string()))
    }

    pub fn frame_source(&self, name: &str) -> Result<Arc<dyn FrameSource>, ConfigError> {
        self.frame_sources
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownFrameSource(name.to_string()))
    }
}
