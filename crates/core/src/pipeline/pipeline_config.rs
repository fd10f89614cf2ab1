use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::DEFAULT_CLASSIFIER_COUNT;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("detector is required")]
    MissingDetector,
    #[error("detector_confidence must be in (0, 1], got {0}")]
    InvalidConfidence(f64),
    #[error("detector_labels must list at least one label")]
    NoDetectorLabels,
    #[error("at least one classifier is required")]
    NoClassifiers,
    #[error("classifier '{0}' must request at least one result")]
    ZeroClassifierCount(String),
    #[error("image_path is required when log_image is enabled")]
    MissingImagePath,
    #[error("no camera is configured")]
    NoFrameSource,
    #[error("unknown detector '{0}'")]
    UnknownDetector(String),
    #[error("unknown classifier '{0}'")]
    UnknownClassifier(String),
    #[error("unknown camera '{0}'")]
    UnknownFrameSource(String),
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One entry of the classifier fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub classifier: String,
    /// Results requested from this classifier per crop.
    #[serde(default = "default_count")]
    pub count: usize,
}

fn default_count() -> usize {
    DEFAULT_CLASSIFIER_COUNT
}

/// Tunables for the detect-and-classify pipeline, as read from JSON.
///
/// `classifier1` / `classifier2` are the older two-slot form; they are
/// folded in front of `classifiers` by [`PipelineConfig::classifier_list`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub camera: Option<String>,
    pub detector: String,
    pub detector_confidence: f64,
    /// 0 = no limit.
    pub max_detections: usize,
    pub detector_labels: Vec<String>,
    pub padding: i32,
    pub classifier1: Option<String>,
    pub classifier2: Option<String>,
    pub classifiers: Vec<ClassifierConfig>,
    /// 0 = no limit.
    pub max_classifications: usize,
    pub log_image: bool,
    pub image_path: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Camera name, treating an empty string as unset.
    pub fn camera_name(&self) -> Option<&str> {
        self.camera.as_deref().filter(|c| !c.is_empty())
    }

    /// All configured classifiers in run order, legacy slots first.
    pub fn classifier_list(&self) -> Vec<ClassifierConfig> {
        let legacy = [&self.classifier1, &self.classifier2]
            .into_iter()
            .flatten()
            .filter(|name| !name.is_empty())
            .map(|name| ClassifierConfig {
                classifier: name.clone(),
                count: DEFAULT_CLASSIFIER_COUNT,
            });
        legacy.chain(self.classifiers.iter().cloned()).collect()
    }

    /// Checks the config and returns the names of every service it needs.
    pub fn validate(&self) -> Result<Vec<String>, ConfigError> {
        if self.detector.is_empty() {
            return Err(ConfigError::MissingDetector);
        }
        if !(self.detector_confidence > 0.0 && self.detector_confidence <= 1.0) {
            return Err(ConfigError::InvalidConfidence(self.detector_confidence));
        }
        if self.detector_labels.is_empty() {
            return Err(ConfigError::NoDetectorLabels);
        }
        let classifiers = self.classifier_list();
        if classifiers.is_empty() {
            return Err(ConfigError::NoClassifiers);
        }
        if let Some(c) = classifiers.iter().find(|c| c.count == 0) {
            return Err(ConfigError::ZeroClassifierCount(c.classifier.clone()));
        }
        if self.log_image && self.image_path.as_ref().map_or(true, |p| p.as_os_str().is_empty()) {
            return Err(ConfigError::MissingImagePath);
        }

        let mut deps = Vec::new();
        if let Some(camera) = self.camera_name() {
            deps.push(camera.to_string());
        }
        deps.push(self.detector.clone());
        for c in classifiers {
            if !deps.contains(&c.classifier) {
                deps.push(c.classifier);
            }
        }
        Ok(deps)
    }
}
