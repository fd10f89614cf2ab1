use std::fmt;

use thiserror::Error;

use crate::classification::domain::classification_merger::FanOutError;
use crate::cropping::domain::frame_cropper::CropError;
use crate::pipeline::pipeline_config::ConfigError;
use crate::shared::BoxError;

/// Pipeline stage an error or cancellation is attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Source,
    Detect,
    Crop,
    Log,
    Classify,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Source => "source",
            Stage::Detect => "detect",
            Stage::Crop => "crop",
            Stage::Log => "log",
            Stage::Classify => "classify",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a pipeline invocation failed. No partial results accompany an error.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("detector '{detector}' failed: {source}")]
    Detect {
        detector: String,
        #[source]
        source: BoxError,
    },
    #[error("crop of detection {index} failed: {source}")]
    Crop {
        index: usize,
        #[source]
        source: CropError,
    },
    #[error("failed to log crop: {0}")]
    LogImage(#[source] BoxError),
    #[error("classifier '{classifier}' failed: {source}")]
    Classify {
        classifier: String,
        #[source]
        source: BoxError,
    },
    #[error("camera '{source_name}' failed: {source}")]
    FrameSource {
        source_name: String,
        #[source]
        source: BoxError,
    },
    #[error("cancelled during {stage}")]
    Cancelled { stage: Stage },
    #[error("{operation} is not supported")]
    Unsupported { operation: &'static str },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("pipeline settings lock poisoned")]
    Poisoned,
}

impl PipelineError {
    /// The stage that failed, or `None` for errors outside an invocation.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Detect { .. } => Some(Stage::Detect),
            PipelineError::Crop { .. } => Some(Stage::Crop),
            PipelineError::LogImage(_) => Some(Stage::Log),
            PipelineError::Classify { .. } => Some(Stage::Classify),
            PipelineError::FrameSource { .. } => Some(Stage::Source),
            PipelineError::Cancelled { stage } => Some(*stage),
            PipelineError::Unsupported { .. }
            | PipelineError::Config(_)
            | PipelineError::Poisoned => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled { .. })
    }
}

impl From<FanOutError> for PipelineError {
    fn from(err: FanOutError) -> Self {
        match err {
            FanOutError::Cancelled(_) => PipelineError::Cancelled {
                stage: Stage::Classify,
            },
            FanOutError::Classifier { name, source } => PipelineError::Classify {
                classifier: name,
                source,
            },
        }
    }
}
