use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::classification::domain::image_classifier::ImageClassifier;
use crate::shared::cancellation::CancelToken;
use crate::shared::classification::Classification;
use crate::shared::frame::Frame;
use crate::shared::ranking::rank_and_truncate;
use crate::shared::BoxError;

#[derive(Error, Debug)]
pub enum FanOutError {
    #[error("cancelled before classifier '{0}' ran")]
    Cancelled(String),
    #[error("classifier '{name}' failed: {source}")]
    Classifier {
        name: String,
        #[source]
        source: BoxError,
    },
}

/// One classifier in the fan-out, with how many results to ask it for.
#[derive(Clone)]
pub struct ClassifierStage {
    pub name: String,
    pub classifier: Arc<dyn ImageClassifier>,
    pub count: usize,
}

impl ClassifierStage {
    pub fn new(name: impl Into<String>, classifier: Arc<dyn ImageClassifier>, count: usize) -> Self {
        Self {
            name: name.into(),
            classifier,
            count,
        }
    }
}

impl fmt::Debug for ClassifierStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierStage")
            .field("name", &self.name)
            .field("count", &self.count)
            .finish()
    }
}

/// Runs every stage against the same crop, in order, and merges the results.
///
/// The first failing classifier aborts the whole call; no partial result is
/// returned. The merged list is ranked and capped by [`merge_classifications`].
pub fn classify_crop(
    crop: &Frame,
    stages: &[ClassifierStage],
    max_results: usize,
    cancel: &CancelToken,
) -> Result<Vec<Classification>, FanOutError> {
    let mut collected = Vec::new();
    for stage in stages {
        if cancel.is_cancelled() {
            return Err(FanOutError::Cancelled(stage.name.clone()));
        }
        let results = stage
            .classifier
            .classify(crop, stage.count, cancel)
            .map_err(|source| FanOutError::Classifier {
                name: stage.name.clone(),
                source,
            })?;
        log::debug!("Classifier '{}' returned {} results", stage.name, results.len());
        collected.extend(results);
    }
    Ok(merge_classifications(collected, max_results))
}

/// Ranks classifications by score (stable) and keeps the top `max_results`.
///
/// `max_results == 0` means no cap.
pub fn merge_classifications(
    mut classifications: Vec<Classification>,
    max_results: usize,
) -> Vec<Classification> {
    rank_and_truncate(&mut classifications, max_results);
    classifications
}
