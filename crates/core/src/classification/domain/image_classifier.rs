use crate::shared::cancellation::CancelToken;
use crate::shared::classification::Classification;
use crate::shared::frame::Frame;
use crate::shared::BoxError;

/// Domain interface for whole-image classifiers.
pub trait ImageClassifier: Send + Sync {
    /// Returns at most `count` classifications for the frame.
    fn classify(
        &self,
        frame: &Frame,
        count: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<Classification>, BoxError>;
}
