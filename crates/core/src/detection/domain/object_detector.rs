use crate::shared::cancellation::CancelToken;
use crate::shared::detection::Detection;
use crate::shared::frame::Frame;
use crate::shared::BoxError;

/// Domain interface for object detection backends.
///
/// Detectors are shared by every in-flight invocation, hence `&self` and
/// `Sync`. Backends that need mutable state guard it internally.
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, frame: &Frame, cancel: &CancelToken) -> Result<Vec<Detection>, BoxError>;
}
