use std::path::PathBuf;

use crate::shared::frame::Frame;
use crate::shared::BoxError;

/// Persists crops for debugging and audit.
pub trait ImageLogger: Send + Sync {
    /// Stores the frame and returns where it ended up.
    fn log_image(&self, frame: &Frame) -> Result<PathBuf, BoxError>;
}
