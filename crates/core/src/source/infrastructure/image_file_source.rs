use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::shared::cancellation::CancelToken;
use crate::shared::frame::Frame;
use crate::shared::BoxError;
use crate::source::domain::frame_source::FrameSource;

/// A still-image "camera": decodes the same file on every acquisition.
///
/// Re-reading on each call picks up files that another process keeps
/// overwriting (snapshot endpoints, test rigs). Frames are numbered in
/// acquisition order.
pub struct ImageFileSource {
    path: PathBuf,
    next_index: AtomicUsize,
    closed: AtomicBool,
}

impl ImageFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            next_index: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Decodes an image file into an RGB frame.
pub fn read_image_frame(path: &Path, index: usize) -> Result<Frame, BoxError> {
    let img = image::open(path)
        .map_err(|e| format!("failed to read image {}: {e}", path.display()))?;
    Ok(Frame::from_rgb_image(img.to_rgb8(), index))
}

impl FrameSource for ImageFileSource {
    fn acquire(&self, cancel: &CancelToken) -> Result<Frame, BoxError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(format!("frame source {} is closed", self.path.display()).into());
        }
        if cancel.is_cancelled() {
            return Err("cancelled".into());
        }
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        read_image_frame(&self.path, index)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}
