use std::ops::Deref;

use crate::shared::cancellation::CancelToken;
use crate::shared::frame::Frame;
use crate::shared::BoxError;

/// A camera or other stream that hands out one frame at a time.
///
/// Every acquired frame must be handed back through [`FrameSource::release`];
/// use [`acquire_lease`] to get that for free.
pub trait FrameSource: Send + Sync {
    fn acquire(&self, cancel: &CancelToken) -> Result<Frame, BoxError>;

    /// Returns a frame obtained from [`FrameSource::acquire`]. Default: no-op.
    fn release(&self, _frame: &Frame) {}

    /// Releases any resources held by the source.
    fn close(&self) {}
}

/// Scoped frame acquisition: the frame is released when the lease drops,
/// including on early return or error downstream.
pub struct FrameLease<'a> {
    source: &'a dyn FrameSource,
    frame: Frame,
}

impl Deref for FrameLease<'_> {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        &self.frame
    }
}

impl Drop for FrameLease<'_> {
    fn drop(&mut self) {
        self.source.release(&self.frame);
    }
}

pub fn acquire_lease<'a>(
    source: &'a dyn FrameSource,
    cancel: &CancelToken,
) -> Result<FrameLease<'a>, BoxError> {
    let frame = source.acquire(cancel)?;
    Ok(FrameLease { source, frame })
}
