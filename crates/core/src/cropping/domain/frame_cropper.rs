use thiserror::Error;

use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CropError {
    #[error("crop rectangle {0:?} is empty or inverted")]
    Degenerate(BoundingBox),
    #[error("crop rectangle {0:?} is too large to allocate")]
    TooLarge(BoundingBox),
}

/// Largest crop side accepted; also the JPEG dimension limit.
pub const MAX_CROP_SIDE: i64 = 65_535;

/// Largest crop area accepted, in pixels (8192 x 4096).
pub const MAX_CROP_PIXELS: i64 = 1 << 25;

/// Expands a detection box by `padding` pixels on every edge.
pub fn padded_crop_box(bounding_box: &BoundingBox, padding: i32) -> BoundingBox {
    bounding_box.padded(padding)
}

/// Copies the pixels under `rect` into a new frame of exactly `rect`'s size.
///
/// The rectangle may extend past the source bounds: those pixels stay at
/// the zero background value, nothing is sampled from outside the source.
/// The source frame is never modified.
pub fn crop_frame(frame: &Frame, rect: &BoundingBox) -> Result<Frame, CropError> {
    if rect.is_degenerate() {
        return Err(CropError::Degenerate(*rect));
    }
    if rect.width() > MAX_CROP_SIDE
        || rect.height() > MAX_CROP_SIDE
        || rect.width() * rect.height() > MAX_CROP_PIXELS
    {
        return Err(CropError::TooLarge(*rect));
    }
    let out_w = rect.width() as u32;
    let out_h = rect.height() as u32;
    let channels = frame.channels() as usize;

    let mut out = Frame::blank(out_w, out_h, frame.channels());

    // Intersection with the source, in source coordinates.
    let src_x1 = (rect.x_min as i64).max(0);
    let src_y1 = (rect.y_min as i64).max(0);
    let src_x2 = (rect.x_max as i64).min(frame.width() as i64);
    let src_y2 = (rect.y_max as i64).min(frame.height() as i64);
    if src_x1 >= src_x2 || src_y1 >= src_y2 {
        return Ok(out);
    }

    let src_stride = frame.width() as usize * channels;
    let dst_stride = out_w as usize * channels;
    let row_bytes = (src_x2 - src_x1) as usize * channels;
    let dst_x = (src_x1 - rect.x_min as i64) as usize;

    let src = frame.data();
    let dst = out.data_mut();
    for src_y in src_y1..src_y2 {
        let dst_y = (src_y - rect.y_min as i64) as usize;
        let s = src_y as usize * src_stride + src_x1 as usize * channels;
        let d = dst_y * dst_stride + dst_x * channels;
        dst[d..d + row_bytes].copy_from_slice(&src[s..s + row_bytes]);
    }

    Ok(out)
}
