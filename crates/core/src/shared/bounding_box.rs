use serde::Serialize;

/// Axis-aligned rectangle in pixel coordinates.
///
/// `min` is inclusive and `max` exclusive, so a box covering a single pixel
/// at (3, 4) is `{3, 4, 4, 5}`. Coordinates may be negative or beyond the
/// image after padding; nothing here clamps them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct BoundingBox {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

impl BoundingBox {
    pub fn new(x_min: i32, y_min: i32, x_max: i32, y_max: i32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Grows the box by `padding` pixels on all four edges.
    ///
    /// A negative padding shrinks the box and may invert it.
    pub fn padded(&self, padding: i32) -> Self {
        Self {
            x_min: self.x_min.saturating_sub(padding),
            y_min: self.y_min.saturating_sub(padding),
            x_max: self.x_max.saturating_add(padding),
            y_max: self.y_max.saturating_add(padding),
        }
    }

    /// Width as a signed quantity; zero or negative for degenerate boxes.
    pub fn width(&self) -> i64 {
        self.x_max as i64 - self.x_min as i64
    }

    pub fn height(&self) -> i64 {
        self.y_max as i64 - self.y_min as i64
    }

    /// True when the box covers no pixels (empty or inverted on either axis).
    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }
}
