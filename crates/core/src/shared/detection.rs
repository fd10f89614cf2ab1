use serde::Serialize;

use crate::shared::bounding_box::BoundingBox;
use crate::shared::ranking::Scored;

/// A labelled, scored region proposal produced by an object detector.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    pub label: String,
    pub score: f64,
}

impl Detection {
    pub fn new(bounding_box: BoundingBox, label: impl Into<String>, score: f64) -> Self {
        Self {
            bounding_box,
            label: label.into(),
            score,
        }
    }
}

impl Scored for Detection {
    fn score(&self) -> f64 {
        self.score
    }
}
