use serde::Serialize;

use crate::shared::ranking::Scored;

/// A label and confidence assigned by a classifier to a whole image.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Classification {
    pub label: String,
    pub score: f64,
}

impl Classification {
    pub fn new(label: impl Into<String>, score: f64) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

impl Scored for Classification {
    fn score(&self) -> f64 {
        self.score
    }
}
