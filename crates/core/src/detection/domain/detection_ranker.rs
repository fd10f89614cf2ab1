use std::collections::HashSet;

use crate::shared::detection::Detection;
use crate::shared::ranking::rank_and_truncate;

/// Ranks detections by score and keeps the ones worth classifying.
///
/// Order of operations matters:
/// 1. stable sort by score, descending;
/// 2. truncate to `max_count` (0 = no limit);
/// 3. drop entries below `min_confidence` or whose label is not in
///    `allowed_labels`.
///
/// Truncation happens before filtering, so a high-scoring detection with a
/// disallowed label still occupies one of the `max_count` slots. An empty
/// `allowed_labels` set lets nothing through.
pub fn rank_and_filter(
    detections: &[Detection],
    max_count: usize,
    min_confidence: f64,
    allowed_labels: &HashSet<String>,
) -> Vec<Detection> {
    let mut ranked = detections.to_vec();
    rank_and_truncate(&mut ranked, max_count);
    ranked.retain(|d| d.score >= min_confidence && allowed_labels.contains(&d.label));
    ranked
}
