/// Anything carrying a confidence score that results are ranked by.
pub trait Scored {
    fn score(&self) -> f64;
}

/// Sorts by score descending, then keeps the first `max` items.
///
/// The sort is stable: equal scores keep their input order. `max == 0`
/// means no limit.
pub fn rank_and_truncate<T: Scored>(items: &mut Vec<T>, max: usize) {
    items.sort_by(|a, b| b.score().total_cmp(&a.score()));
    if max != 0 && items.len() > max {
        items.truncate(max);
    }
}
