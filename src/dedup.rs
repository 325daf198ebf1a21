//! Intra-source near-duplicate collapsing.
//!
//! A headline survives only if its title is at most [`DEDUP_SIMILARITY_THRESHOLD`]
//! similar to every headline kept before it. Input order is the source's own
//! ranking, so the first-seen headline stays as the representative.

use crate::headline::Headline;
use crate::similarity::similarity;

pub const DEDUP_SIMILARITY_THRESHOLD: f64 = 0.5;

/// Greedy O(n²) pass over one source's headlines.
pub fn dedup_similar(items: Vec<Headline>) -> Vec<Headline> {
    dedup_by_title(items, |h| h.title.as_str())
}

/// Same as [`dedup_similar`] for any item exposing a title.
pub fn dedup_by_title<T, F>(items: Vec<T>, title: F) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    items.into_iter().fold(Vec::new(), |mut kept, item| {
        let t = title(&item);
        let is_dup = kept
            .iter()
            .any(|k| similarity(t, title(k)) > DEDUP_SIMILARITY_THRESHOLD);
        if !is_dup {
            kept.push(item);
        }
        kept
    })
}
