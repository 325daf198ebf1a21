// src/merge.rs
//! Merge & rank: turns this run's fresh headlines into the display list.
//!
//! - Only fresh headlines are listed; partners may come from the whole
//!   rolling window, so a story confirmed late still shows as merged.
//! - Multi-source lines first, by combined popularity (desc), then earliest
//!   timestamp.
//! - Single-source leftovers are deduplicated per source and interleaved
//!   round-robin across sources, so a prolific source cannot flood the list.

use std::collections::{HashMap, HashSet};

use crate::dedup::dedup_similar;
use crate::headline::{Headline, HeadlineKey, MergedHeadline, Source};
use crate::matcher::within_window;

/// Fresh headlines of one source, in the source's natural order.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBatch {
    pub source: Source,
    pub headlines: Vec<Headline>,
}

impl SourceBatch {
    pub fn new(source: Source, headlines: Vec<Headline>) -> Self {
        Self { source, headlines }
    }
}

/// Builds the ranked list.
///
/// `batches` order is the scan order and the round-robin order. `window`
/// holds every in-window headline (fresh ones included). `same_story`
/// decides equivalence for a fresh/window pair.
pub fn build_ranked<F>(
    batches: &[SourceBatch],
    window: &[Headline],
    pair_window_hours: u32,
    same_story: F,
) -> Vec<MergedHeadline>
where
    F: Fn(&Headline, &Headline) -> bool,
{
    let (groups, attributed) = group_matches(batches, window, pair_window_hours, &same_story);

    let mut multi: Vec<MergedHeadline> = groups
        .into_iter()
        .filter_map(MergedHeadline::group)
        .collect();
    sort_by_combined_popularity(&mut multi);

    let lanes: Vec<Vec<MergedHeadline>> = batches
        .iter()
        .map(|b| {
            let leftovers: Vec<Headline> = b
                .headlines
                .iter()
                .filter(|h| !attributed.contains(&h.key()))
                .cloned()
                .collect();
            dedup_similar(leftovers)
                .into_iter()
                .map(MergedHeadline::single)
                .collect()
        })
        .collect();

    tracing::debug!(
        target: "merge",
        multi = multi.len(),
        lanes = lanes.len(),
        "ranked list assembled"
    );

    multi.into_iter().chain(interleave(lanes)).collect()
}

/// For each fresh headline not yet attributed, pair it with the first
/// unattributed in-window headline of another source. A partner that is also
/// fresh is listed with its fresh copy, not the first-seen stored one.
fn group_matches<F>(
    batches: &[SourceBatch],
    window: &[Headline],
    pair_window_hours: u32,
    same_story: &F,
) -> (Vec<Vec<Headline>>, HashSet<HeadlineKey>)
where
    F: Fn(&Headline, &Headline) -> bool,
{
    let window_keys: Vec<HeadlineKey> = window.iter().map(Headline::key).collect();
    let fresh_by_key: HashMap<HeadlineKey, &Headline> = batches
        .iter()
        .flat_map(|b| b.headlines.iter())
        .map(|h| (h.key(), h))
        .collect();

    batches.iter().flat_map(|b| b.headlines.iter()).fold(
        (Vec::new(), HashSet::new()),
        |(mut groups, mut attributed), fresh| {
            let key = fresh.key();
            if attributed.contains(&key) {
                return (groups, attributed);
            }
            let partner = window.iter().zip(&window_keys).find(|(w, wk)| {
                w.source != fresh.source
                    && !attributed.contains(*wk)
                    && within_window(fresh, w, pair_window_hours)
                    && same_story(fresh, w)
            });
            if let Some((w, wk)) = partner {
                attributed.insert(key);
                attributed.insert(wk.clone());
                let partner = fresh_by_key.get(wk).copied().unwrap_or(w);
                groups.push(vec![fresh.clone(), partner.clone()]);
            }
            (groups, attributed)
        },
    )
}

fn sort_by_combined_popularity(items: &mut [MergedHeadline]) {
    items.sort_by(|a, b| {
        b.popularity
            .cmp(&a.popularity)
            .then(a.timestamp.cmp(&b.timestamp))
    });
}

/// Round-robin: one item from each lane in turn until all are empty.
pub fn interleave<T>(lanes: Vec<Vec<T>>) -> Vec<T> {
    let total = lanes.iter().map(Vec::len).sum();
    let mut iters: Vec<std::vec::IntoIter<T>> = lanes.into_iter().map(Vec::into_iter).collect();
    let mut out = Vec::with_capacity(total);
    while out.len() < total {
        for it in iters.iter_mut() {
            if let Some(x) = it.next() {
                out.push(x);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::is_same_story;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 20, 9, 0, 0).unwrap()
    }

    fn h(source: Source, title: &str, url: &str, pop: i64, hours_ago: i64) -> Headline {
        Headline::new(source, title, url, now() - Duration::hours(hours_ago)).with_popularity(pop)
    }

    #[test]
    fn interleave_cycles_across_lanes() {
        let out = interleave(vec![vec![1, 2, 3], vec![10], vec![20, 21]]);
        assert_eq!(out, vec![1, 10, 20, 2, 21, 3]);
        assert!(interleave::<u8>(vec![]).is_empty());
    }

    #[test]
    fn merged_first_then_round_robin_leftovers() {
        let tm = vec![
            h(Source::Techmeme, "Apple unveils new iPhone", "https://apple.com/iphone", 0, 1),
            h(Source::Techmeme, "Nvidia beats earnings expectations again", "https://tm.test/nv", 1, 1),
            h(Source::Techmeme, "EU fines Meta over pay-or-consent model", "https://tm.test/eu", 2, 1),
        ];
        let hn = vec![
            h(Source::HackerNews, "Apple iPhone announcement today", "https://news.ycombinator.com/item?id=1", 250, 2),
            h(Source::HackerNews, "Show HN: A tiny Lisp in Zig", "https://hn.test/lisp", 90, 2),
        ];
        let window: Vec<Headline> = tm.iter().chain(hn.iter()).cloned().collect();
        let batches = vec![
            SourceBatch::new(Source::Techmeme, tm),
            SourceBatch::new(Source::HackerNews, hn),
        ];

        let out = build_ranked(&batches, &window, 24, is_same_story);
        assert_eq!(out.len(), 4);

        assert!(out[0].in_multiple_sources);
        assert_eq!(out[0].title, "Apple unveils new iPhone");
        assert_eq!(out[0].popularity, 250);
        assert_eq!(out[0].timestamp, now() - Duration::hours(2));
        assert_eq!(out[0].urls[1].source, Source::HackerNews);

        let rest: Vec<&str> = out[1..].iter().map(|m| m.title.as_str()).collect();
        assert_eq!(
            rest,
            vec![
                "Nvidia beats earnings expectations again",
                "Show HN: A tiny Lisp in Zig",
                "EU fines Meta over pay-or-consent model",
            ]
        );
        assert!(out[1..].iter().all(|m| !m.in_multiple_sources));
    }

    #[test]
    fn partner_from_earlier_run_still_merges() {
        let old_hn = h(
            Source::HackerNews,
            "Rust 1.90 released with faster linking",
            "https://blog.rust-lang.org/2025/09/18/Rust-1.90.0",
            300,
            10,
        );
        let fresh_tm = h(
            Source::Techmeme,
            "Rust 1.90 ships with LLD by default",
            "https://blog.rust-lang.org/2025/09/18/Rust-1.90.0",
            0,
            0,
        );
        let batches = vec![
            SourceBatch::new(Source::Techmeme, vec![fresh_tm.clone()]),
            SourceBatch::new(Source::HackerNews, vec![]),
        ];
        let window = vec![fresh_tm, old_hn];
        let out = build_ranked(&batches, &window, 24, is_same_story);
        assert_eq!(out.len(), 1);
        assert!(out[0].in_multiple_sources);
        assert_eq!(out[0].popularity, 300);
    }

    #[test]
    fn fresh_partner_keeps_its_live_score() {
        let stored_hn = h(Source::HackerNews, "Apple iPhone announcement today", "https://hn.test/1", 12, 3);
        let mut live_hn = stored_hn.clone();
        live_hn.popularity = 480;
        live_hn.points = Some(480);
        let tm = h(Source::Techmeme, "Apple unveils new iPhone", "https://a.test/1", 0, 1);
        let batches = vec![
            SourceBatch::new(Source::Techmeme, vec![tm.clone()]),
            SourceBatch::new(Source::HackerNews, vec![live_hn]),
        ];
        let window = vec![tm, stored_hn];
        let out = build_ranked(&batches, &window, 24, is_same_story);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].popularity, 480);
        assert_eq!(
            out[0].from_source(&Source::HackerNews).and_then(|h| h.points),
            Some(480)
        );
    }

    #[test]
    fn partner_is_used_once() {
        let hn = h(Source::HackerNews, "Apple iPhone announcement today", "https://hn.test/1", 100, 1);
        let tm1 = h(Source::Techmeme, "Apple unveils new iPhone", "https://a.test/1", 0, 1);
        let tm2 = h(Source::Techmeme, "Apple iPhone event recap", "https://b.test/2", 1, 1);
        let batches = vec![
            SourceBatch::new(Source::Techmeme, vec![tm1.clone(), tm2.clone()]),
            SourceBatch::new(Source::HackerNews, vec![hn.clone()]),
        ];
        let window = vec![tm1, tm2, hn];
        let out = build_ranked(&batches, &window, 24, is_same_story);
        let multi = out.iter().filter(|m| m.in_multiple_sources).count();
        assert_eq!(multi, 1);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].title, "Apple iPhone event recap");
    }

    #[test]
    fn multi_source_ties_break_on_earliest_timestamp() {
        let a1 = h(Source::Techmeme, "Alpha story one", "https://alpha.test/1", 5, 1);
        let a2 = h(Source::HackerNews, "Alpha story one!", "https://alpha.test/2", 5, 1);
        let b1 = h(Source::Techmeme, "Bravo thing happened", "https://bravo.test/1", 5, 6);
        let b2 = h(Source::HackerNews, "Bravo thing happened!", "https://bravo.test/2", 5, 6);
        let batches = vec![
            SourceBatch::new(Source::Techmeme, vec![a1.clone(), b1.clone()]),
            SourceBatch::new(Source::HackerNews, vec![a2.clone(), b2.clone()]),
        ];
        let window = vec![a1, b1, a2, b2];
        let out = build_ranked(&batches, &window, 24, is_same_story);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].title, "Bravo thing happened");
        assert_eq!(out[1].title, "Alpha story one");
    }

    #[test]
    fn leftovers_are_deduplicated_per_source() {
        let tm = vec![
            h(Source::Techmeme, "OpenAI launches GPT-5 with new reasoning mode", "https://t.test/1", 0, 1),
            h(Source::Techmeme, "OpenAI launches GPT-5, with a new reasoning mode", "https://t.test/2", 1, 1),
            h(Source::Techmeme, "OpenAI launches GPT-5 with its new reasoning mode", "https://t.test/3", 2, 1),
        ];
        let batches = vec![SourceBatch::new(Source::Techmeme, tm.clone())];
        let out = build_ranked(&batches, &tm, 24, is_same_story);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].urls[0].url, "https://t.test/1");
    }
}
