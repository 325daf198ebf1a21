//! # Cross-Source Match Engine
//! Finds pairs of headlines from different sources that describe the same
//! story and persists each new pair exactly once.
//!
//! Policy: greedy single pass in input order. Once a headline is paired
//! (newly, or with an already confirmed partner) it takes no further part in
//! the pass, so a run produces pairs only, never triples.
//!
//! "Already matched" is always re-derived from the store, never carried in
//! memory across runs; that is what makes a second run over the same data
//! produce zero new stories. Stored pairs are settled before the matcher is
//! asked, so a confirmed pair never costs another model call.
//!
//! Under a model matcher only the first `candidates_per_source` window
//! headlines of each source are judged, and judging stops once the pass has
//! used `max_calls`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::{debug, info};

use crate::headline::{HeadlineId, Source, StoredHeadline, StoryId};
use crate::matcher::{within_window, MatchDecision, MatcherStrategy};
use crate::store::HeadlineStore;
use crate::summarize::{summarize_or_fallback, Summarizer};

/// Index pair into the windowed union, `left < right`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidatePair {
    pub left: usize,
    pub right: usize,
    pub confidence: f32,
}

/// Outcome of one matching pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchPass {
    /// Stories created during this pass.
    pub new_stories: Vec<StoryId>,
    /// Every pair the pass settled on, new or previously confirmed.
    pub linked: Vec<(HeadlineId, HeadlineId)>,
    pub pairs_compared: usize,
}

impl MatchPass {
    pub fn new_matches(&self) -> usize {
        self.new_stories.len()
    }
}

/// Greedy first-match-wins pairing over different-source pairs.
///
/// Returns the chosen pairs and the number of matcher calls made.
pub async fn pair_headlines(
    window: &[StoredHeadline],
    matcher: &MatcherStrategy,
    store: &dyn HeadlineStore,
    pair_window_hours: u32,
) -> Result<(Vec<CandidatePair>, usize)> {
    let limits = matcher.limits();
    let judgeable = candidate_mask(window, limits.map(|l| l.candidates_per_source));
    let budget = limits.map_or(usize::MAX, |l| l.max_calls);

    let mut consumed = vec![false; window.len()];
    let mut pairs = Vec::new();
    let mut compared = 0usize;

    for i in 0..window.len() {
        if consumed[i] {
            continue;
        }
        let left = &window[i].headline;
        for j in (i + 1)..window.len() {
            if consumed[j] {
                continue;
            }
            let right = &window[j].headline;
            if left.source == right.source || !within_window(left, right, pair_window_hours) {
                continue;
            }
            let decision = if store.find_match(window[i].id, window[j].id)?.is_some() {
                MatchDecision::confirmed()
            } else if !(judgeable[i] && judgeable[j]) || compared >= budget {
                continue;
            } else {
                compared += 1;
                matcher.decide(left, right).await
            };
            if decision.is_match {
                consumed[i] = true;
                consumed[j] = true;
                pairs.push(CandidatePair {
                    left: i,
                    right: j,
                    confidence: decision.confidence,
                });
                break;
            }
        }
    }

    if limits.is_some_and(|l| compared >= l.max_calls) {
        debug!(target: "engine", calls = compared, "model call budget exhausted");
    }
    Ok((pairs, compared))
}

/// `true` for the first `per_source` entries of each source, in window order.
fn candidate_mask(window: &[StoredHeadline], per_source: Option<usize>) -> Vec<bool> {
    let Some(cap) = per_source else {
        return vec![true; window.len()];
    };
    let mut seen: Vec<(&Source, usize)> = Vec::new();
    window
        .iter()
        .map(|s| match seen.iter_mut().find(|(src, _)| **src == s.headline.source) {
            Some((_, n)) => {
                *n += 1;
                *n <= cap
            }
            None => {
                seen.push((&s.headline.source, 1));
                cap >= 1
            }
        })
        .collect()
}

/// Runs the engine against the store. Summaries come from `summarizer`,
/// falling back to the left headline's title.
pub struct MatchEngine<'a> {
    pub matcher: &'a MatcherStrategy,
    pub summarizer: &'a dyn Summarizer,
    pub pair_window_hours: u32,
}

impl<'a> MatchEngine<'a> {
    pub fn new(
        matcher: &'a MatcherStrategy,
        summarizer: &'a dyn Summarizer,
        pair_window_hours: u32,
    ) -> Self {
        Self {
            matcher,
            summarizer,
            pair_window_hours,
        }
    }

    /// `window` is the union of in-window headlines of all sources, in scan
    /// order. Store errors abort the pass; stories written before the error
    /// stay written and are recognised on the next run.
    pub async fn run(
        &self,
        store: &mut dyn HeadlineStore,
        window: &[StoredHeadline],
        now: DateTime<Utc>,
    ) -> Result<MatchPass> {
        let (pairs, compared) =
            pair_headlines(window, self.matcher, &*store, self.pair_window_hours).await?;
        counter!("engine_pairs_compared_total").increment(compared as u64);

        let mut pass = MatchPass {
            pairs_compared: compared,
            ..MatchPass::default()
        };

        for p in pairs {
            let left = &window[p.left];
            let right = &window[p.right];
            pass.linked.push((left.id, right.id));

            if let Some(existing) = store.find_match(left.id, right.id)? {
                debug!(target: "engine", story = %existing, left = %left.id, right = %right.id, "already matched");
                continue;
            }

            let summary =
                summarize_or_fallback(self.summarizer, &left.headline.title, &right.headline.title)
                    .await;
            let story = store.store_match(
                left.id,
                right.id,
                &left.headline.title,
                Some(&summary),
                now,
            )?;
            counter!("engine_new_matches_total").increment(1);
            info!(
                target: "engine",
                story = %story,
                left_source = %left.headline.source,
                right_source = %right.headline.source,
                confidence = p.confidence,
                title = %truncate_chars(&left.headline.title, 60),
                "new cross-source match"
            );
            pass.new_stories.push(story);
        }

        Ok(pass)
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max).collect();
        out.push('…');
        out
    }
}
