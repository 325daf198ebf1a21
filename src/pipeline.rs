// src/pipeline.rs
//! One aggregation run: store fresh headlines, match across the rolling
//! window, build the ranked list.
//!
//! The pass is strictly sequential: every collector has finished before
//! [`run_once`] is called, and the store is only touched from here.

use std::collections::HashSet;

use anyhow::Result;
use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use tracing::{info, warn};

use crate::ai::DynChatClient;
use crate::config::{AppConfig, MatcherKind};
use crate::engine::MatchEngine;
use crate::headline::{Headline, HeadlineId, HeadlineKey, MergedHeadline, Source, StoredHeadline};
use crate::matcher::{is_same_story, ChatJudge, HeuristicMatcher, MatcherStrategy, ModelMatcher};
use crate::merge::{build_ranked, SourceBatch};
use crate::store::HeadlineStore;
use crate::summarize::{ChatSummarizer, Summarizer, TitleOnlySummarizer};

/// Knobs of a run, resolved from [`AppConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub match_window_hours: u32,
    pub pair_window_hours: u32,
    /// Scan order and round-robin order.
    pub sources: Vec<Source>,
}

impl Settings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            match_window_hours: cfg.match_window_hours,
            pair_window_hours: cfg.pair_window_hours,
            sources: cfg.sources.clone(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Borrowed collaborators of a run.
pub struct RunContext<'a> {
    pub store: &'a mut dyn HeadlineStore,
    pub matcher: &'a MatcherStrategy,
    pub summarizer: &'a dyn Summarizer,
    pub settings: &'a Settings,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Well-formed headlines accepted per source, in scan order.
    pub stored: Vec<(Source, usize)>,
    pub new_matches: usize,
    pub pairs_compared: usize,
    pub merged: Vec<MergedHeadline>,
}

impl RunReport {
    pub fn stored_for(&self, source: &Source) -> usize {
        self.stored
            .iter()
            .find(|(s, _)| s == source)
            .map_or(0, |(_, n)| *n)
    }
}

/// Runs one pass. Store failures abort the run and are returned; every other
/// degradation is logged and absorbed.
pub async fn run_once(
    ctx: &mut RunContext<'_>,
    fresh_by_source: Vec<SourceBatch>,
    now: DateTime<Utc>,
) -> Result<RunReport> {
    let batches = order_batches(&ctx.settings.sources, fresh_by_source);

    let mut report = RunReport::default();
    let mut kept_batches = Vec::with_capacity(batches.len());
    for batch in batches {
        let (kept, dropped): (Vec<Headline>, Vec<Headline>) =
            batch.headlines.into_iter().partition(Headline::is_well_formed);
        if !dropped.is_empty() {
            warn!(target: "ingest", source = %batch.source, dropped = dropped.len(), "dropping malformed headlines");
            counter!("ingest_dropped_total").increment(dropped.len() as u64);
        }
        for h in &kept {
            ctx.store.store_headline(h)?;
        }
        report.stored.push((batch.source.clone(), kept.len()));
        kept_batches.push(SourceBatch::new(batch.source, kept));
    }

    let mut window: Vec<StoredHeadline> = Vec::new();
    for batch in &kept_batches {
        window.extend(ctx.store.headlines_in_window(
            now,
            ctx.settings.match_window_hours,
            Some(&batch.source),
        )?);
    }

    let engine = MatchEngine::new(ctx.matcher, ctx.summarizer, ctx.settings.pair_window_hours);
    let pass = engine.run(&mut *ctx.store, &window, now).await?;
    report.new_matches = pass.new_matches();
    report.pairs_compared = pass.pairs_compared;

    let linked = linked_keys(&window, &pass.linked);
    let window_headlines: Vec<Headline> = window.into_iter().map(|s| s.headline).collect();
    report.merged = build_ranked(
        &kept_batches,
        &window_headlines,
        ctx.settings.pair_window_hours,
        |a, b| is_same_story(a, b) || linked.contains(&(a.key(), b.key())),
    );

    gauge!("pipeline_last_run_ts").set(now.timestamp() as f64);
    info!(
        target: "engine",
        matcher = ctx.matcher.name(),
        window = window_headlines.len(),
        compared = report.pairs_compared,
        new_matches = report.new_matches,
        listed = report.merged.len(),
        "run complete"
    );

    Ok(report)
}

/// Configured sources first, in configured order, then any others seen in
/// this run, in arrival order. Batches of the same source are concatenated.
fn order_batches(configured: &[Source], fresh: Vec<SourceBatch>) -> Vec<SourceBatch> {
    let mut ordered: Vec<SourceBatch> = configured
        .iter()
        .map(|s| SourceBatch::new(s.clone(), Vec::new()))
        .collect();
    for batch in fresh {
        match ordered.iter_mut().find(|b| b.source == batch.source) {
            Some(slot) => slot.headlines.extend(batch.headlines),
            None => ordered.push(batch),
        }
    }
    ordered
}

/// Engine-confirmed pairs as content keys, both orientations.
fn linked_keys(
    window: &[StoredHeadline],
    linked: &[(HeadlineId, HeadlineId)],
) -> HashSet<(HeadlineKey, HeadlineKey)> {
    let key_of = |id: HeadlineId| {
        window.iter().find(|s| s.id == id).map(|s| HeadlineKey {
            source: s.headline.source.clone(),
            hash: s.content_hash.clone(),
        })
    };
    linked
        .iter()
        .filter_map(|(a, b)| Some((key_of(*a)?, key_of(*b)?)))
        .flat_map(|(a, b)| [(a.clone(), b.clone()), (b, a)])
        .collect()
}

/// Picks the matcher strategy. The model strategy needs a working chat
/// client; without one the heuristic matcher is used instead.
pub fn build_matcher(cfg: &AppConfig, client: &DynChatClient) -> MatcherStrategy {
    match cfg.matcher.strategy {
        MatcherKind::Heuristic => MatcherStrategy::Heuristic(HeuristicMatcher),
        MatcherKind::Model if client.provider_name() == "disabled" => {
            warn!(target: "engine", "model matcher requested but ai is disabled; using heuristic matcher");
            MatcherStrategy::Heuristic(HeuristicMatcher)
        }
        MatcherKind::Model => MatcherStrategy::Model(
            ModelMatcher::new(
                std::sync::Arc::new(ChatJudge::new(client.clone())),
                cfg.matcher.confidence_threshold,
            )
            .with_limits(cfg.matcher.model_limits()),
        ),
    }
}

pub fn build_summarizer(client: &DynChatClient) -> Box<dyn Summarizer> {
    if client.provider_name() == "disabled" {
        Box::new(TitleOnlySummarizer)
    } else {
        Box::new(ChatSummarizer::new(client.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{DisabledChat, MockChat};
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 15, 0, 0).unwrap()
    }

    #[test]
    fn batches_follow_configured_order_then_extras() {
        let h = |s: Source| Headline::new(s, "t", "https://x.test", now());
        let fresh = vec![
            SourceBatch::new(Source::NineToFiveMac, vec![h(Source::NineToFiveMac)]),
            SourceBatch::new(Source::HackerNews, vec![h(Source::HackerNews)]),
            SourceBatch::new(Source::Techmeme, vec![h(Source::Techmeme)]),
        ];
        let out = order_batches(&[Source::Techmeme, Source::HackerNews], fresh);
        let order: Vec<&Source> = out.iter().map(|b| &b.source).collect();
        assert_eq!(
            order,
            vec![&Source::Techmeme, &Source::HackerNews, &Source::NineToFiveMac]
        );
    }

    #[tokio::test]
    async fn malformed_headlines_are_dropped_not_stored() {
        let mut store = MemoryStore::new();
        let matcher = MatcherStrategy::default();
        let settings = Settings::default();
        let mut ctx = RunContext {
            store: &mut store,
            matcher: &matcher,
            summarizer: &TitleOnlySummarizer,
            settings: &settings,
        };
        let fresh = vec![SourceBatch::new(
            Source::Techmeme,
            vec![
                Headline::new(Source::Techmeme, "", "https://x.test/1", now()),
                Headline::new(Source::Techmeme, "Kept headline here", "https://x.test/2", now()),
                Headline::new(Source::Techmeme, "No url", " ", now()),
            ],
        )];
        let report = run_once(&mut ctx, fresh, now()).await.unwrap();
        assert_eq!(report.stored_for(&Source::Techmeme), 1);
        assert_eq!(report.merged.len(), 1);
        assert_eq!(store.headline_count(), 1);
    }

    #[tokio::test]
    async fn model_confirmed_pair_is_listed_as_merged() {
        struct AlwaysSame;
        #[async_trait::async_trait]
        impl crate::matcher::StoryJudge for AlwaysSame {
            async fn judge(&self, _a: &Headline, _b: &Headline) -> Result<crate::matcher::MatchDecision> {
                Ok(crate::matcher::MatchDecision {
                    is_match: true,
                    confidence: 0.9,
                })
            }
            fn name(&self) -> &'static str {
                "always"
            }
        }

        let mut store = MemoryStore::new();
        let matcher = MatcherStrategy::Model(ModelMatcher::new(Arc::new(AlwaysSame), 0.6));
        let settings = Settings::default();
        let mut ctx = RunContext {
            store: &mut store,
            matcher: &matcher,
            summarizer: &TitleOnlySummarizer,
            settings: &settings,
        };
        let fresh = vec![
            SourceBatch::new(
                Source::Techmeme,
                vec![Headline::new(Source::Techmeme, "Chipmaker posts record quarter", "https://a.test/x", now())],
            ),
            SourceBatch::new(
                Source::HackerNews,
                vec![Headline::new(Source::HackerNews, "Why fabs are hard", "https://b.test/y", now() - Duration::hours(1))
                    .with_popularity(40)],
            ),
        ];
        let report = run_once(&mut ctx, fresh, now()).await.unwrap();
        assert_eq!(report.new_matches, 1);
        assert_eq!(report.merged.len(), 1);
        assert!(report.merged[0].in_multiple_sources);
        assert_eq!(report.merged[0].title, "Chipmaker posts record quarter");
    }

    #[test]
    fn model_strategy_needs_enabled_ai() {
        let mut cfg = AppConfig::default();
        cfg.matcher.strategy = MatcherKind::Model;

        let disabled: DynChatClient = Arc::new(DisabledChat);
        assert_eq!(build_matcher(&cfg, &disabled).name(), "heuristic");

        let mock: DynChatClient = Arc::new(MockChat {
            fixed: "{}".into(),
        });
        cfg.matcher.max_model_calls = 7;
        let matcher = build_matcher(&cfg, &mock);
        assert_eq!(matcher.name(), "model");
        assert_eq!(matcher.limits().map(|l| l.max_calls), Some(7));
    }
}
