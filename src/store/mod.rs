// src/store/mod.rs
//! Persistent store for headlines and confirmed cross-source stories.
//!
//! The matching core only talks to [`HeadlineStore`]. Two backends:
//! - [`MemoryStore`]: in-process, for tests and dry runs.
//! - [`JsonFileStore`]: one JSON document on disk, written atomically.
//!
//! Both enforce the same uniqueness rules: a headline is unique per
//! `(content_hash, source)`, a story per unordered set of headline ids.

pub mod json_file;

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::headline::{
    identity_set, CrossPlatformStory, Headline, HeadlineId, Source, StoredHeadline, StoryId,
};

pub use json_file::JsonFileStore;

/// A confirmed story with its participating headlines.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryDetails {
    pub story: CrossPlatformStory,
    pub headlines: Vec<StoredHeadline>,
}

pub trait HeadlineStore: Send {
    /// Idempotent on `(title, url, source)`: returns the existing id if present.
    fn store_headline(&mut self, headline: &Headline) -> Result<HeadlineId>;

    fn headline_by_id(&self, id: HeadlineId) -> Result<Option<StoredHeadline>>;

    /// Headlines with `timestamp >= now - hours`, optionally for one source,
    /// newest first.
    fn headlines_in_window(
        &self,
        now: DateTime<Utc>,
        hours: u32,
        source: Option<&Source>,
    ) -> Result<Vec<StoredHeadline>>;

    /// Most recently confirmed first.
    fn confirmed_matches(&self, limit: usize) -> Result<Vec<CrossPlatformStory>>;

    /// Existing story for exactly this unordered pair, if any.
    fn find_match(&self, a: HeadlineId, b: HeadlineId) -> Result<Option<StoryId>>;

    /// Idempotent on the unordered `{a, b}` pair. An existing story keeps its
    /// original `matched_at`, title and summary.
    fn store_match(
        &mut self,
        a: HeadlineId,
        b: HeadlineId,
        title: &str,
        summary: Option<&str>,
        matched_at: DateTime<Utc>,
    ) -> Result<StoryId>;

    fn story_details(&self, id: StoryId) -> Result<Option<StoryDetails>>;

    /// Drops headlines older than `days` that no confirmed story refers to.
    /// Returns the number removed.
    fn cleanup_old_headlines(&mut self, now: DateTime<Utc>, days: u32) -> Result<usize>;

    /// Makes all pending writes durable.
    fn flush(&mut self) -> Result<()>;
}

/// Serializable store contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreState {
    #[serde(default)]
    pub headlines: Vec<StoredHeadline>,
    #[serde(default)]
    pub stories: Vec<CrossPlatformStory>,
    #[serde(default)]
    pub next_headline_id: u64,
    #[serde(default)]
    pub next_story_id: u64,
}

impl StoreState {
    /// Ids must stay unique even if the counters were lost or hand-edited.
    fn repair_counters(&mut self) {
        if let Some(max) = self.headlines.iter().map(|h| h.id.0).max() {
            self.next_headline_id = self.next_headline_id.max(max + 1);
        }
        if let Some(max) = self.stories.iter().map(|s| s.id.0).max() {
            self.next_story_id = self.next_story_id.max(max + 1);
        }
    }
}

/// In-memory store. Also the engine behind [`JsonFileStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: StoreState,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::from_state(StoreState::default())
    }

    pub fn from_state(mut state: StoreState) -> Self {
        state.repair_counters();
        Self { state }
    }

    pub fn state(&self) -> &StoreState {
        &self.state
    }

    pub fn headline_count(&self) -> usize {
        self.state.headlines.len()
    }

    pub fn story_count(&self) -> usize {
        self.state.stories.len()
    }

    fn position_of_pair(&self, pair: &[HeadlineId]) -> Option<usize> {
        self.state.stories.iter().position(|s| s.headline_ids == pair)
    }
}

impl HeadlineStore for MemoryStore {
    fn store_headline(&mut self, headline: &Headline) -> Result<HeadlineId> {
        if !headline.is_well_formed() {
            bail!("refusing to store headline with empty title or url");
        }
        let hash = headline.content_hash();
        if let Some(existing) = self
            .state
            .headlines
            .iter()
            .find(|h| h.content_hash == hash && h.headline.source == headline.source)
        {
            return Ok(existing.id);
        }

        let id = HeadlineId(self.state.next_headline_id);
        self.state.next_headline_id += 1;
        self.state.headlines.push(StoredHeadline {
            id,
            content_hash: hash,
            headline: headline.clone(),
        });
        Ok(id)
    }

    fn headline_by_id(&self, id: HeadlineId) -> Result<Option<StoredHeadline>> {
        Ok(self.state.headlines.iter().find(|h| h.id == id).cloned())
    }

    fn headlines_in_window(
        &self,
        now: DateTime<Utc>,
        hours: u32,
        source: Option<&Source>,
    ) -> Result<Vec<StoredHeadline>> {
        let cutoff = now - Duration::hours(i64::from(hours));
        let mut out: Vec<StoredHeadline> = self
            .state
            .headlines
            .iter()
            .filter(|h| h.headline.timestamp >= cutoff)
            .filter(|h| source.map_or(true, |s| &h.headline.source == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.headline
                .timestamp
                .cmp(&a.headline.timestamp)
                .then(b.id.cmp(&a.id))
        });
        Ok(out)
    }

    fn confirmed_matches(&self, limit: usize) -> Result<Vec<CrossPlatformStory>> {
        let mut out = self.state.stories.clone();
        out.sort_by(|a, b| b.matched_at.cmp(&a.matched_at).then(b.id.cmp(&a.id)));
        out.truncate(limit);
        Ok(out)
    }

    fn find_match(&self, a: HeadlineId, b: HeadlineId) -> Result<Option<StoryId>> {
        let pair = identity_set(&[a, b]);
        Ok(self.position_of_pair(&pair).map(|i| self.state.stories[i].id))
    }

    fn store_match(
        &mut self,
        a: HeadlineId,
        b: HeadlineId,
        title: &str,
        summary: Option<&str>,
        matched_at: DateTime<Utc>,
    ) -> Result<StoryId> {
        if a == b {
            bail!("a story needs two distinct headlines, got {a} twice");
        }
        let pair = identity_set(&[a, b]);
        if let Some(i) = self.position_of_pair(&pair) {
            return Ok(self.state.stories[i].id);
        }
        for id in &pair {
            if self.headline_by_id(*id)?.is_none() {
                return Err(anyhow!("unknown headline {id}"));
            }
        }

        let id = StoryId(self.state.next_story_id);
        self.state.next_story_id += 1;
        self.state.stories.push(CrossPlatformStory {
            id,
            headline_ids: pair,
            matched_at,
            title: title.to_string(),
            summary: summary.map(str::to_string),
        });
        Ok(id)
    }

    fn story_details(&self, id: StoryId) -> Result<Option<StoryDetails>> {
        let Some(story) = self.state.stories.iter().find(|s| s.id == id).cloned() else {
            return Ok(None);
        };
        let mut headlines = Vec::with_capacity(story.headline_ids.len());
        for hid in &story.headline_ids {
            if let Some(h) = self.headline_by_id(*hid)? {
                headlines.push(h);
            }
        }
        Ok(Some(StoryDetails { story, headlines }))
    }

    fn cleanup_old_headlines(&mut self, now: DateTime<Utc>, days: u32) -> Result<usize> {
        let cutoff = now - Duration::days(i64::from(days));
        let referenced: HashSet<HeadlineId> = self
            .state
            .stories
            .iter()
            .flat_map(|s| s.headline_ids.iter().copied())
            .collect();
        let before = self.state.headlines.len();
        self.state
            .headlines
            .retain(|h| h.headline.timestamp >= cutoff || referenced.contains(&h.id));
        Ok(before - self.state.headlines.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
