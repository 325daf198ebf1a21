// src/store/json_file.rs
//! File-backed store: a single JSON document, replaced atomically on flush
//! (temp file + rename).
//!
//! Confirmed matches are written through immediately; headline inserts are
//! batched and flushed on [`JsonFileStore::close`] or when the handle drops.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{HeadlineStore, MemoryStore, StoreState, StoryDetails};
use crate::headline::{CrossPlatformStory, Headline, HeadlineId, Source, StoredHeadline, StoryId};

pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
    dirty: bool,
}

impl JsonFileStore {
    /// Opens `path`, starting empty if the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("reading store from {}", path.display()))?;
            if content.trim().is_empty() {
                StoreState::default()
            } else {
                serde_json::from_str(&content)
                    .with_context(|| format!("parsing store {}", path.display()))?
            }
        } else {
            StoreState::default()
        };

        tracing::debug!(
            target: "store",
            path = %path.display(),
            headlines = state.headlines.len(),
            stories = state.stories.len(),
            "store opened"
        );

        Ok(Self {
            path,
            inner: MemoryStore::from_state(state),
            dirty: false,
        })
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.inner
    }

    /// Flushes and releases the handle, surfacing any write error.
    pub fn close(mut self) -> Result<()> {
        self.flush()
    }

    fn write_atomically(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("creating store dir {}", dir.display()))?;
            }
        }
        let json = serde_json::to_vec_pretty(self.inner.state()).context("serializing store")?;
        let tmp = self.path.with_extension("json.tmp");
        let mut f = fs::File::create(&tmp)
            .with_context(|| format!("creating temp store file {}", tmp.display()))?;
        f.write_all(&json)
            .with_context(|| format!("writing temp store file {}", tmp.display()))?;
        f.sync_all().context("syncing temp store file")?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing store file {}", self.path.display()))?;
        Ok(())
    }
}

impl HeadlineStore for JsonFileStore {
    fn store_headline(&mut self, headline: &Headline) -> Result<HeadlineId> {
        let before = self.inner.headline_count();
        let id = self.inner.store_headline(headline)?;
        if self.inner.headline_count() != before {
            self.dirty = true;
        }
        Ok(id)
    }

    fn headline_by_id(&self, id: HeadlineId) -> Result<Option<StoredHeadline>> {
        self.inner.headline_by_id(id)
    }

    fn headlines_in_window(
        &self,
        now: DateTime<Utc>,
        hours: u32,
        source: Option<&Source>,
    ) -> Result<Vec<StoredHeadline>> {
        self.inner.headlines_in_window(now, hours, source)
    }

    fn confirmed_matches(&self, limit: usize) -> Result<Vec<CrossPlatformStory>> {
        self.inner.confirmed_matches(limit)
    }

    fn find_match(&self, a: HeadlineId, b: HeadlineId) -> Result<Option<StoryId>> {
        self.inner.find_match(a, b)
    }

    fn store_match(
        &mut self,
        a: HeadlineId,
        b: HeadlineId,
        title: &str,
        summary: Option<&str>,
        matched_at: DateTime<Utc>,
    ) -> Result<StoryId> {
        let before = self.inner.story_count();
        let id = self.inner.store_match(a, b, title, summary, matched_at)?;
        if self.inner.story_count() != before {
            self.dirty = true;
            self.flush()?;
        }
        Ok(id)
    }

    fn story_details(&self, id: StoryId) -> Result<Option<StoryDetails>> {
        self.inner.story_details(id)
    }

    fn cleanup_old_headlines(&mut self, now: DateTime<Utc>, days: u32) -> Result<usize> {
        let removed = self.inner.cleanup_old_headlines(now, days)?;
        if removed > 0 {
            self.dirty = true;
        }
        Ok(removed)
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.write_atomically()?;
        self.dirty = false;
        Ok(())
    }
}

impl Drop for JsonFileStore {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::error!(target: "store", error = ?e, path = %self.path.display(), "store flush on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn missing_file_opens_empty_and_close_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let mut s = JsonFileStore::open(&path).unwrap();
        let id = s
            .store_headline(&Headline::new(Source::Techmeme, "A", "https://a.test", now()))
            .unwrap();
        // headline inserts are batched
        assert!(!path.exists());
        s.close().unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        let h = reopened.headline_by_id(id).unwrap().unwrap();
        assert_eq!(h.headline.title, "A");
        assert_eq!(h.headline.source, Source::Techmeme);
    }

    #[test]
    fn matches_are_written_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let mut s = JsonFileStore::open(&path).unwrap();
        let a = s
            .store_headline(&Headline::new(Source::Techmeme, "A", "https://a.test", now()))
            .unwrap();
        let b = s
            .store_headline(&Headline::new(Source::HackerNews, "B", "https://b.test", now()))
            .unwrap();
        s.store_match(a, b, "A", Some("sum"), now()).unwrap();

        // readable before close
        let peek: StoreState = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(peek.stories.len(), 1);
        assert_eq!(peek.headlines.len(), 2);
        drop(s);
    }

    #[test]
    fn drop_flushes_pending_headlines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        {
            let mut s = JsonFileStore::open(&path).unwrap();
            s.store_headline(&Headline::new(Source::Techmeme, "A", "https://a.test", now()))
                .unwrap();
        }
        let s = JsonFileStore::open(&path).unwrap();
        assert_eq!(s.memory().headline_count(), 1);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(JsonFileStore::open(&path).is_err());
    }
}
