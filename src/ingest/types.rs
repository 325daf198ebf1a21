// src/ingest/types.rs
use anyhow::Result;

use crate::headline::{Headline, Source};

/// A collector for one news source.
#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    /// Current headlines in the source's natural order.
    async fn fetch_latest(&self) -> Result<Vec<Headline>>;
    fn name(&self) -> &'static str;
    fn source(&self) -> Source;
}
