// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod ai;
pub mod config;
pub mod dedup;
pub mod engine;
pub mod headline;
pub mod ingest;
pub mod matcher;
pub mod merge;
pub mod pipeline;
pub mod similarity;
pub mod store;
pub mod summarize;

// ---- Re-exports for stable public API ----
pub use crate::headline::{Headline, MergedHeadline, Source};
pub use crate::pipeline::{run_once, RunContext, RunReport, Settings};
