// src/ingest/providers/mod.rs
pub mod hackernews;
pub mod ninetofive_mac;
pub mod techmeme;

pub use hackernews::HackerNewsProvider;
pub use ninetofive_mac::NineToFiveMacProvider;
pub use techmeme::TechmemeProvider;
