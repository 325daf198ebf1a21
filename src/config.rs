// src/config.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::headline::Source;
use crate::matcher::{
    ModelLimits, DEFAULT_MAX_MODEL_CALLS, DEFAULT_MODEL_CANDIDATES_PER_SOURCE, DEFAULT_MODEL_CONFIDENCE,
};

pub const ENV_CONFIG_PATH: &str = "MERGELINES_CONFIG";
pub const ENV_STORE_PATH: &str = "MERGELINES_STORE_PATH";
pub const ENV_MATCH_WINDOW_HOURS: &str = "MERGELINES_MATCH_WINDOW_HOURS";

pub const DEFAULT_STORE_PATH: &str = "mergelines.json";
pub const DEFAULT_MATCH_WINDOW_HOURS: u32 = 12;
pub const DEFAULT_PAIR_WINDOW_HOURS: u32 = 24;
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

fn default_store_path() -> PathBuf {
    PathBuf::from(DEFAULT_STORE_PATH)
}
fn default_match_window_hours() -> u32 {
    DEFAULT_MATCH_WINDOW_HOURS
}
fn default_pair_window_hours() -> u32 {
    DEFAULT_PAIR_WINDOW_HOURS
}
fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}
fn default_sources() -> Vec<Source> {
    vec![Source::Techmeme, Source::HackerNews]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
    /// Rolling window (hours) of stored headlines considered for matching.
    #[serde(default = "default_match_window_hours")]
    pub match_window_hours: u32,
    /// Max distance (hours) between two headlines' timestamps.
    #[serde(default = "default_pair_window_hours")]
    pub pair_window_hours: u32,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Enabled sources; order is scan order and round-robin order.
    #[serde(default = "default_sources")]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub ai: AiConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            match_window_hours: DEFAULT_MATCH_WINDOW_HOURS,
            pair_window_hours: DEFAULT_PAIR_WINDOW_HOURS,
            retention_days: DEFAULT_RETENTION_DAYS,
            sources: default_sources(),
            matcher: MatcherConfig::default(),
            ai: AiConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatcherKind {
    #[default]
    Heuristic,
    Model,
}

fn default_confidence() -> f32 {
    DEFAULT_MODEL_CONFIDENCE
}
fn default_candidates_per_source() -> usize {
    DEFAULT_MODEL_CANDIDATES_PER_SOURCE
}
fn default_max_model_calls() -> usize {
    DEFAULT_MAX_MODEL_CALLS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    #[serde(default)]
    pub strategy: MatcherKind,
    /// Minimum model confidence for a match (model strategy only).
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,
    /// Newest headlines per source the model may see (model strategy only).
    #[serde(default = "default_candidates_per_source")]
    pub model_candidates_per_source: usize,
    /// Model calls allowed per run (model strategy only).
    #[serde(default = "default_max_model_calls")]
    pub max_model_calls: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            strategy: MatcherKind::Heuristic,
            confidence_threshold: DEFAULT_MODEL_CONFIDENCE,
            model_candidates_per_source: DEFAULT_MODEL_CANDIDATES_PER_SOURCE,
            max_model_calls: DEFAULT_MAX_MODEL_CALLS,
        }
    }
}

impl MatcherConfig {
    pub fn model_limits(&self) -> ModelLimits {
        ModelLimits {
            candidates_per_source: self.model_candidates_per_source,
            max_calls: self.max_model_calls,
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// "ENV" means: read from OPENAI_API_KEY.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            model: default_model(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = parse_config(&content, &ext)?;
        cfg.finish()
    }

    /// Load using env var + fallbacks:
    /// 1) $MERGELINES_CONFIG
    /// 2) config/mergelines.toml
    /// 3) config/mergelines.json
    /// 4) defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        let toml_p = PathBuf::from("config/mergelines.toml");
        if toml_p.exists() {
            return Self::load_from(&toml_p);
        }
        let json_p = PathBuf::from("config/mergelines.json");
        if json_p.exists() {
            return Self::load_from(&json_p);
        }
        AppConfig::default().finish()
    }

    /// Env overrides, sanity clamps and key resolution.
    fn finish(mut self) -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_STORE_PATH) {
            if !p.trim().is_empty() {
                self.store_path = PathBuf::from(p.trim());
            }
        }
        if let Ok(h) = std::env::var(ENV_MATCH_WINDOW_HOURS) {
            self.match_window_hours = h
                .trim()
                .parse()
                .with_context(|| format!("{ENV_MATCH_WINDOW_HOURS} must be a whole number of hours"))?;
        }

        self.match_window_hours = self.match_window_hours.max(1);
        self.pair_window_hours = self.pair_window_hours.max(1);
        self.retention_days = self.retention_days.max(1);
        self.matcher.confidence_threshold = self.matcher.confidence_threshold.clamp(0.0, 1.0);

        let mut seen = Vec::with_capacity(self.sources.len());
        for s in self.sources.drain(..) {
            if !seen.contains(&s) {
                seen.push(s);
            }
        }
        self.sources = seen;
        if self.sources.is_empty() {
            self.sources = default_sources();
        }

        self.ai.provider = self.ai.provider.trim().to_ascii_lowercase();
        if self.ai.api_key.trim().eq_ignore_ascii_case("env") {
            self.ai.api_key = match self.ai.provider.as_str() {
                "openai" => std::env::var("OPENAI_API_KEY").unwrap_or_default(),
                other => bail!("unsupported ai provider in config: {other}"),
            };
        }
        Ok(self)
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<AppConfig> {
    if hint_ext == "json" {
        return serde_json::from_str(s).context("parsing json config");
    }
    if hint_ext == "toml" {
        return toml::from_str(s).context("parsing toml config");
    }
    // Unknown extension: JSON first (cheap to reject), then TOML.
    if let Ok(cfg) = serde_json::from_str(s) {
        return Ok(cfg);
    }
    toml::from_str(s).context("unsupported config format")
}
