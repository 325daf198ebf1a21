// src/matcher.rs
//! Story matcher: decides whether two headlines describe the same story.
//!
//! The heuristic decision is an ordered short-circuit OR of three signals:
//! 1. same non-empty publisher domain,
//! 2. title similarity above [`TITLE_SIMILARITY_THRESHOLD`],
//! 3. shared significant tokens above [`TOKEN_OVERLAP_THRESHOLD`].
//!
//! [`MatcherStrategy`] selects between the heuristic and a model-backed judge;
//! both answer with a [`MatchDecision`].

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::ai::{sanitize_text, DynChatClient};
use crate::headline::Headline;
use crate::similarity::{extract_domain, shared_token_ratio, similarity};

pub const TITLE_SIMILARITY_THRESHOLD: f64 = 0.45;
pub const TOKEN_OVERLAP_THRESHOLD: f64 = 0.35;
pub const DEFAULT_MODEL_CONFIDENCE: f32 = 0.6;
pub const DEFAULT_MODEL_CANDIDATES_PER_SOURCE: usize = 10;
pub const DEFAULT_MAX_MODEL_CALLS: usize = 50;

/// Which heuristic signal fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSignal {
    Domain,
    TitleSimilarity,
    TokenOverlap,
}

/// First signal that fires, in evaluation order.
pub fn match_signal(h1: &Headline, h2: &Headline) -> Option<MatchSignal> {
    let d1 = extract_domain(&h1.url);
    if !d1.is_empty() && d1 == extract_domain(&h2.url) {
        return Some(MatchSignal::Domain);
    }
    if similarity(&h1.title, &h2.title) > TITLE_SIMILARITY_THRESHOLD {
        return Some(MatchSignal::TitleSimilarity);
    }
    if shared_token_ratio(&h1.title, &h2.title) > TOKEN_OVERLAP_THRESHOLD {
        return Some(MatchSignal::TokenOverlap);
    }
    None
}

pub fn is_same_story(h1: &Headline, h2: &Headline) -> bool {
    match_signal(h1, h2).is_some()
}

/// `|t1 - t2| <= hours`.
pub fn within_window(h1: &Headline, h2: &Headline, hours: u32) -> bool {
    (h1.timestamp - h2.timestamp).abs() <= Duration::hours(i64::from(hours))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchDecision {
    pub is_match: bool,
    /// Confidence in `is_match`, `[0.0, 1.0]`.
    pub confidence: f32,
}

impl MatchDecision {
    pub fn no_match() -> Self {
        Self {
            is_match: false,
            confidence: 0.0,
        }
    }

    /// A pair the store already holds as a story.
    pub fn confirmed() -> Self {
        Self {
            is_match: true,
            confidence: 1.0,
        }
    }
}

/// String/token/domain heuristics. Cheap and deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicMatcher;

impl HeuristicMatcher {
    pub fn decide(&self, h1: &Headline, h2: &Headline) -> MatchDecision {
        match match_signal(h1, h2) {
            Some(MatchSignal::Domain) => MatchDecision {
                is_match: true,
                confidence: 1.0,
            },
            Some(MatchSignal::TitleSimilarity) => MatchDecision {
                is_match: true,
                confidence: similarity(&h1.title, &h2.title) as f32,
            },
            Some(MatchSignal::TokenOverlap) => MatchDecision {
                is_match: true,
                confidence: shared_token_ratio(&h1.title, &h2.title) as f32,
            },
            None => {
                let strongest = similarity(&h1.title, &h2.title)
                    .max(shared_token_ratio(&h1.title, &h2.title));
                MatchDecision {
                    is_match: false,
                    confidence: (1.0 - strongest) as f32,
                }
            }
        }
    }
}

/// Anything that can judge a pair of headlines remotely (e.g. a language model).
#[async_trait]
pub trait StoryJudge: Send + Sync {
    async fn judge(&self, h1: &Headline, h2: &Headline) -> Result<MatchDecision>;
    fn name(&self) -> &'static str;
}

/// Bounds on remote judge work within one matching pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelLimits {
    /// Only the first N window headlines of each source are sent to the judge.
    pub candidates_per_source: usize,
    /// Judge calls allowed per pass.
    pub max_calls: usize,
}

impl Default for ModelLimits {
    fn default() -> Self {
        Self {
            candidates_per_source: DEFAULT_MODEL_CANDIDATES_PER_SOURCE,
            max_calls: DEFAULT_MAX_MODEL_CALLS,
        }
    }
}

/// Model-backed matcher. A pair counts only when the judge says yes with
/// at least `min_confidence`; judge errors count as "no".
#[derive(Clone)]
pub struct ModelMatcher {
    judge: Arc<dyn StoryJudge>,
    min_confidence: f32,
    limits: ModelLimits,
}

impl ModelMatcher {
    pub fn new(judge: Arc<dyn StoryJudge>, min_confidence: f32) -> Self {
        Self {
            judge,
            min_confidence: min_confidence.clamp(0.0, 1.0),
            limits: ModelLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: ModelLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> ModelLimits {
        self.limits
    }

    pub async fn decide(&self, h1: &Headline, h2: &Headline) -> MatchDecision {
        match self.judge.judge(h1, h2).await {
            Ok(d) => MatchDecision {
                is_match: d.is_match && d.confidence >= self.min_confidence,
                confidence: d.confidence,
            },
            Err(e) => {
                tracing::warn!(target: "engine", error = ?e, judge = self.judge.name(), "model judge failed");
                MatchDecision::no_match()
            }
        }
    }
}

impl std::fmt::Debug for ModelMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelMatcher")
            .field("judge", &self.judge.name())
            .field("min_confidence", &self.min_confidence)
            .field("limits", &self.limits)
            .finish()
    }
}

/// Matcher selected by configuration.
#[derive(Debug, Clone)]
pub enum MatcherStrategy {
    Heuristic(HeuristicMatcher),
    Model(ModelMatcher),
}

impl Default for MatcherStrategy {
    fn default() -> Self {
        MatcherStrategy::Heuristic(HeuristicMatcher)
    }
}

impl MatcherStrategy {
    pub async fn decide(&self, h1: &Headline, h2: &Headline) -> MatchDecision {
        match self {
            MatcherStrategy::Heuristic(m) => m.decide(h1, h2),
            MatcherStrategy::Model(m) => m.decide(h1, h2).await,
        }
    }

    /// Call bounds, when deciding costs a remote call.
    pub fn limits(&self) -> Option<ModelLimits> {
        match self {
            MatcherStrategy::Heuristic(_) => None,
            MatcherStrategy::Model(m) => Some(m.limits()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MatcherStrategy::Heuristic(_) => "heuristic",
            MatcherStrategy::Model(_) => "model",
        }
    }
}

// ------------------------------------------------------------
// Chat-model judge
// ------------------------------------------------------------

const JUDGE_SYSTEM_PROMPT: &str = "You are an expert at analyzing news headlines to determine if they refer to the same underlying story or event. Look beyond exact wording and focus on the companies, people, products or events mentioned. Different sources frame the same story differently. Be generous: the same announcement, launch or event is a match even if the angle differs.";

/// Asks a chat model for a JSON verdict.
pub struct ChatJudge {
    client: DynChatClient,
}

impl ChatJudge {
    pub fn new(client: DynChatClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StoryJudge for ChatJudge {
    async fn judge(&self, h1: &Headline, h2: &Headline) -> Result<MatchDecision> {
        let prompt = format!(
            "Are these two headlines about the same story?\n\n\
             Headline 1: \"{}\"\nSource 1: {}\n\n\
             Headline 2: \"{}\"\nSource 2: {}\n\n\
             Respond with a JSON object in this exact format:\n\
             {{\"isSameStory\": true or false, \"confidence\": a number between 0 and 1, \"reasoning\": \"brief explanation\"}}",
            sanitize_text(&h1.title, 300),
            h1.source.display_name(),
            sanitize_text(&h2.title, 300),
            h2.source.display_name(),
        );
        let text = self.client.complete(JUDGE_SYSTEM_PROMPT, &prompt).await?;
        Ok(parse_verdict(&text))
    }

    fn name(&self) -> &'static str {
        "chat"
    }
}

#[derive(Debug, Deserialize)]
struct Verdict {
    #[serde(rename = "isSameStory", default)]
    is_same_story: bool,
    #[serde(default)]
    confidence: f32,
}

/// JSON object anywhere in the reply; otherwise a yes/no scan at 0.7.
pub(crate) fn parse_verdict(text: &str) -> MatchDecision {
    static RE_OBJ: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("verdict regex"));

    let text = text.trim();
    if let Some(m) = RE_OBJ.find(text) {
        if let Ok(v) = serde_json::from_str::<Verdict>(m.as_str()) {
            return MatchDecision {
                is_match: v.is_same_story,
                confidence: v.confidence.clamp(0.0, 1.0),
            };
        }
    }

    let lower = text.to_ascii_lowercase();
    MatchDecision {
        is_match: lower.contains("yes") || lower.contains("true"),
        confidence: 0.7,
    }
}
