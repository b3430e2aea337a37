//! Inbound request and retrieval models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which retrieval strategy the caller wants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyHint {
    /// Walk the full strategy chain, escalating on retries.
    #[default]
    Auto,
    Http,
    Bypass,
    Browser,
    /// Skip retrieval and build the download link from the file key.
    Direct,
}

impl StrategyHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Http => "http",
            Self::Bypass => "bypass",
            Self::Browser => "browser",
            Self::Direct => "direct",
        }
    }

    /// Parse a hint, accepting the legacy names used by older clients.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Some(Self::Auto),
            "http" | "axios" => Some(Self::Http),
            "bypass" | "cloudscraper" => Some(Self::Bypass),
            "browser" | "puppeteer" => Some(Self::Browser),
            "direct" => Some(Self::Direct),
            _ => None,
        }
    }
}

/// A single extraction call.
///
/// `attempt` is the retry counter the caller started from; the retry
/// controller counts upward from it without mutating the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    pub source_url: String,
    pub strategy_hint: StrategyHint,
    pub attempt: u32,
    /// Skip the cache read (a success still refreshes the cache).
    pub force: bool,
}

impl ExtractionRequest {
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            strategy_hint: StrategyHint::Auto,
            attempt: 0,
            force: false,
        }
    }

    pub fn with_hint(mut self, hint: StrategyHint) -> Self {
        self.strategy_hint = hint;
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Concrete retrieval strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Http,
    Bypass,
    Browser,
    Repair,
    Direct,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Bypass => "bypass",
            Self::Browser => "browser",
            Self::Repair => "repair",
            Self::Direct => "direct",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTML obtained by one retrieval strategy.
#[derive(Debug, Clone)]
pub struct RetrievedPage {
    pub html: String,
    pub strategy_used: StrategyKind,
    pub fetched_at: DateTime<Utc>,
    /// URL the page was finally served from (after redirects).
    pub final_url: String,
    /// Download target captured directly by the strategy (repair flow).
    pub resolved_url: Option<String>,
}

impl RetrievedPage {
    pub fn new(html: String, strategy_used: StrategyKind, final_url: impl Into<String>) -> Self {
        Self {
            html,
            strategy_used,
            fetched_at: Utc::now(),
            final_url: final_url.into(),
            resolved_url: None,
        }
    }

    pub fn with_resolved_url(mut self, url: String) -> Self {
        self.resolved_url = Some(url);
        self
    }
}
