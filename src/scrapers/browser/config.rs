//! Browser engine configuration types.

use std::env;

use serde::{Deserialize, Serialize};

use crate::config::{clamp_timeout, env_bool, env_parse};

/// Browser engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserEngineConfig {
    /// Browser engine type.
    #[serde(default)]
    pub engine: BrowserEngineType,

    /// Run in headless mode (default: true).
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Proxy server URL (e.g., "socks5://127.0.0.1:1080").
    #[serde(default)]
    pub proxy: Option<String>,

    /// Navigation and element wait timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// How long to wait for the page marker before taking the page as-is.
    #[serde(default = "default_marker_grace")]
    pub marker_grace_secs: u64,

    /// Extra time allowed for a bot-challenge interstitial to clear itself.
    #[serde(default = "default_challenge_grace")]
    pub challenge_grace_secs: u64,

    /// Block images, stylesheets, and fonts while rendering.
    #[serde(default = "default_block_resources")]
    pub block_resources: bool,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,

    /// Remote Chrome DevTools URL (e.g., "ws://localhost:9222").
    /// If set, connects to existing browser instead of launching one.
    #[serde(default)]
    pub remote_url: Option<String>,
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            engine: BrowserEngineType::default(),
            headless: default_headless(),
            proxy: None,
            timeout: default_timeout(),
            marker_grace_secs: default_marker_grace(),
            challenge_grace_secs: default_challenge_grace(),
            block_resources: default_block_resources(),
            chrome_args: Vec::new(),
            remote_url: None,
        }
    }
}

impl BrowserEngineConfig {
    /// Apply environment variable overrides (BROWSER_URL, BROWSER_HEADLESS,
    /// MEDIAPULL_BROWSER_TIMEOUT_SECS).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = env::var("BROWSER_URL") {
            if !url.trim().is_empty() {
                self.remote_url = Some(url);
            }
        }
        if let Some(headless) = env_bool("BROWSER_HEADLESS") {
            self.headless = headless;
        }
        if let Some(secs) = env_parse("MEDIAPULL_BROWSER_TIMEOUT_SECS") {
            self.timeout = clamp_timeout(secs);
        }
        if let Ok(engine) = env::var("BROWSER_ENGINE") {
            if engine.eq_ignore_ascii_case("standard") {
                self.engine = BrowserEngineType::Standard;
            }
        }
        self
    }
}

pub fn default_headless() -> bool {
    true
}

pub fn default_timeout() -> u64 {
    30
}

fn default_marker_grace() -> u64 {
    10
}

fn default_challenge_grace() -> u64 {
    15
}

fn default_block_resources() -> bool {
    true
}

/// Browser engine types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BrowserEngineType {
    /// Chromium with stealth patches (default).
    #[default]
    Stealth,

    /// No stealth patches (for debugging).
    Standard,
}
