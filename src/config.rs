//! Runtime settings for mediapull.
//!
//! There is no config file: defaults are compiled in and every value can be
//! overridden from the environment (a `.env` file is loaded by the binary).

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::scrapers::BrowserEngineConfig;

/// Default bind address for the HTTP API.
pub const DEFAULT_BIND: &str = "127.0.0.1:3030";

/// Cached extractions live this long.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Timeouts on network and browser waits are kept inside this range.
pub const MIN_TIMEOUT_SECS: u64 = 10;
pub const MAX_TIMEOUT_SECS: u64 = 45;

/// Clamp a timeout into the supported range.
pub fn clamp_timeout(secs: u64) -> u64 {
    secs.clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS)
}

/// What to do with a download URL that fails the reachability probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyPolicy {
    /// Do not probe.
    #[default]
    Off,
    /// Probe and report the outcome in `verified`, keeping the URL either way.
    Flag,
    /// Probe; on failure try the synthetic link before returning the
    /// original URL flagged as unverified.
    Synthesize,
    /// Probe; on failure treat the attempt as failed so it is retried.
    Discard,
}

impl VerifyPolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" | "false" | "0" => Some(Self::Off),
            "flag" | "true" | "1" => Some(Self::Flag),
            "synthesize" | "synthetic" => Some(Self::Synthesize),
            "discard" | "retry" => Some(Self::Discard),
            _ => None,
        }
    }
}

/// Where the file-locker lives and what its page URLs look like.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileLockerSite {
    /// Registrable hosts, e.g. `mediafire.com`.
    pub hosts: Vec<String>,
    /// At least one of these must appear in the path.
    pub path_markers: Vec<String>,
}

impl Default for FileLockerSite {
    fn default() -> Self {
        Self {
            hosts: vec!["mediafire.com".to_string()],
            path_markers: vec![
                "/file/".to_string(),
                "/download/".to_string(),
                "/view/".to_string(),
                "/?".to_string(),
            ],
        }
    }
}

impl FileLockerSite {
    /// Site whose only host is `host`, with the stock path markers.
    pub fn for_host(host: &str) -> Self {
        Self {
            hosts: vec![host.to_string()],
            ..Self::default()
        }
    }

    /// Host used when guessing a numbered download mirror.
    pub fn primary_host(&self) -> &str {
        self.hosts
            .first()
            .map(|s| s.as_str())
            .unwrap_or("mediafire.com")
    }
}

/// Where the pin service lives and how its links are shaped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinSite {
    pub hosts: Vec<String>,
    /// Short-link hosts that redirect to a pin page.
    pub short_hosts: Vec<String>,
    /// Redirect relay that needs one more hop.
    pub shortener_marker: String,
    /// Path segment every canonical pin URL contains.
    pub pin_path: String,
    /// Page that lists downloadable renditions for a pin URL.
    pub relay_url: String,
}

impl Default for PinSite {
    fn default() -> Self {
        Self {
            hosts: vec!["pinterest.com".to_string()],
            short_hosts: vec!["pin.it".to_string()],
            shortener_marker: "/url_shortener".to_string(),
            pin_path: "/pin/".to_string(),
            relay_url: "https://www.savepin.app/download.php".to_string(),
        }
    }
}

impl PinSite {
    /// Relay page URL for a canonical pin URL.
    pub fn relay_page(&self, pin_url: &str) -> String {
        format!(
            "{}?url={}&lang=en&type=redirect",
            self.relay_url,
            urlencoding::encode(pin_url)
        )
    }
}

/// Retry/backoff settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub jitter: bool,
    /// Overall budget for one request, across every attempt.
    pub deadline_secs: Option<u64>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1000,
            jitter: true,
            deadline_secs: Some(900),
        }
    }
}

/// Settings for the whole service.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub bind: String,
    /// Requests allowed in flight at once; extra ones are refused.
    pub max_concurrent: usize,
    pub cache_ttl_secs: u64,
    pub cache_sweep_secs: u64,
    pub retry: RetrySettings,
    pub http_timeout_secs: u64,
    /// Outbound proxy for the bypass client (and the browser if it has none).
    pub proxy: Option<String>,
    pub browser: BrowserEngineConfig,
    pub verify: VerifyPolicy,
    /// Allow the guessed-mirror download link as a last resort.
    pub synthetic_fallback: bool,
    pub file_locker: FileLockerSite,
    pub pin: PinSite,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            max_concurrent: 10,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            cache_sweep_secs: 60,
            retry: RetrySettings::default(),
            http_timeout_secs: 15,
            proxy: None,
            browser: BrowserEngineConfig::default(),
            verify: VerifyPolicy::Off,
            synthetic_fallback: false,
            file_locker: FileLockerSite::default(),
            pin: PinSite::default(),
        }
    }
}

impl Settings {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `MEDIAPULL_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(bind) = env::var("MEDIAPULL_BIND") {
            self.bind = bind;
        }
        if let Some(n) = env_parse::<usize>("MEDIAPULL_MAX_CONCURRENT") {
            self.max_concurrent = n.max(1);
        }
        if let Some(ttl) = env_parse("MEDIAPULL_CACHE_TTL_SECS") {
            self.cache_ttl_secs = ttl;
        }
        if let Some(sweep) = env_parse::<u64>("MEDIAPULL_CACHE_SWEEP_SECS") {
            self.cache_sweep_secs = sweep.max(1);
        }
        if let Some(n) = env_parse::<u32>("MEDIAPULL_MAX_ATTEMPTS") {
            self.retry.max_attempts = n.clamp(2, 5);
        }
        if let Some(ms) = env_parse("MEDIAPULL_BACKOFF_BASE_MS") {
            self.retry.backoff_base_ms = ms;
        }
        if let Some(jitter) = env_bool("MEDIAPULL_BACKOFF_JITTER") {
            self.retry.jitter = jitter;
        }
        if let Some(secs) = env_parse::<u64>("MEDIAPULL_REQUEST_DEADLINE_SECS") {
            // 0 disables the overall deadline
            self.retry.deadline_secs = (secs > 0).then_some(secs);
        }
        if let Some(secs) = env_parse("MEDIAPULL_HTTP_TIMEOUT_SECS") {
            self.http_timeout_secs = clamp_timeout(secs);
        }
        if let Ok(proxy) = env::var("MEDIAPULL_PROXY") {
            if !proxy.trim().is_empty() {
                self.proxy = Some(proxy);
            }
        }
        if let Some(policy) = env::var("MEDIAPULL_VERIFY")
            .ok()
            .and_then(|v| VerifyPolicy::from_str(&v))
        {
            self.verify = policy;
        }
        if let Some(synthetic) = env_bool("MEDIAPULL_SYNTHETIC") {
            self.synthetic_fallback = synthetic;
        }
        if let Some(hosts) = env_list("MEDIAPULL_FILELOCKER_HOSTS") {
            self.file_locker.hosts = hosts;
        }
        if let Some(hosts) = env_list("MEDIAPULL_PIN_HOSTS") {
            self.pin.hosts = hosts;
        }
        if let Some(hosts) = env_list("MEDIAPULL_PIN_SHORT_HOSTS") {
            self.pin.short_hosts = hosts;
        }
        if let Ok(relay) = env::var("MEDIAPULL_PIN_RELAY_URL") {
            self.pin.relay_url = relay;
        }

        self.browser = self.browser.with_env_overrides();
        if self.browser.proxy.is_none() {
            self.browser.proxy = self.proxy.clone();
        }
        self
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(clamp_timeout(self.http_timeout_secs))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

pub(crate) fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    env::var(key).ok().and_then(|v| parse_bool(&v))
}

fn env_list(key: &str) -> Option<Vec<String>> {
    let value = env::var(key).ok()?;
    let items: Vec<String> = value
        .split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    (!items.is_empty()).then_some(items)
}

/// Lenient boolean parsing for env vars and query strings.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_timeout() {
        assert_eq!(clamp_timeout(1), 10);
        assert_eq!(clamp_timeout(30), 30);
        assert_eq!(clamp_timeout(600), 45);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool(" YES "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool(""), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_verify_policy_parsing() {
        assert_eq!(VerifyPolicy::from_str("flag"), Some(VerifyPolicy::Flag));
        assert_eq!(
            VerifyPolicy::from_str("Synthesize"),
            Some(VerifyPolicy::Synthesize)
        );
        assert_eq!(VerifyPolicy::from_str("off"), Some(VerifyPolicy::Off));
        assert_eq!(VerifyPolicy::from_str("sometimes"), None);
    }

    #[test]
    fn test_relay_page_encodes_pin_url() {
        let pin = PinSite::default();
        let page = pin.relay_page("https://www.pinterest.com/pin/123/");
        assert_eq!(
            page,
            "https://www.savepin.app/download.php?url=https%3A%2F%2Fwww.pinterest.com%2Fpin%2F123%2F&lang=en&type=redirect"
        );
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.max_concurrent, 10);
        assert_eq!(settings.cache_ttl(), Duration::from_secs(300));
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.verify, VerifyPolicy::Off);
        assert!(!settings.synthetic_fallback);
    }
}
