//! URL validation, short-link resolution, and cache keys.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::{FileLockerSite, PinSite};
use crate::error::{ExtractError, ExtractResult};
use crate::models::{host_matches, Source};
use crate::scrapers::HttpClient;

/// Follows one redirect hop without fetching the target.
#[async_trait]
pub trait RedirectResolver: Send + Sync {
    /// The `Location` the URL redirects to, if any.
    async fn location(&self, url: &str) -> anyhow::Result<Option<String>>;
}

#[async_trait]
impl RedirectResolver for HttpClient {
    async fn location(&self, url: &str) -> anyhow::Result<Option<String>> {
        Ok(self.redirect_location(url).await?)
    }
}

/// A validated request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub source: Source,
    /// Canonical page URL (after short-link resolution).
    pub canonical_url: String,
    /// Page the strategies fetch; the relay page for pins.
    pub fetch_url: String,
    pub file_key: Option<String>,
    /// File name carried in the page URL, if any.
    pub name_hint: Option<String>,
}

/// Prefix `https://` when the URL has no scheme.
pub fn ensure_scheme(raw: &str) -> String {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("https://") || lower.starts_with("http://") {
        trimmed.to_string()
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        format!("https://{}", rest)
    } else {
        format!("https://{}", trimmed)
    }
}

/// Cache key for a request: source id plus the lowercased, scheme-complete
/// URL as submitted (before any short-link resolution).
pub fn cache_key(source: Source, raw: &str) -> String {
    format!(
        "{}:{}",
        source.as_str(),
        ensure_scheme(raw).trim_end_matches('/').to_ascii_lowercase()
    )
}

/// File key and optional file name from a file-locker URL.
///
/// Accepted shapes, in order: `/file/<key>[/<name>]`, `/download/<key>`,
/// `/view/<key>`, and the legacy `/?<key>`.
pub fn file_locker_key(url: &url::Url) -> Option<(String, Option<String>)> {
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    for marker in ["file", "file_premium", "download", "view"] {
        if let Some(pos) = segments.iter().position(|s| *s == marker) {
            if let Some(key) = segments.get(pos + 1) {
                let name = segments
                    .get(pos + 2)
                    .filter(|n| **n != "file")
                    .and_then(|n| urlencoding::decode(n).ok())
                    .map(|n| n.into_owned());
                return Some((key.to_string(), name));
            }
        }
    }

    if segments.is_empty() {
        let query = url.query()?;
        let key = query.split('&').next()?;
        if !key.is_empty() && !key.contains('=') {
            return Some((key.to_string(), None));
        }
    }
    None
}

/// Validates request URLs and resolves pin short links.
#[derive(Clone)]
pub struct UrlNormalizer {
    file_locker: FileLockerSite,
    pin: PinSite,
    resolver: Arc<dyn RedirectResolver>,
}

impl UrlNormalizer {
    pub fn new(file_locker: FileLockerSite, pin: PinSite, resolver: Arc<dyn RedirectResolver>) -> Self {
        Self {
            file_locker,
            pin,
            resolver,
        }
    }

    pub fn file_locker(&self) -> &FileLockerSite {
        &self.file_locker
    }

    pub fn pin(&self) -> &PinSite {
        &self.pin
    }

    pub async fn normalize(&self, source: Source, raw: &str) -> ExtractResult<Target> {
        if raw.trim().is_empty() {
            return Err(ExtractError::InvalidUrl("URL is required".to_string()));
        }
        match source {
            Source::FileLocker => self.file_locker_target(raw),
            Source::Pin => self.pin_target(raw).await,
        }
    }

    fn file_locker_target(&self, raw: &str) -> ExtractResult<Target> {
        let url = ensure_scheme(raw);
        let parsed = url::Url::parse(&url).map_err(|e| ExtractError::InvalidUrl(e.to_string()))?;
        let host = parsed
            .host_str()
            .map(|h| h.to_ascii_lowercase())
            .ok_or_else(|| ExtractError::InvalidUrl(format!("no host in {}", raw)))?;

        if !host_matches(&host, &self.file_locker.hosts) {
            return Err(ExtractError::InvalidUrl(format!(
                "{} is not a supported file host",
                host
            )));
        }
        let has_marker = self
            .file_locker
            .path_markers
            .iter()
            .any(|marker| url.contains(marker.as_str()));
        if !has_marker {
            return Err(ExtractError::InvalidUrl(format!(
                "{} is not a file page URL",
                url
            )));
        }

        let (key, name) = file_locker_key(&parsed)
            .ok_or_else(|| ExtractError::InvalidUrl(format!("no file key in {}", url)))?;

        Ok(Target {
            source: Source::FileLocker,
            canonical_url: url.clone(),
            fetch_url: url,
            file_key: Some(key),
            name_hint: name,
        })
    }

    async fn pin_target(&self, raw: &str) -> ExtractResult<Target> {
        let mut url = ensure_scheme(raw);
        let host = host_of(&url)?;

        let is_short = host_matches(&host, &self.pin.short_hosts);
        if !is_short && !host_matches(&host, &self.pin.hosts) {
            return Err(ExtractError::InvalidUrl(format!(
                "{} is not a supported pin host",
                host
            )));
        }

        if is_short {
            url = self.resolve_short_link(url).await;
        }

        let resolved_host = host_of(&url)
            .map_err(|_| ExtractError::ResolutionFailed(format!("unusable redirect {}", url)))?;
        if !host_matches(&resolved_host, &self.pin.hosts) || !url.contains(&self.pin.pin_path) {
            return Err(ExtractError::ResolutionFailed(format!(
                "{} did not lead to a pin page",
                raw.trim()
            )));
        }

        Ok(Target {
            source: Source::Pin,
            fetch_url: self.pin.relay_page(&url),
            canonical_url: url,
            file_key: None,
            name_hint: None,
        })
    }

    /// Follow at most two hops. Network failures keep the URL we had.
    async fn resolve_short_link(&self, url: String) -> String {
        let first = match self.resolver.location(&url).await {
            Ok(Some(location)) => location,
            Ok(None) => return url,
            Err(e) => {
                warn!("Short link {} could not be resolved: {}", url, e);
                return url;
            }
        };
        debug!("Short link {} -> {}", url, first);

        if !first.contains(&self.pin.shortener_marker) {
            return first;
        }
        match self.resolver.location(&first).await {
            Ok(Some(second)) => {
                debug!("Shortener relay {} -> {}", first, second);
                second
            }
            Ok(None) => first,
            Err(e) => {
                warn!("Shortener relay {} could not be resolved: {}", first, e);
                first
            }
        }
    }
}

fn host_of(url: &str) -> ExtractResult<String> {
    crate::models::host_of(url).ok_or_else(|| ExtractError::InvalidUrl(format!("no host in {}", url)))
}
