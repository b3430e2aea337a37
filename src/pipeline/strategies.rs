//! Concrete retrieval strategies.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::normalize::Target;
use super::strategy::Strategy;
use crate::error::{ExtractError, ExtractResult};
use crate::extract::{self, file_locker, synthetic_download_url};
use crate::models::{RetrievedPage, Source, StrategyKind};
use crate::scrapers::{BrowserFetcher, HeaderProfile, HttpClient};

/// Plain or header-rotating HTTP fetch.
pub struct HttpStrategy {
    kind: StrategyKind,
    client: ClientSource,
    timeout: Duration,
}

enum ClientSource {
    /// One client for every attempt.
    Fixed(HttpClient),
    /// A fresh fingerprint per attempt, optionally through a proxy.
    Rotating { proxy: Option<String> },
}

impl HttpStrategy {
    /// Fixed desktop-browser fingerprint.
    pub fn plain(timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            kind: StrategyKind::Http,
            client: ClientSource::Fixed(HttpClient::new(timeout)?),
            timeout,
        })
    }

    /// Rotated user agent and header set on every attempt.
    pub fn bypass(timeout: Duration, proxy: Option<String>) -> Self {
        Self {
            kind: StrategyKind::Bypass,
            client: ClientSource::Rotating { proxy },
            timeout,
        }
    }

    fn client(&self) -> ExtractResult<HttpClient> {
        match &self.client {
            ClientSource::Fixed(client) => Ok(client.clone()),
            ClientSource::Rotating { proxy } => {
                HttpClient::with_profile(self.timeout, HeaderProfile::rotated(), proxy.as_deref())
                    .map_err(|e| ExtractError::RetrievalFailed(format!("{:#}", e)))
            }
        }
    }
}

#[async_trait]
impl Strategy for HttpStrategy {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    fn timeout(&self) -> Duration {
        // reqwest enforces `self.timeout` per request; leave room for the body
        self.timeout + Duration::from_secs(5)
    }

    async fn attempt(&self, target: &Target) -> ExtractResult<RetrievedPage> {
        let client = self.client()?;
        debug!("{} fetch as {}", self.kind, client.user_agent());

        let response = client.get_page(&target.fetch_url).await.map_err(|e| {
            if e.is_timeout() {
                ExtractError::UpstreamTimeout(self.timeout)
            } else {
                ExtractError::RetrievalFailed(e.to_string())
            }
        })?;

        if !response.is_success() {
            return Err(ExtractError::RetrievalFailed(format!(
                "{} answered {}",
                target.fetch_url, response.status
            )));
        }
        Ok(RetrievedPage::new(response.body, self.kind, response.final_url))
    }
}

/// Headless-browser render.
pub struct BrowserStrategy {
    fetcher: Arc<BrowserFetcher>,
}

impl BrowserStrategy {
    pub fn new(fetcher: Arc<BrowserFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Strategy for BrowserStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Browser
    }

    fn timeout(&self) -> Duration {
        browser_budget(&self.fetcher)
    }

    async fn attempt(&self, target: &Target) -> ExtractResult<RetrievedPage> {
        let response = self
            .fetcher
            .render(&target.fetch_url, extract::render_marker(target.source))
            .await
            .map_err(|e| ExtractError::RetrievalFailed(format!("{:#}", e)))?;
        debug!(
            "Rendered {} (marker found: {})",
            response.final_url, response.marker_found
        );

        if response.challenged {
            return Err(ExtractError::RetrievalFailed(
                "challenge did not clear".to_string(),
            ));
        }
        Ok(RetrievedPage::new(
            response.content,
            StrategyKind::Browser,
            response.final_url,
        ))
    }
}

/// Browser-driven repair flow on file-locker pages that show a repair link
/// instead of the download control.
pub struct RepairStrategy {
    fetcher: Arc<BrowserFetcher>,
}

impl RepairStrategy {
    pub fn new(fetcher: Arc<BrowserFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Strategy for RepairStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Repair
    }

    fn supports(&self, source: Source) -> bool {
        source == Source::FileLocker
    }

    fn timeout(&self) -> Duration {
        browser_budget(&self.fetcher) * 2
    }

    async fn attempt(&self, target: &Target) -> ExtractResult<RetrievedPage> {
        let response = self
            .fetcher
            .repair(
                &target.fetch_url,
                file_locker::REPAIR_SELECTOR,
                file_locker::CONTINUE_SELECTOR,
            )
            .await
            .map_err(|e| ExtractError::RetrievalFailed(format!("{:#}", e)))?;

        Ok(
            RetrievedPage::new(response.content, StrategyKind::Repair, &target.fetch_url)
                .with_resolved_url(response.target_url),
        )
    }
}

/// Builds the guessed mirror link from the file key without fetching.
pub struct DirectStrategy {
    host: String,
}

impl DirectStrategy {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

#[async_trait]
impl Strategy for DirectStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Direct
    }

    fn supports(&self, source: Source) -> bool {
        source == Source::FileLocker
    }

    async fn attempt(&self, target: &Target) -> ExtractResult<RetrievedPage> {
        let key = target
            .file_key
            .as_deref()
            .ok_or_else(|| ExtractError::RetrievalFailed("no file key in URL".to_string()))?;
        let url = synthetic_download_url(&self.host, key, target.name_hint.as_deref());
        Ok(RetrievedPage::new(String::new(), StrategyKind::Direct, &target.canonical_url)
            .with_resolved_url(url))
    }
}

/// Navigation plus both grace periods.
fn browser_budget(fetcher: &BrowserFetcher) -> Duration {
    let config = fetcher.config();
    Duration::from_secs(config.timeout + config.marker_grace_secs + config.challenge_grace_secs)
}
