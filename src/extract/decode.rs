//! Obfuscated-link decoding and download-link verification.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use tracing::debug;

use crate::config::VerifyPolicy;
use crate::error::{ExtractError, ExtractResult};
use crate::scrapers::{HttpClient, ProbeResponse};

/// Decode a base64-scrambled attribute value into text.
pub fn decode_scrambled(value: &str) -> ExtractResult<String> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(ExtractError::DecodeFailed("empty payload".to_string()));
    }
    let bytes = STANDARD
        .decode(&compact)
        .or_else(|_| STANDARD_NO_PAD.decode(compact.trim_end_matches('=')))
        .map_err(|e| ExtractError::DecodeFailed(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ExtractError::DecodeFailed(e.to_string()))
}

/// Inverse of [`decode_scrambled`], for building fixtures.
pub fn encode_scrambled(url: &str) -> String {
    STANDARD.encode(url.as_bytes())
}

/// Absolute http(s) URL check applied to every download candidate.
pub fn is_absolute_http(candidate: &str) -> bool {
    url::Url::parse(candidate)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

/// Reachability check for a download link.
#[async_trait]
pub trait LinkProbe: Send + Sync {
    async fn probe(&self, url: &str) -> anyhow::Result<ProbeResponse>;
}

#[async_trait]
impl LinkProbe for HttpClient {
    async fn probe(&self, url: &str) -> anyhow::Result<ProbeResponse> {
        Ok(HttpClient::probe(self, url).await?)
    }
}

/// What the probe said about a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Reachable { filename: Option<String> },
    Unreachable(String),
}

/// Probes download links according to a [`VerifyPolicy`].
#[derive(Clone)]
pub struct Verifier {
    probe: Arc<dyn LinkProbe>,
    policy: VerifyPolicy,
}

impl Verifier {
    pub fn new(probe: Arc<dyn LinkProbe>, policy: VerifyPolicy) -> Self {
        Self { probe, policy }
    }

    pub fn policy(&self) -> VerifyPolicy {
        self.policy
    }

    pub async fn check(&self, url: &str) -> Verification {
        match self.probe.probe(url).await {
            Ok(response) if response.is_reachable() => Verification::Reachable {
                filename: response.filename(),
            },
            Ok(response) => {
                debug!("Probe {} -> {}", url, response.status);
                Verification::Unreachable(format!("status {}", response.status))
            }
            Err(e) => {
                debug!("Probe {} failed: {}", url, e);
                Verification::Unreachable(e.to_string())
            }
        }
    }
}
