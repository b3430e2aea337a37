//! HTTP client for page retrieval, short-link hops, and link probes.

mod response;
mod user_agent;

pub use response::{parse_content_disposition_filename, PageResponse, ProbeResponse};
pub use user_agent::{random_user_agent, HeaderProfile, IMPERSONATE_USER_AGENTS, USER_AGENT};

use std::time::{Duration, Instant};

use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, LOCATION, RANGE};
use reqwest::{redirect, Client, Proxy, StatusCode};
use tracing::debug;

use response::header_map;

/// HTTP client bound to one header fingerprint.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    /// Same fingerprint with redirect-following disabled.
    no_redirect: Client,
    profile: HeaderProfile,
}

impl HttpClient {
    /// Client with the fixed desktop-browser fingerprint.
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        Self::with_profile(timeout, HeaderProfile::browser(), None)
    }

    /// Client with a specific fingerprint and optional outbound proxy.
    pub fn with_profile(
        timeout: Duration,
        profile: HeaderProfile,
        proxy: Option<&str>,
    ) -> anyhow::Result<Self> {
        let build = |policy: redirect::Policy| -> anyhow::Result<Client> {
            let mut builder = Client::builder()
                .user_agent(&profile.user_agent)
                .default_headers(default_headers(&profile))
                .timeout(timeout)
                .cookie_store(true)
                .gzip(true)
                .brotli(true)
                .redirect(policy);
            if let Some(proxy) = proxy {
                builder = builder.proxy(Proxy::all(proxy).context("Invalid proxy URL")?);
            }
            builder.build().context("Failed to create HTTP client")
        };

        Ok(Self {
            client: build(redirect::Policy::limited(10))?,
            no_redirect: build(redirect::Policy::none())?,
            profile,
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.profile.user_agent
    }

    /// GET a page and read its body as text.
    pub async fn get_page(&self, url: &str) -> Result<PageResponse, reqwest::Error> {
        let start = Instant::now();
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let final_url = response.url().to_string();
        let headers = header_map(response.headers());
        let body = response.text().await?;

        debug!(
            "GET {} -> {} ({} bytes, {:?})",
            url,
            status,
            body.len(),
            start.elapsed()
        );

        Ok(PageResponse {
            status,
            final_url,
            headers,
            body,
        })
    }

    /// One request without following redirects; returns the absolute
    /// `Location` target when the server answered with one.
    pub async fn redirect_location(&self, url: &str) -> Result<Option<String>, reqwest::Error> {
        let response = self.no_redirect.get(url).send().await?;
        let status = response.status();
        if !(status.is_success() || status.is_redirection()) {
            debug!("Short-link hop {} answered {}", url, status);
            return Ok(None);
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|loc| absolutize(url, loc));
        debug!("Short-link hop {} -> {:?}", url, location);
        Ok(location)
    }

    /// Check that a link answers. Tries HEAD first and falls back to a
    /// one-byte ranged GET when HEAD is refused.
    pub async fn probe(&self, url: &str) -> Result<ProbeResponse, reqwest::Error> {
        let head = self.no_redirect.head(url).send().await?;
        let status = head.status();
        if !head_rejected(status) {
            return Ok(ProbeResponse {
                status,
                headers: header_map(head.headers()),
            });
        }

        debug!("HEAD {} refused ({}), retrying as ranged GET", url, status);
        let response = self
            .no_redirect
            .get(url)
            .header(RANGE, "bytes=0-0")
            .send()
            .await?;
        Ok(ProbeResponse {
            status: response.status(),
            headers: header_map(response.headers()),
        })
    }
}

fn default_headers(profile: &HeaderProfile) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in &profile.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    headers
}

/// Servers that do not implement HEAD answer with one of these.
fn head_rejected(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED | StatusCode::FORBIDDEN
    )
}

/// Resolve a possibly relative `Location` against the request URL.
fn absolutize(base: &str, location: &str) -> String {
    url::Url::parse(base)
        .and_then(|b| b.join(location))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| location.to_string())
}
