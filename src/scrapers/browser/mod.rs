//! Headless browser renderer for script-heavy and challenge-protected pages.
//!
//! Uses chromiumoxide (CDP) with stealth evasion scripts. Every call gets its
//! own browser session, and the session is shut down on every exit path so
//! no Chrome process outlives the request that started it.

mod config;
mod stealth;
mod types;

pub use config::{default_headless, default_timeout, BrowserEngineConfig, BrowserEngineType};
pub use stealth::{BLOCKED_RESOURCE_PATTERNS, STEALTH_SCRIPTS};
pub use types::{BrowserFetchResponse, RepairResponse};

use anyhow::Result;

#[cfg(feature = "browser")]
use std::time::Duration;

#[cfg(feature = "browser")]
use anyhow::Context;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::network::{EnableParams, SetBlockedUrLsParams};
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;
#[cfg(feature = "browser")]
use tokio::task::JoinHandle;
#[cfg(feature = "browser")]
use tracing::{debug, info, warn};

#[cfg(feature = "browser")]
use super::challenge::is_challenge_page;
#[cfg(feature = "browser")]
use super::http_client::random_user_agent;

/// Browser-based renderer with stealth capabilities.
#[cfg(feature = "browser")]
#[derive(Debug, Clone)]
pub struct BrowserFetcher {
    config: BrowserEngineConfig,
}

/// One launched (or attached) browser plus its CDP event loop.
#[cfg(feature = "browser")]
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    remote: bool,
}

#[cfg(feature = "browser")]
impl BrowserSession {
    /// Close the browser and reap the process. Remote browsers are shared,
    /// so only our connection is dropped.
    async fn shutdown(mut self) {
        if !self.remote {
            if let Err(e) = self.browser.close().await {
                debug!("Browser close failed: {}", e);
            }
            if let Err(e) = self.browser.wait().await {
                debug!("Browser wait failed: {}", e);
            }
        }
        self.handler.abort();
    }
}

#[cfg(feature = "browser")]
impl Drop for BrowserSession {
    fn drop(&mut self) {
        // Reached without shutdown() when the request future is cancelled;
        // chromiumoxide kills the child process when `browser` drops.
        self.handler.abort();
    }
}

#[cfg(feature = "browser")]
impl BrowserFetcher {
    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &'static [&'static str] = &[
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/opt/google/chrome/google-chrome",
    ];

    pub fn new(config: BrowserEngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BrowserEngineConfig {
        &self.config
    }

    fn find_chrome() -> Result<std::path::PathBuf> {
        for path in Self::CHROME_PATHS {
            let p = std::path::Path::new(path);
            if p.exists() {
                debug!("Found Chrome at: {}", path);
                return Ok(p.to_path_buf());
            }
        }

        for cmd in &[
            "google-chrome",
            "google-chrome-stable",
            "chromium",
            "chromium-browser",
        ] {
            if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
                if output.status.success() {
                    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    if !path.is_empty() {
                        debug!("Found Chrome in PATH: {}", path);
                        return Ok(std::path::PathBuf::from(path));
                    }
                }
            }
        }

        Err(anyhow::anyhow!(
            "Chrome/Chromium not found; install it or set BROWSER_URL to a remote DevTools endpoint"
        ))
    }

    async fn launch(&self) -> Result<BrowserSession> {
        if let Some(remote_url) = self.config.remote_url.clone() {
            return self.connect_remote(&remote_url).await;
        }

        info!("Launching browser (headless={})", self.config.headless);
        let chrome_path = Self::find_chrome()?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .request_timeout(Duration::from_secs(self.config.timeout));

        // with_head means NOT headless
        if !self.config.headless {
            builder = builder.with_head();
        }

        if let Some(ref proxy) = self.config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--disable-translate")
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--window-size=1920,1080");

        for arg in &self.config.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {}", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;

        let handler = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(BrowserSession {
            browser,
            handler,
            remote: false,
        })
    }

    async fn connect_remote(&self, url: &str) -> Result<BrowserSession> {
        info!("Connecting to remote browser at {}", url);

        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let resp: serde_json::Value = reqwest::Client::new()
            .get(&version_url)
            .timeout(Duration::from_secs(self.config.timeout))
            .send()
            .await
            .context("Failed to connect to remote browser")?
            .json()
            .await
            .context("Failed to parse browser version info")?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("No webSocketDebuggerUrl in response"))?;

        let handler_config = chromiumoxide::handler::HandlerConfig {
            request_timeout: Duration::from_secs(self.config.timeout),
            ..Default::default()
        };

        let (browser, mut handler) = Browser::connect_with_config(ws_url, handler_config)
            .await
            .context("Failed to connect to remote browser")?;

        let handler = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(BrowserSession {
            browser,
            handler,
            remote: true,
        })
    }

    /// Open a tab with the user agent, resource blocking, and stealth
    /// scripts in place, ready to navigate.
    async fn prepare_page(&self, session: &BrowserSession) -> Result<Page> {
        let page = session
            .browser
            .new_page("about:blank")
            .await
            .context("Failed to open browser tab")?;

        page.execute(SetUserAgentOverrideParams::new(
            random_user_agent().to_string(),
        ))
        .await?;

        if self.config.block_resources {
            page.execute(EnableParams::default()).await?;
            let patterns = BLOCKED_RESOURCE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>();
            page.execute(SetBlockedUrLsParams::new(patterns)).await?;
        }

        if self.config.engine == BrowserEngineType::Stealth {
            for script in STEALTH_SCRIPTS {
                if let Err(e) = page
                    .execute(AddScriptToEvaluateOnNewDocumentParams::new(
                        script.to_string(),
                    ))
                    .await
                {
                    debug!("Stealth script registration skipped: {}", e);
                }
            }
        }

        Ok(page)
    }

    async fn navigate(&self, page: &Page, url: &str) -> Result<()> {
        let timeout = Duration::from_secs(self.config.timeout);
        match tokio::time::timeout(timeout, page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(anyhow::anyhow!("Navigation to {} failed: {}", url, e)),
            Err(_) => Err(anyhow::anyhow!(
                "Navigation to {} timed out after {:?}",
                url,
                timeout
            )),
        }
    }

    /// Poll for `selector` until it shows up or `grace` runs out.
    async fn wait_for_marker(page: &Page, selector: &str, grace: Duration) -> bool {
        let poll = async {
            loop {
                if page.find_element(selector).await.is_ok() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        };
        tokio::time::timeout(grace, poll).await.is_ok()
    }

    /// Render `url` and return the page once `marker` appears or the grace
    /// period passes. A challenge interstitial gets extra time to clear.
    pub async fn render(&self, url: &str, marker: &str) -> Result<BrowserFetchResponse> {
        let session = self.launch().await?;
        let result = self.render_in(&session, url, marker).await;
        session.shutdown().await;
        result
    }

    async fn render_in(
        &self,
        session: &BrowserSession,
        url: &str,
        marker: &str,
    ) -> Result<BrowserFetchResponse> {
        let page = self.prepare_page(session).await?;
        let result = self.capture(&page, url, marker).await;
        let _ = page.close().await;
        result
    }

    async fn capture(&self, page: &Page, url: &str, marker: &str) -> Result<BrowserFetchResponse> {
        info!("Rendering {}", url);
        self.navigate(page, url).await?;

        let grace = Duration::from_secs(self.config.marker_grace_secs);
        let mut marker_found = Self::wait_for_marker(page, marker, grace).await;

        let mut title = page.get_title().await.ok().flatten();
        let mut content = page.content().await?;
        let mut challenged = is_challenge_page(title.as_deref(), &content);

        if challenged && !marker_found {
            let extra = Duration::from_secs(self.config.challenge_grace_secs);
            warn!(
                "Challenge page at {}, waiting up to {:?} for it to clear",
                url, extra
            );
            marker_found = Self::wait_for_marker(page, marker, extra).await;
            title = page.get_title().await.ok().flatten();
            content = page.content().await?;
            challenged = is_challenge_page(title.as_deref(), &content);
        }

        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| url.to_string());

        Ok(BrowserFetchResponse {
            url: url.to_string(),
            final_url,
            title,
            content,
            marker_found,
            challenged,
        })
    }

    /// Drive the link-repair flow: open the page, follow the repair link,
    /// trigger the continuation control, and capture where it leads.
    pub async fn repair(
        &self,
        url: &str,
        repair_selector: &str,
        continue_selector: &str,
    ) -> Result<RepairResponse> {
        let session = self.launch().await?;
        let result = async {
            let page = self.prepare_page(&session).await?;
            let result = self
                .run_repair(&page, url, repair_selector, continue_selector)
                .await;
            let _ = page.close().await;
            result
        }
        .await;
        session.shutdown().await;
        result
    }

    async fn run_repair(
        &self,
        page: &Page,
        url: &str,
        repair_selector: &str,
        continue_selector: &str,
    ) -> Result<RepairResponse> {
        self.navigate(page, url).await?;

        let grace = Duration::from_secs(self.config.marker_grace_secs);
        if !Self::wait_for_marker(page, repair_selector, grace).await {
            return Err(anyhow::anyhow!("No repair link on {}", url));
        }

        let repair_href = page
            .find_element(repair_selector)
            .await?
            .attribute("href")
            .await?
            .ok_or_else(|| anyhow::anyhow!("Repair link has no href"))?;
        let repair_url = url::Url::parse(url)
            .and_then(|base| base.join(&repair_href))
            .map(|u| u.to_string())
            .context("Invalid repair link")?;

        info!("Following repair link {}", repair_url);
        self.navigate(page, &repair_url).await?;

        let timeout = Duration::from_secs(self.config.timeout);
        if !Self::wait_for_marker(page, continue_selector, timeout).await {
            return Err(anyhow::anyhow!("Continuation control never appeared"));
        }

        let control = page.find_element(continue_selector).await?;
        let control_href = control.attribute("href").await.ok().flatten();
        control.click().await.context("Failed to trigger continuation")?;

        if tokio::time::timeout(timeout, page.wait_for_navigation())
            .await
            .is_err()
        {
            debug!("No navigation after continuation click");
        }

        let landed = page.url().await.ok().flatten();
        let target_url = match (landed, control_href) {
            (Some(landed), _) if landed != repair_url => landed,
            (_, Some(href)) => url::Url::parse(&repair_url)
                .and_then(|base| base.join(&href))
                .map(|u| u.to_string())
                .unwrap_or(href),
            (Some(landed), None) => landed,
            (None, None) => return Err(anyhow::anyhow!("Repair flow produced no target")),
        };

        let content = page.content().await.unwrap_or_default();
        Ok(RepairResponse {
            content,
            target_url,
        })
    }
}

// Stub for when browser feature is disabled
#[cfg(not(feature = "browser"))]
#[derive(Debug, Clone)]
pub struct BrowserFetcher {
    config: BrowserEngineConfig,
}

#[cfg(not(feature = "browser"))]
impl BrowserFetcher {
    pub fn new(config: BrowserEngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BrowserEngineConfig {
        &self.config
    }

    pub async fn render(&self, _url: &str, _marker: &str) -> Result<BrowserFetchResponse> {
        Err(anyhow::anyhow!(
            "Browser support not compiled. Rebuild with: cargo build --features browser"
        ))
    }

    pub async fn repair(
        &self,
        _url: &str,
        _repair_selector: &str,
        _continue_selector: &str,
    ) -> Result<RepairResponse> {
        Err(anyhow::anyhow!(
            "Browser support not compiled. Rebuild with: cargo build --features browser"
        ))
    }
}
