//! Browser render result types.

/// Page captured by the headless browser.
#[derive(Debug, Clone)]
pub struct BrowserFetchResponse {
    pub url: String,
    pub final_url: String,
    pub title: Option<String>,
    pub content: String,
    /// Whether the page marker selector appeared before the grace period ran out.
    pub marker_found: bool,
    /// Whether a bot-challenge interstitial was still showing at capture time.
    pub challenged: bool,
}

/// Outcome of driving the repair flow.
#[derive(Debug, Clone)]
pub struct RepairResponse {
    /// Page content after the continuation step.
    pub content: String,
    /// Where the continuation control sent the browser.
    pub target_url: String,
}
