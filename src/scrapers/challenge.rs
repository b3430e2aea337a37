//! Recognizing bot-challenge interstitials.
//!
//! Anti-bot gateways serve a placeholder page with a 200/403/503 status while
//! a script proves the client is a browser. Such a page is never a usable
//! fetch result.

/// Title fragments used by common challenge pages.
const CHALLENGE_TITLES: &[&str] = &[
    "just a moment",
    "attention required",
    "checking your browser",
    "please wait",
    "ddos-guard",
    "security check",
];

/// Body markers that only appear on challenge pages.
const CHALLENGE_MARKERS: &[&str] = &[
    "cf-browser-verification",
    "challenge-platform",
    "cf_chl_opt",
    "cf-turnstile",
    "verifying you are human",
    "enable javascript and cookies to continue",
    "g-recaptcha",
];

/// Check a page title and body for a bot-challenge interstitial.
pub fn is_challenge_page(title: Option<&str>, body: &str) -> bool {
    if let Some(title) = title {
        let title = title.to_ascii_lowercase();
        if CHALLENGE_TITLES.iter().any(|t| title.contains(t)) {
            return true;
        }
    }

    let lower = body.to_ascii_lowercase();
    CHALLENGE_MARKERS.iter().any(|m| lower.contains(m))
}

/// Pull the `<title>` text out of raw HTML without a full parse.
pub fn html_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find("</title>")?;
    let title = html.get(start..end)?.trim();
    (!title.is_empty()).then(|| title.to_string())
}
