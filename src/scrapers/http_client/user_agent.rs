//! User agents and header fingerprints for outbound requests.

use rand::seq::SliceRandom;

/// Desktop Chrome user agent used by the plain HTTP strategy.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Real browser user agents rotated by the bypass client.
pub const IMPERSONATE_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
];

/// Pick a random real-browser user agent.
pub fn random_user_agent() -> &'static str {
    IMPERSONATE_USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENT)
}

/// User agent plus the request headers sent alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderProfile {
    pub user_agent: String,
    pub headers: Vec<(&'static str, String)>,
}

impl HeaderProfile {
    /// Fixed desktop-Chrome fingerprint.
    pub fn browser() -> Self {
        Self {
            user_agent: USER_AGENT.to_string(),
            headers: vec![
                (
                    "Accept",
                    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"
                        .to_string(),
                ),
                ("Accept-Language", "en-US,en;q=0.5".to_string()),
            ],
        }
    }

    /// Randomly chosen user agent with a full navigation header set, so
    /// repeated attempts do not present the same fingerprint.
    pub fn rotated() -> Self {
        let user_agent = random_user_agent().to_string();
        let mut headers = vec![
            (
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"
                    .to_string(),
            ),
            ("Accept-Language", "en-US,en;q=0.9".to_string()),
            ("Upgrade-Insecure-Requests", "1".to_string()),
            ("Sec-Fetch-Dest", "document".to_string()),
            ("Sec-Fetch-Mode", "navigate".to_string()),
            ("Sec-Fetch-Site", "none".to_string()),
            ("Sec-Fetch-User", "?1".to_string()),
        ];
        // Firefox and Safari do not send client hints
        if user_agent.contains("Chrome/") {
            headers.push(("Sec-CH-UA-Mobile", "?0".to_string()));
        }
        Self {
            user_agent,
            headers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_user_agent_is_real_browser() {
        let ua = random_user_agent();
        assert!(ua.starts_with("Mozilla/5.0"));
        assert!(IMPERSONATE_USER_AGENTS.contains(&ua));
    }

    #[test]
    fn test_browser_profile_is_stable() {
        assert_eq!(HeaderProfile::browser(), HeaderProfile::browser());
        assert_eq!(HeaderProfile::browser().user_agent, USER_AGENT);
    }

    #[test]
    fn test_rotated_profile_sends_navigation_headers() {
        let profile = HeaderProfile::rotated();
        let names: Vec<_> = profile.headers.iter().map(|(k, _)| *k).collect();
        assert!(names.contains(&"Sec-Fetch-Mode"));
        assert!(names.contains(&"Upgrade-Insecure-Requests"));
        let hints = names.contains(&"Sec-CH-UA-Mobile");
        assert_eq!(hints, profile.user_agent.contains("Chrome/"));
    }
}
