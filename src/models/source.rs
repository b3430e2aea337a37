//! Supported upstream sites.

use serde::{Deserialize, Serialize};

use crate::config::{FileLockerSite, PinSite};

/// Which upstream an extraction targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// File-hosting page with a single download control.
    FileLocker,
    /// Image/video pin page, listed through a relay page.
    Pin,
}

impl Source {
    /// Short id, also used as the cache-key prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileLocker => "filelocker",
            Self::Pin => "pin",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "filelocker" | "file-locker" | "mediafire" => Some(Self::FileLocker),
            "pin" | "pinterest" => Some(Self::Pin),
            _ => None,
        }
    }

    /// Guess the source from a URL's host.
    pub fn detect(url: &str, file_locker: &FileLockerSite, pin: &PinSite) -> Option<Self> {
        let host = host_of(url)?;
        if host_matches(&host, &file_locker.hosts) {
            Some(Self::FileLocker)
        } else if host_matches(&host, &pin.hosts) || host_matches(&host, &pin.short_hosts) {
            Some(Self::Pin)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercased host of a URL, accepting scheme-less input.
pub fn host_of(url: &str) -> Option<String> {
    let trimmed = url.trim();
    let parsed = if trimmed.contains("://") {
        url::Url::parse(trimmed)
    } else {
        url::Url::parse(&format!("https://{}", trimmed.trim_start_matches('/')))
    };
    parsed
        .ok()?
        .host_str()
        .map(|h| h.trim_end_matches('.').to_ascii_lowercase())
}

/// Whether `host` is one of `domains` or a subdomain of one.
pub fn host_matches(host: &str, domains: &[String]) -> bool {
    domains.iter().any(|domain| {
        let domain = domain.trim().to_ascii_lowercase();
        !domain.is_empty()
            && (host == domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.')))
    })
}
