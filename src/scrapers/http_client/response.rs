//! HTTP response wrappers.

use std::collections::HashMap;

use reqwest::StatusCode;

/// Fully read page response.
#[derive(Debug, Clone)]
pub struct PageResponse {
    pub status: StatusCode,
    /// URL after redirects.
    pub final_url: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl PageResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Result of a reachability probe (HEAD, or a one-byte GET).
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
}

impl ProbeResponse {
    /// 2xx and 3xx both mean the link leads somewhere.
    pub fn is_reachable(&self) -> bool {
        self.status.is_success() || self.status.is_redirection()
    }

    /// Filename the server would save the download as.
    pub fn filename(&self) -> Option<String> {
        self.headers
            .get("content-disposition")
            .and_then(|h| parse_content_disposition_filename(h))
    }
}

/// Collect response headers into a lowercase-keyed map.
pub(crate) fn header_map(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

/// Parse filename from a Content-Disposition header value.
/// `filename*=UTF-8''...` (RFC 5987) wins over plain `filename=`.
pub fn parse_content_disposition_filename(header: &str) -> Option<String> {
    let encoded = header.find("filename*=").and_then(|start| {
        let rest = &header[start + "filename*=".len()..];
        let (_, value) = rest.split_once("''")?;
        let value = value.split([';', ' ']).next()?;
        urlencoding::decode(value).ok().map(|v| v.trim().to_string())
    });
    if let Some(name) = encoded.filter(|n| !n.is_empty()) {
        return Some(name);
    }

    let start = header.find("filename=")?;
    let rest = &header[start + "filename=".len()..];
    let name = match rest.strip_prefix('"') {
        Some(quoted) => quoted.split('"').next(),
        None => rest.split([';', ' ']).next(),
    }?
    .trim();
    (!name.is_empty()).then(|| name.to_string())
}
