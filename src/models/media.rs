//! Media record produced by extraction.

use serde::{Deserialize, Serialize};

/// Sentinel for fields the page did not expose.
pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Image,
    #[default]
    Unknown,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Image => "image",
            Self::Unknown => "unknown",
        }
    }

    /// Guess the type from a media URL's extension.
    pub fn from_url(url: &str) -> Self {
        let lower = url.to_ascii_lowercase();
        if lower.contains(".mp4") || lower.contains(".webm") || lower.contains(".m3u8") {
            Self::Video
        } else if [".jpg", ".jpeg", ".png", ".gif", ".webp"]
            .iter()
            .any(|ext| lower.contains(ext))
        {
            Self::Image
        } else {
            Self::Unknown
        }
    }
}

/// One downloadable rendition listed on a pin page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub quality: String,
    pub format: String,
    pub size: String,
    pub url: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
}

/// All media URLs grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaUrls {
    pub videos: Vec<String>,
    pub images: Vec<String>,
}

/// Structured extraction result.
///
/// `download_url` is either empty (nothing found yet) or an absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecord {
    pub name: String,
    #[serde(rename = "size")]
    pub size_label: String,
    #[serde(rename = "uploaded")]
    pub uploaded_label: String,
    pub extension: String,
    pub download_url: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    #[serde(rename = "method")]
    pub method_used: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_urls: Option<MediaUrls>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_items: Vec<MediaItem>,
    /// Result of the reachability probe, when one ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,
}

impl Default for MediaRecord {
    fn default() -> Self {
        Self {
            name: UNKNOWN.to_string(),
            size_label: UNKNOWN.to_string(),
            uploaded_label: UNKNOWN.to_string(),
            extension: "unknown".to_string(),
            download_url: String::new(),
            media_type: MediaType::Unknown,
            method_used: String::new(),
            source_url: None,
            primary_url: None,
            media_urls: None,
            media_items: Vec::new(),
            verified: None,
        }
    }
}

impl MediaRecord {
    /// Set the name and re-derive the extension from it.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.extension = derive_extension(&self.name);
    }

    pub fn has_download_url(&self) -> bool {
        !self.download_url.is_empty()
    }
}

/// Extension from a file name, or `"unknown"` when it has none.
pub fn derive_extension(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() && !ext.contains('/') => {
            ext.to_string()
        }
        _ => "unknown".to_string(),
    }
}
