//! Pin relay page extraction.
//!
//! The relay lists every rendition of a pin in a table: one row per file
//! with quality, format, and size cells and a download anchor. Anchors often
//! wrap the real media URL as `force-save.php?url=<percent-encoded>`.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};
use tracing::debug;

use super::decode::is_absolute_http;
use super::rules::{element_text, has_match, selector};
use crate::error::{ExtractError, ExtractResult};
use crate::models::{MediaItem, MediaRecord, MediaType, MediaUrls, RetrievedPage, UNKNOWN};

const VIDEO_ANCHORS: &str = "a[href*='.mp4']";
const IMAGE_ANCHORS: &str = "a[href*='.jpg'], a[href*='.jpeg'], a[href*='.png']";
const WRAPPED_ANCHORS: &str = "a[href*='force-save.php']";

/// Selector the browser waits for before capturing.
pub const RENDER_MARKER: &str = "a[href*='force-save.php'], table a[href]";

static WRAPPED_URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[?&]url=([^&]+)").unwrap());

/// Whether the relay page lists any media.
pub fn recognizes(html: &str) -> bool {
    let document = Html::parse_document(html);
    [VIDEO_ANCHORS, IMAGE_ANCHORS, WRAPPED_ANCHORS]
        .iter()
        .any(|css| has_match(&document, css))
}

/// Build the pin record from a relay page.
pub fn extract(page: &RetrievedPage, pin_url: &str) -> ExtractResult<MediaRecord> {
    let document = Html::parse_document(&page.html);
    let items = media_items(&document);
    if items.is_empty() {
        return Err(ExtractError::ExtractionIncomplete(format!(
            "no media rows on {} page",
            page.strategy_used
        )));
    }

    let media_urls = MediaUrls {
        videos: urls_of(&items, MediaType::Video),
        images: urls_of(&items, MediaType::Image),
    };

    let primary = items
        .iter()
        .find(|item| item.media_type == MediaType::Video)
        .or_else(|| items.iter().find(|item| item.media_type == MediaType::Image))
        .unwrap_or(&items[0])
        .clone();

    let mut record = MediaRecord {
        size_label: primary.size.clone(),
        download_url: primary.url.clone(),
        media_type: primary.media_type,
        method_used: format!("{}-table", page.strategy_used),
        source_url: Some(pin_url.to_string()),
        primary_url: Some(primary.url.clone()),
        media_urls: Some(media_urls),
        media_items: items,
        ..MediaRecord::default()
    };
    if let Some(name) = file_name(&primary.url) {
        record.set_name(name);
    }
    Ok(record)
}

/// Walk the relay table, typed anchors first, then every wrapped anchor.
fn media_items(document: &Html) -> Vec<MediaItem> {
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    if let Some(sel) = selector(VIDEO_ANCHORS) {
        for anchor in document.select(&sel) {
            let Some(url) = anchor_media_url(&anchor) else {
                continue;
            };
            let cells = row_cells(&anchor);
            let quality = anchor
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find(|el| el.value().name() == "tr")
                .and_then(|row| {
                    let sel = selector(".video-quality")?;
                    row.select(&sel).next().map(|el| element_text(&el))
                })
                .filter(|q| !q.is_empty())
                .or_else(|| cells.first().cloned());
            push_item(
                &mut items,
                &mut seen,
                MediaItem {
                    quality: quality.unwrap_or_else(|| UNKNOWN.to_string()),
                    format: cell_or(&cells, 1, "MP4"),
                    size: cell_or(&cells, 2, UNKNOWN),
                    url,
                    media_type: MediaType::Video,
                },
            );
        }
    }

    if let Some(sel) = selector(IMAGE_ANCHORS) {
        for anchor in document.select(&sel) {
            let Some(url) = anchor_media_url(&anchor) else {
                continue;
            };
            let cells = row_cells(&anchor);
            let quality = cell_or(&cells, 0, UNKNOWN);
            if quality.contains("Thumbnail") {
                continue;
            }
            push_item(
                &mut items,
                &mut seen,
                MediaItem {
                    quality,
                    format: cell_or(&cells, 1, "JPG"),
                    size: cell_or(&cells, 2, UNKNOWN),
                    url,
                    media_type: MediaType::Image,
                },
            );
        }
    }

    if items.is_empty() {
        if let Some(sel) = selector(WRAPPED_ANCHORS) {
            for anchor in document.select(&sel) {
                let Some(url) = anchor_media_url(&anchor) else {
                    continue;
                };
                let media_type = MediaType::from_url(&url);
                if media_type == MediaType::Unknown {
                    continue;
                }
                let cells = row_cells(&anchor);
                let quality = cell_or(&cells, 0, UNKNOWN);
                if media_type == MediaType::Image && quality.contains("Thumbnail") {
                    continue;
                }
                let format = if media_type == MediaType::Video { "MP4" } else { "JPG" };
                push_item(
                    &mut items,
                    &mut seen,
                    MediaItem {
                        quality,
                        format: cell_or(&cells, 1, format),
                        size: cell_or(&cells, 2, UNKNOWN),
                        url,
                        media_type,
                    },
                );
            }
        }
    }

    debug!("Relay page listed {} media items", items.len());
    items
}

fn push_item(items: &mut Vec<MediaItem>, seen: &mut HashSet<String>, item: MediaItem) {
    if seen.insert(item.url.clone()) {
        items.push(item);
    }
}

/// The media URL behind an anchor, unwrapping `force-save.php?url=`.
fn anchor_media_url(anchor: &ElementRef<'_>) -> Option<String> {
    let href = anchor.value().attr("href")?.trim();
    let url = if href.contains("force-save.php") {
        unwrap_force_save(href)?
    } else {
        href.to_string()
    };
    is_absolute_http(&url).then_some(url)
}

/// `force-save.php?url=https%3A%2F%2F...` -> `https://...`
pub fn unwrap_force_save(href: &str) -> Option<String> {
    let encoded = WRAPPED_URL.captures(href)?.get(1)?.as_str();
    match urlencoding::decode(encoded) {
        Ok(decoded) => Some(decoded.into_owned()),
        Err(e) => {
            debug!("Skipping undecodable relay link {}: {}", href, e);
            None
        }
    }
}

/// Text of every `<td>` in the anchor's table row.
fn row_cells(anchor: &ElementRef<'_>) -> Vec<String> {
    let Some(row) = anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "tr")
    else {
        return Vec::new();
    };
    let Some(sel) = selector("td") else {
        return Vec::new();
    };
    row.select(&sel).map(|td| element_text(&td)).collect()
}

fn cell_or(cells: &[String], index: usize, default: &str) -> String {
    cells
        .get(index)
        .filter(|c| !c.is_empty())
        .cloned()
        .unwrap_or_else(|| default.to_string())
}

fn urls_of(items: &[MediaItem], media_type: MediaType) -> Vec<String> {
    items
        .iter()
        .filter(|item| item.media_type == media_type)
        .map(|item| item.url.clone())
        .collect()
}

/// Last path segment of a media URL, without the query.
fn file_name(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    Some(segment.to_string())
}
