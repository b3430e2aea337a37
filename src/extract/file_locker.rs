//! File-locker page extraction.
//!
//! Fields come from the declarative rule tables below. The download link is
//! looked for with an ordered list of matchers, stopping at the first one
//! that produces an absolute URL:
//!
//! 1. base64 `data-scrambled-url` on the download button
//! 2. `onclick` handlers that assign or contain an absolute URL
//! 3. inline scripts mentioning a download-mirror URL
//! 4. download anchors, most specific selector first
//!
//! A guessed mirror URL is only built when the caller enabled it.

use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;
use scraper::Html;
use tracing::debug;

use super::decode::{decode_scrambled, is_absolute_http};
use super::rules::{element_text, first_match, has_match, selector, Rule};
use crate::config::FileLockerSite;
use crate::error::{ExtractError, ExtractResult};
use crate::models::{host_matches, MediaRecord, MediaType, RetrievedPage, UNKNOWN};

pub(crate) const NAME_RULES: &[Rule] = &[
    Rule::Attr(".dl-btn-label", "title"),
    Rule::Text(".dl-btn-label"),
    Rule::Text("div.filename"),
    Rule::Text(".filename"),
    Rule::Attr("meta[property='og:title']", "content"),
    Rule::Title,
];

pub(crate) const SIZE_RULES: &[Rule] = &[
    Rule::Text(".file-size"),
    Rule::Text("div.file-size"),
    Rule::Text("ul.details li:first-child span"),
    Rule::ParenSuffix("#downloadButton"),
    Rule::ParenSuffix("a.input.popsok"),
];

pub(crate) const UPLOADED_RULES: &[Rule] = &[
    Rule::Text("ul.details li:nth-child(2) span"),
    Rule::Text(".upload-date"),
    Rule::Text(".date-added"),
];

/// Any of these on a page means it is the file page we asked for.
const PAGE_MARKERS: &[&str] = &[
    "#downloadButton",
    "[data-scrambled-url]",
    ".dl-btn-label",
    "div.filename",
    "a.input.popsok",
    ".download_link",
];

/// Selector the browser waits for before capturing.
pub const RENDER_MARKER: &str = "#downloadButton, .dl-btn-label, div.filename";

/// Selectors driven by the repair flow.
pub const REPAIR_SELECTOR: &str = "a.retry-link, a[href*='repair'], #repairLink";
pub const CONTINUE_SELECTOR: &str = "#continue-btn, a.continue, a[href*='continue']";

const UNAVAILABLE_PHRASES: &[&str] = &[
    "invalid or deleted file",
    "file is no longer available",
    "no longer available",
    "file has been removed",
];

static LOCATION_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:window\.)?location(?:\.href)?\s*=\s*['"](https?://[^'"]+)['"]"#).unwrap()
});

static ABSOLUTE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[A-Za-z0-9.\-]+(?::\d+)?/[^\s'"<>\\)]*"#).unwrap());

static FILE_KEY_IN_PAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/file/([A-Za-z0-9]+)/").unwrap());

/// Inputs the file-locker extractor needs besides the page.
#[derive(Debug, Clone)]
pub struct FileLockerContext<'a> {
    pub site: &'a FileLockerSite,
    /// Canonical page URL the request was for.
    pub page_url: &'a str,
    pub file_key: Option<&'a str>,
    /// File name taken from the page URL, used when the page has none.
    pub name_hint: Option<&'a str>,
    /// Build a guessed mirror link when every matcher comes up empty.
    pub synthetic: bool,
}

type Matcher = fn(&Html, &FileLockerContext<'_>) -> Option<String>;

const DOWNLOAD_MATCHERS: &[(&str, Matcher)] = &[
    ("scrambled", scrambled_attribute),
    ("onclick", event_handler),
    ("script", inline_script),
    ("anchor", download_anchor),
];

/// Whether the HTML looks like a file page (or its "file deleted" variant).
pub fn recognizes(html: &str) -> bool {
    let document = Html::parse_document(html);
    PAGE_MARKERS.iter().any(|css| has_match(&document, css)) || is_unavailable(html)
}

/// Whether the page is the broken-link variant that offers a repair link.
pub fn needs_repair(html: &str) -> bool {
    has_match(&Html::parse_document(html), REPAIR_SELECTOR)
}

pub fn extract(page: &RetrievedPage, ctx: &FileLockerContext<'_>) -> ExtractResult<MediaRecord> {
    let document = Html::parse_document(&page.html);
    let mut record = MediaRecord {
        source_url: Some(ctx.page_url.to_string()),
        ..MediaRecord::default()
    };

    if let Some(name) = first_match(&document, NAME_RULES).or_else(|| ctx.name_hint.map(String::from))
    {
        record.set_name(name);
    }
    if let Some(size) = first_match(&document, SIZE_RULES) {
        record.size_label = size;
    }
    if let Some(uploaded) = first_match(&document, UPLOADED_RULES) {
        record.uploaded_label = uploaded;
    }

    let found = page
        .resolved_url
        .as_deref()
        .filter(|url| is_absolute_http(url))
        .map(|url| (url.to_string(), page.strategy_used.as_str().to_string()))
        .or_else(|| {
            DOWNLOAD_MATCHERS.iter().find_map(|(label, matcher)| {
                let url = matcher(&document, ctx)?;
                debug!("Download link via {}: {}", label, url);
                Some((url, format!("{}-{}", page.strategy_used, label)))
            })
        });

    let (download_url, method) = match found {
        Some(found) => found,
        None if is_unavailable(&page.html) => {
            return Err(ExtractError::FileUnavailable(ctx.page_url.to_string()));
        }
        None if ctx.synthetic => {
            let key = ctx
                .file_key
                .map(String::from)
                .or_else(|| file_key_in_page(&page.html))
                .ok_or_else(|| {
                    ExtractError::ExtractionIncomplete("no file key for a mirror link".to_string())
                })?;
            let name = (record.name != UNKNOWN).then_some(record.name.as_str());
            (
                synthetic_download_url(ctx.site.primary_host(), &key, name),
                "synthetic".to_string(),
            )
        }
        None => {
            return Err(ExtractError::ExtractionIncomplete(format!(
                "no download link on {} page",
                page.strategy_used
            )));
        }
    };

    if record.name == UNKNOWN {
        if let Some(name) = last_path_segment(&download_url) {
            record.set_name(name);
        }
    }
    record.media_type = MediaType::from_url(&record.name);
    record.download_url = download_url;
    record.method_used = method;
    Ok(record)
}

/// `https://download{NNNN}.{host}/{key}/{name}`
pub fn synthetic_download_url(host: &str, key: &str, name: Option<&str>) -> String {
    let mirror: u16 = rand::thread_rng().gen_range(1000..=9999);
    match name {
        Some(name) => format!(
            "https://download{}.{}/{}/{}",
            mirror,
            host,
            key,
            urlencoding::encode(name)
        ),
        None => format!("https://download{}.{}/{}", mirror, host, key),
    }
}

fn is_unavailable(html: &str) -> bool {
    let lower = html.to_ascii_lowercase();
    UNAVAILABLE_PHRASES.iter().any(|p| lower.contains(p))
}

fn file_key_in_page(html: &str) -> Option<String> {
    FILE_KEY_IN_PAGE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Percent-decoded last non-empty path segment.
fn last_path_segment(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = urlencoding::decode(segment).ok()?.into_owned();
    (!decoded.is_empty()).then_some(decoded)
}

fn same_page(candidate: &str, page_url: &str) -> bool {
    let norm = |s: &str| s.trim_end_matches('/').to_ascii_lowercase();
    norm(candidate) == norm(page_url)
}

/// Host's first label starts with "download" and the host belongs to the site.
fn is_mirror_host(url: &str, site: &FileLockerSite) -> bool {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .is_some_and(|host| host.starts_with("download") && host_matches(&host, &site.hosts))
}

fn absolutize(href: &str, base: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    url::Url::parse(base)
        .and_then(|b| b.join(href))
        .ok()
        .map(|u| u.to_string())
        .filter(|u| is_absolute_http(u))
}

fn scrambled_attribute(document: &Html, _ctx: &FileLockerContext<'_>) -> Option<String> {
    let sel = selector("#downloadButton[data-scrambled-url], [data-scrambled-url]")?;
    document
        .select(&sel)
        .filter_map(|el| el.value().attr("data-scrambled-url"))
        .find_map(|value| match decode_scrambled(value) {
            Ok(decoded) => {
                let decoded = decoded.trim().to_string();
                is_absolute_http(&decoded).then_some(decoded)
            }
            Err(e) => {
                debug!("Scrambled attribute skipped: {}", e);
                None
            }
        })
}

fn event_handler(document: &Html, ctx: &FileLockerContext<'_>) -> Option<String> {
    let sel = selector("[onclick]")?;
    document
        .select(&sel)
        .filter_map(|el| el.value().attr("onclick"))
        .find_map(|handler| {
            LOCATION_ASSIGNMENT
                .captures(handler)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .or_else(|| ABSOLUTE_URL.find(handler).map(|m| m.as_str().to_string()))
                .filter(|url| is_absolute_http(url) && !same_page(url, ctx.page_url))
        })
}

fn inline_script(document: &Html, ctx: &FileLockerContext<'_>) -> Option<String> {
    let sel = selector("script:not([src])")?;
    let scripts: Vec<String> = document
        .select(&sel)
        .map(|el| el.text().collect::<String>())
        .collect();

    let assigned = scripts.iter().find_map(|body| {
        LOCATION_ASSIGNMENT
            .captures_iter(body)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .find(|url| is_absolute_http(url) && !same_page(url, ctx.page_url))
    });

    assigned.or_else(|| {
        scripts.iter().find_map(|body| {
            ABSOLUTE_URL
                .find_iter(body)
                .map(|m| m.as_str().to_string())
                .find(|url| is_mirror_host(url, ctx.site))
        })
    })
}

fn download_anchor(document: &Html, ctx: &FileLockerContext<'_>) -> Option<String> {
    const SPECIFIC: &[&str] = &[
        "a#downloadButton[href]",
        "a.input.popsok[href]",
        "a[aria-label='Download file'][href]",
    ];

    let specific = SPECIFIC.iter().find_map(|css| {
        let sel = selector(css)?;
        document
            .select(&sel)
            .filter_map(|el| el.value().attr("href"))
            .filter_map(|href| absolutize(href, ctx.page_url))
            .find(|url| !same_page(url, ctx.page_url))
    });

    specific.or_else(|| {
        let sel = selector("a[href*='download']")?;
        document
            .select(&sel)
            .filter(|el| !element_text(el).is_empty() || el.value().attr("id").is_some())
            .filter_map(|el| el.value().attr("href"))
            .filter_map(|href| absolutize(href, ctx.page_url))
            .find(|url| is_mirror_host(url, ctx.site))
    })
}
