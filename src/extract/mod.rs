//! Field extraction from retrieved pages.

pub mod decode;
pub mod file_locker;
pub mod pin;
pub mod rules;

pub use decode::{decode_scrambled, encode_scrambled, LinkProbe, Verification, Verifier};
pub use file_locker::{synthetic_download_url, FileLockerContext};

use crate::error::ExtractResult;
use crate::models::{MediaRecord, RetrievedPage, Source};

/// Whether the page has the structure the source's extractor reads.
pub fn recognizes(source: Source, html: &str) -> bool {
    match source {
        Source::FileLocker => file_locker::recognizes(html),
        Source::Pin => pin::recognizes(html),
    }
}

/// Whether the page offers a repair link instead of a working download.
pub fn needs_repair(source: Source, html: &str) -> bool {
    match source {
        Source::FileLocker => file_locker::needs_repair(html),
        Source::Pin => false,
    }
}

/// Selector the browser should wait for on this source's pages.
pub fn render_marker(source: Source) -> &'static str {
    match source {
        Source::FileLocker => file_locker::RENDER_MARKER,
        Source::Pin => pin::RENDER_MARKER,
    }
}

/// Per-request inputs to [`extract_record`].
#[derive(Debug, Clone)]
pub enum PageContext<'a> {
    FileLocker(FileLockerContext<'a>),
    Pin { pin_url: &'a str },
}

/// Run the source's extractor over a page.
pub fn extract_record(page: &RetrievedPage, ctx: &PageContext<'_>) -> ExtractResult<MediaRecord> {
    match ctx {
        PageContext::FileLocker(ctx) => file_locker::extract(page, ctx),
        PageContext::Pin { pin_url } => pin::extract(page, pin_url),
    }
}
