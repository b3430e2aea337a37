//! Data models for extraction requests, retrieved pages, and media records.

mod media;
mod request;
mod source;

pub use media::{derive_extension, MediaItem, MediaRecord, MediaType, MediaUrls, UNKNOWN};
pub use request::{ExtractionRequest, RetrievedPage, StrategyHint, StrategyKind};
pub use source::{host_matches, host_of, Source};
