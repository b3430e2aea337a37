//! mediapull - direct download link extraction.
//!
//! Takes a link to a file-locker page or a pin-sharing page and works out the
//! direct media URL behind it by scraping the rendered HTML. Retrieval runs
//! through an ordered chain of strategies (plain HTTP, a header-rotating
//! bypass client, a headless browser, a repair flow) until one produces a
//! page the field extractor recognizes.

pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod models;
pub mod pipeline;
pub mod scrapers;
pub mod server;

pub use config::Settings;
pub use error::{ExtractError, ExtractResult};
pub use models::{ExtractionRequest, MediaRecord, MediaType, StrategyHint, StrategyKind};
pub use pipeline::{ExtractService, Outcome};
