//! Page retrieval clients: plain HTTP and headless browser.

pub mod browser;
pub mod challenge;
mod http_client;

pub use browser::{BrowserEngineConfig, BrowserEngineType, BrowserFetchResponse, BrowserFetcher};
pub use challenge::{html_title, is_challenge_page};
pub use http_client::{
    parse_content_disposition_filename, random_user_agent, HeaderProfile, HttpClient,
    PageResponse, ProbeResponse, USER_AGENT,
};
