//! End-to-end extraction scenarios through the public service and router,
//! with retrieval and redirects stubbed out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tokio::sync::Notify;
use tower::ServiceExt;

use mediapull::config::{FileLockerSite, Settings};
use mediapull::extract::encode_scrambled;
use mediapull::models::{RetrievedPage, Source, StrategyKind};
use mediapull::pipeline::{ManualClock, RedirectResolver, RetryPolicy, Strategy, Target};
use mediapull::server::{create_router, AppState};
use mediapull::{ExtractError, ExtractResult, ExtractService, ExtractionRequest, Outcome};

/// Serves the same HTML for every target and remembers what it was asked for.
struct StubPage {
    kind: StrategyKind,
    html: String,
    calls: AtomicUsize,
    fetched: Mutex<Vec<String>>,
}

impl StubPage {
    fn new(kind: StrategyKind, html: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            html: html.into(),
            calls: AtomicUsize::new(0),
            fetched: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Strategy for StubPage {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    async fn attempt(&self, target: &Target) -> ExtractResult<RetrievedPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.fetched.lock().unwrap().push(target.fetch_url.clone());
        Ok(RetrievedPage::new(self.html.clone(), self.kind, &target.fetch_url))
    }
}

/// Blocks inside the attempt until released.
struct Gate {
    entered: Notify,
    release: Notify,
    html: String,
}

#[async_trait]
impl Strategy for Gate {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Http
    }

    async fn attempt(&self, target: &Target) -> ExtractResult<RetrievedPage> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(RetrievedPage::new(self.html.clone(), StrategyKind::Http, &target.fetch_url))
    }
}

/// Runs the repair flow and comes back with the mirror link.
struct RepairStub {
    download_url: &'static str,
    calls: AtomicUsize,
}

#[async_trait]
impl Strategy for RepairStub {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Repair
    }

    async fn attempt(&self, target: &Target) -> ExtractResult<RetrievedPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(RetrievedPage::new(String::new(), StrategyKind::Repair, &target.fetch_url)
            .with_resolved_url(self.download_url.to_string()))
    }
}

struct Redirects(HashMap<String, String>);

impl Redirects {
    fn new(pairs: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self(
            pairs
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
        ))
    }
}

#[async_trait]
impl RedirectResolver for Redirects {
    async fn location(&self, url: &str) -> anyhow::Result<Option<String>> {
        Ok(self.0.get(url).cloned())
    }
}

const SERVICE_URL: &str = "https://service.example/file/abc123/somefile.zip/file";

fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.file_locker = FileLockerSite::for_host("service.example");
    settings.retry.backoff_base_ms = 5;
    settings.retry.jitter = false;
    settings
}

fn scrambled_page() -> String {
    format!(
        r#"<html><head><title>somefile.zip - Service</title></head><body>
           <div class="filename">somefile.zip</div>
           <div class="file-size">12 MB</div>
           <a id="downloadButton" href="javascript:void(0)" data-scrambled-url="{}">Download</a>
           </body></html>"#,
        encode_scrambled("https://dl.example/abc123/somefile.zip")
    )
}

fn relay_page() -> &'static str {
    r#"<html><body><table>
        <tr><td class="video-quality">720p</td><td>MP4</td><td>4.2 MB</td>
            <td><a href="https://www.savepin.app/force-save.php?url=https%3A%2F%2Fv1.pinimg.com%2Fvideos%2Fmc%2F720p%2Fab%2Fclip.mp4">Download</a></td></tr>
        <tr><td>Original</td><td>JPG</td><td>310 KB</td>
            <td><a href="https://www.savepin.app/force-save.php?url=https%3A%2F%2Fi.pinimg.com%2Foriginals%2Fab%2Fcover.jpg">Download</a></td></tr>
    </table></body></html>"#
}

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn encoded(url: &str) -> String {
    urlencoding::encode(url).into_owned()
}

#[tokio::test]
async fn scrambled_attribute_page_yields_download_link() {
    let stub = StubPage::new(StrategyKind::Http, scrambled_page());
    let service = ExtractService::builder(settings())
        .strategy(stub.clone())
        .resolver(Redirects::new(&[]))
        .build()
        .unwrap();
    let app = create_router(AppState::new(Arc::new(service)));

    let (status, json) = get_json(app, &format!("/api/mediafire?url={}", encoded(SERVICE_URL))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["name"], "somefile.zip");
    assert_eq!(json["data"]["extension"], "zip");
    assert_eq!(json["data"]["size"], "12 MB");
    assert_eq!(
        json["data"]["downloadUrl"],
        "https://dl.example/abc123/somefile.zip"
    );
    assert_eq!(json["data"]["method"], "http-scrambled");
    assert_eq!(stub.calls(), 1);
}

#[tokio::test]
async fn page_without_structure_fails_after_retries() {
    let stub = StubPage::new(
        StrategyKind::Browser,
        "<html><head><title>Welcome</title></head><body><p>Nothing to see</p></body></html>",
    );
    let service = ExtractService::builder(settings())
        .strategy(stub.clone())
        .resolver(Redirects::new(&[]))
        .build()
        .unwrap();
    let app = create_router(AppState::new(Arc::new(service)));

    let (status, json) = get_json(app, &format!("/api/mediafire?url={}", encoded(SERVICE_URL))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
    let error = json["error"].as_str().unwrap();
    assert!(error.starts_with("No media URL found"), "{}", error);
    assert!(json.get("data").is_none());
    assert_eq!(stub.calls(), 3);
}

#[tokio::test]
async fn short_link_resolves_to_pin_and_prefers_video() {
    let stub = StubPage::new(StrategyKind::Http, relay_page());
    let service = ExtractService::builder(settings())
        .strategy(stub.clone())
        .resolver(Redirects::new(&[(
            "https://pin.it/3xAmPlE",
            "https://www.pinterest.com/pin/123456789/",
        )]))
        .build()
        .unwrap();
    let app = create_router(AppState::new(Arc::new(service)));

    let (status, json) = get_json(app, "/api/pinterest?url=pin.it/3xAmPlE").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    let data = &json["data"];
    assert_eq!(data["type"], "video");
    assert_eq!(
        data["downloadUrl"],
        "https://v1.pinimg.com/videos/mc/720p/ab/clip.mp4"
    );
    assert_eq!(data["mediaUrls"]["videos"][0], data["downloadUrl"]);
    assert_eq!(
        data["mediaUrls"]["images"][0],
        "https://i.pinimg.com/originals/ab/cover.jpg"
    );
    assert_eq!(data["sourceUrl"], "https://www.pinterest.com/pin/123456789/");

    let fetched = stub.fetched.lock().unwrap();
    assert!(fetched[0].contains("pinterest.com%2Fpin%2F123456789"), "{}", fetched[0]);
}

#[tokio::test]
async fn chain_stops_at_first_usable_page() {
    let http = StubPage::new(StrategyKind::Http, scrambled_page());
    let browser = StubPage::new(StrategyKind::Browser, scrambled_page());
    let service = ExtractService::builder(settings())
        .strategy(http.clone())
        .strategy(browser.clone())
        .resolver(Redirects::new(&[]))
        .build()
        .unwrap();

    let outcome = service
        .extract(Source::FileLocker, &ExtractionRequest::new(SERVICE_URL))
        .await
        .unwrap();

    assert!(matches!(outcome, Outcome::Fresh { attempts: 1, .. }));
    assert_eq!(http.calls(), 1);
    assert_eq!(browser.calls(), 0);
}

#[tokio::test]
async fn broken_link_page_is_handed_to_repair() {
    let broken = StubPage::new(
        StrategyKind::Http,
        r#"<html><body><div class="filename">somefile.zip</div>
           <p>This download link is broken.</p>
           <a class="retry-link" href="/file/abc123/repair">Repair link</a></body></html>"#,
    );
    let repair = Arc::new(RepairStub {
        download_url: "https://download7.service.example/abc123/somefile.zip",
        calls: AtomicUsize::new(0),
    });
    let service = ExtractService::builder(settings())
        .strategy(broken.clone())
        .strategy(repair.clone())
        .resolver(Redirects::new(&[]))
        .build()
        .unwrap();

    let outcome = service
        .extract(Source::FileLocker, &ExtractionRequest::new(SERVICE_URL))
        .await
        .unwrap();

    let record = outcome.record().unwrap();
    assert_eq!(
        record.download_url,
        "https://download7.service.example/abc123/somefile.zip"
    );
    assert_eq!(record.method_used, "repair");
    assert_eq!(broken.calls(), 1);
    assert_eq!(repair.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn retry_delays_grow_strictly() {
    let policy = RetryPolicy::default();
    for _ in 0..20 {
        let delays: Vec<Duration> = (0..policy.max_attempts).map(|n| policy.delay_for(n)).collect();
        assert!(delays.windows(2).all(|w| w[0] < w[1]), "{:?}", delays);
    }
}

#[tokio::test]
async fn cached_result_expires_after_ttl() {
    let stub = StubPage::new(StrategyKind::Http, scrambled_page());
    let clock = Arc::new(ManualClock::new());
    let service = ExtractService::builder(settings())
        .strategy(stub.clone())
        .resolver(Redirects::new(&[]))
        .clock(clock.clone())
        .build()
        .unwrap();
    let request = ExtractionRequest::new(SERVICE_URL);

    service.extract(Source::FileLocker, &request).await.unwrap();
    clock.advance(Duration::from_secs(299));
    let hit = service.extract(Source::FileLocker, &request).await.unwrap();
    assert!(matches!(hit, Outcome::Cached(_)));
    assert_eq!(stub.calls(), 1);

    clock.advance(Duration::from_secs(2));
    let miss = service.extract(Source::FileLocker, &request).await.unwrap();
    assert!(matches!(miss, Outcome::Fresh { .. }));
    assert_eq!(stub.calls(), 2);
}

#[tokio::test]
async fn concurrency_cap_refuses_extra_requests_immediately() {
    let gate = Arc::new(Gate {
        entered: Notify::new(),
        release: Notify::new(),
        html: scrambled_page(),
    });
    let mut settings = settings();
    settings.max_concurrent = 1;
    let service = Arc::new(
        ExtractService::builder(settings)
            .strategy(gate.clone())
            .resolver(Redirects::new(&[]))
            .build()
            .unwrap(),
    );

    let first = tokio::spawn({
        let service = service.clone();
        async move {
            service
                .extract(Source::FileLocker, &ExtractionRequest::new(SERVICE_URL))
                .await
        }
    });
    gate.entered.notified().await;

    let other = "https://service.example/file/zzz999/other.rar/file";
    let refused = tokio::time::timeout(
        Duration::from_secs(1),
        service.extract(Source::FileLocker, &ExtractionRequest::new(other)),
    )
    .await
    .expect("refusal must not wait for a slot");
    assert_eq!(refused.unwrap_err(), ExtractError::TooManyRequests);

    gate.release.notify_one();
    let outcome = first.await.unwrap().unwrap();
    assert!(matches!(outcome, Outcome::Fresh { .. }));
}

#[tokio::test]
async fn duplicate_request_is_told_to_come_back() {
    let gate = Arc::new(Gate {
        entered: Notify::new(),
        release: Notify::new(),
        html: scrambled_page(),
    });
    let service = Arc::new(
        ExtractService::builder(settings())
            .strategy(gate.clone())
            .resolver(Redirects::new(&[]))
            .build()
            .unwrap(),
    );

    let first = tokio::spawn({
        let service = service.clone();
        async move {
            service
                .extract(Source::FileLocker, &ExtractionRequest::new(SERVICE_URL))
                .await
        }
    });
    gate.entered.notified().await;

    let duplicate = service
        .extract(Source::FileLocker, &ExtractionRequest::new(SERVICE_URL))
        .await
        .unwrap();
    assert_eq!(duplicate, Outcome::InProgress { retry: 1 });

    gate.release.notify_one();
    first.await.unwrap().unwrap();
}
