//! Extraction pipeline: admission, cache, normalization, strategy chain,
//! field extraction, verification, and retries.

pub mod cache;
pub mod guard;
pub mod normalize;
pub mod retry;
pub mod strategies;
pub mod strategy;

pub use cache::{Clock, ManualClock, ResultCache, SystemClock};
pub use guard::{ConcurrencyGuard, InFlight};
pub use normalize::{cache_key, ensure_scheme, RedirectResolver, Target, UrlNormalizer};
pub use retry::{RetryController, RetryPolicy, RetryReport, RetryState};
pub use strategies::{BrowserStrategy, DirectStrategy, HttpStrategy, RepairStrategy};
pub use strategy::{classify, plan, Strategy, StrategyChain, StrategyOutcome, StrategySet};

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::config::{Settings, VerifyPolicy};
use crate::error::{ExtractError, ExtractResult};
use crate::extract::{
    self, synthetic_download_url, FileLockerContext, LinkProbe, PageContext, Verification,
    Verifier,
};
use crate::models::{ExtractionRequest, MediaRecord, Source, StrategyHint, UNKNOWN};
use crate::scrapers::{BrowserFetcher, HttpClient};

/// What an extraction call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Freshly extracted; `attempts` counts pipeline runs.
    Fresh { record: MediaRecord, attempts: u32 },
    /// Served from the result cache.
    Cached(MediaRecord),
    /// The same URL is already being extracted; come back with `retry`.
    InProgress { retry: u32 },
}

impl Outcome {
    pub fn record(&self) -> Option<&MediaRecord> {
        match self {
            Outcome::Fresh { record, .. } | Outcome::Cached(record) => Some(record),
            Outcome::InProgress { .. } => None,
        }
    }
}

/// The extraction service shared by the HTTP handlers and the CLI.
pub struct ExtractService {
    settings: Settings,
    normalizer: UrlNormalizer,
    strategies: StrategySet,
    cache: Arc<ResultCache>,
    guard: ConcurrencyGuard,
    in_flight: InFlight,
    retry: RetryController,
    verifier: Option<Verifier>,
}

/// Assembles an [`ExtractService`]; anything not supplied is built from the
/// settings.
pub struct ExtractServiceBuilder {
    settings: Settings,
    strategies: StrategySet,
    default_strategies: bool,
    resolver: Option<Arc<dyn RedirectResolver>>,
    probe: Option<Arc<dyn LinkProbe>>,
    clock: Option<Arc<dyn Clock>>,
}

impl ExtractServiceBuilder {
    /// Register a strategy, replacing the built-in one of the same kind.
    pub fn strategy(mut self, strategy: Arc<dyn Strategy>) -> Self {
        self.strategies.insert(strategy);
        self
    }

    /// Also register the built-in HTTP, bypass, browser, repair, and
    /// direct strategies for kinds not supplied explicitly.
    pub fn with_default_strategies(mut self) -> Self {
        self.default_strategies = true;
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn RedirectResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn LinkProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> anyhow::Result<ExtractService> {
        let settings = self.settings;
        let timeout = settings.http_timeout();

        let client = HttpClient::new(timeout)?;
        let resolver: Arc<dyn RedirectResolver> = match self.resolver {
            Some(resolver) => resolver,
            None => Arc::new(client.clone()),
        };
        let probe: Arc<dyn LinkProbe> = match self.probe {
            Some(probe) => probe,
            None => Arc::new(client),
        };

        let mut strategies = StrategySet::new();
        if self.default_strategies {
            let fetcher = Arc::new(BrowserFetcher::new(settings.browser.clone()));
            strategies.insert(Arc::new(HttpStrategy::plain(timeout)?));
            strategies.insert(Arc::new(HttpStrategy::bypass(timeout, settings.proxy.clone())));
            strategies.insert(Arc::new(BrowserStrategy::new(fetcher.clone())));
            strategies.insert(Arc::new(RepairStrategy::new(fetcher)));
            strategies.insert(Arc::new(DirectStrategy::new(
                settings.file_locker.primary_host(),
            )));
        }
        strategies.merge(self.strategies);

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let cache = Arc::new(ResultCache::with_clock(settings.cache_ttl(), clock));
        let verifier = (settings.verify != VerifyPolicy::Off)
            .then(|| Verifier::new(probe, settings.verify));

        Ok(ExtractService {
            normalizer: UrlNormalizer::new(
                settings.file_locker.clone(),
                settings.pin.clone(),
                resolver,
            ),
            strategies,
            cache,
            guard: ConcurrencyGuard::new(settings.max_concurrent),
            in_flight: InFlight::new(),
            retry: RetryController::new(RetryPolicy::from(&settings.retry)),
            verifier,
            settings,
        })
    }
}

impl ExtractService {
    pub fn builder(settings: Settings) -> ExtractServiceBuilder {
        ExtractServiceBuilder {
            settings,
            strategies: StrategySet::new(),
            default_strategies: false,
            resolver: None,
            probe: None,
            clock: None,
        }
    }

    /// Service with every built-in strategy and real network clients.
    pub fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        Self::builder(settings).with_default_strategies().build()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Start the periodic cache sweep.
    pub fn spawn_cache_sweeper(&self) -> JoinHandle<()> {
        let every = std::time::Duration::from_secs(self.settings.cache_sweep_secs.max(1));
        Arc::clone(&self.cache).spawn_sweeper(every)
    }

    /// Run one extraction request end to end.
    #[instrument(skip_all, fields(url = %request.source_url, source = %source))]
    pub async fn extract(&self, source: Source, request: &ExtractionRequest) -> ExtractResult<Outcome> {
        if request.source_url.trim().is_empty() {
            return Err(ExtractError::InvalidUrl("URL is required".to_string()));
        }
        let _permit = self.guard.try_enter()?;

        let key = cache_key(source, &request.source_url);
        if !request.force {
            if let Some(record) = self.cache.get(&key) {
                info!("Cache hit");
                return Ok(Outcome::Cached(record));
            }
        }

        let Some(_claim) = self.in_flight.try_claim(&key) else {
            info!("Already in progress");
            return Ok(Outcome::InProgress {
                retry: request.attempt.saturating_add(1),
            });
        };

        let target = self.normalizer.normalize(source, &request.source_url).await?;
        let hint = request.strategy_hint;
        let target = &target;
        let report = self
            .retry
            .run(request.attempt, move |attempt| async move {
                self.attempt_once(target, hint, attempt).await
            })
            .await;

        let record = report.result?;
        self.cache.put(&key, record.clone());
        info!(
            "Extracted {} via {} in {} attempt(s)",
            record.download_url, record.method_used, report.attempts
        );
        Ok(Outcome::Fresh {
            record,
            attempts: report.attempts,
        })
    }

    /// One pass: strategy chain, extractor, verification.
    async fn attempt_once(
        &self,
        target: &Target,
        hint: StrategyHint,
        attempt: u32,
    ) -> ExtractResult<MediaRecord> {
        let chain = self
            .strategies
            .chain(target.source, &plan(target.source, hint, attempt));
        info!(
            "Attempt {} with {:?} (budget {}s)",
            attempt,
            chain.kinds(),
            chain.budget().as_secs()
        );
        let page = chain.run(target).await?;

        let ctx = match target.source {
            Source::FileLocker => PageContext::FileLocker(FileLockerContext {
                site: self.normalizer.file_locker(),
                page_url: &target.canonical_url,
                file_key: target.file_key.as_deref(),
                name_hint: target.name_hint.as_deref(),
                synthetic: self.settings.synthetic_fallback,
            }),
            Source::Pin => PageContext::Pin {
                pin_url: &target.canonical_url,
            },
        };
        let record = extract::extract_record(&page, &ctx)?;
        self.verify(target, record).await
    }

    async fn verify(&self, target: &Target, mut record: MediaRecord) -> ExtractResult<MediaRecord> {
        let Some(verifier) = &self.verifier else {
            return Ok(record);
        };

        let reason = match verifier.check(&record.download_url).await {
            Verification::Reachable { filename } => {
                record.verified = Some(true);
                if let Some(name) = filename.filter(|_| record.name == UNKNOWN) {
                    record.set_name(name);
                }
                return Ok(record);
            }
            Verification::Unreachable(reason) => reason,
        };
        warn!("Download link {} unreachable: {}", record.download_url, reason);

        match verifier.policy() {
            VerifyPolicy::Discard => Err(ExtractError::VerificationFailed(reason)),
            VerifyPolicy::Synthesize if target.source == Source::FileLocker => {
                if let Some(key) = target.file_key.as_deref() {
                    let name = (record.name != UNKNOWN).then_some(record.name.as_str());
                    let guess = synthetic_download_url(
                        self.normalizer.file_locker().primary_host(),
                        key,
                        name,
                    );
                    if let Verification::Reachable { .. } = verifier.check(&guess).await {
                        info!("Mirror guess {} answered, using it", guess);
                        record.download_url = guess;
                        record.method_used = "synthetic".to_string();
                        record.verified = Some(true);
                        return Ok(record);
                    }
                }
                record.verified = Some(false);
                Ok(record)
            }
            _ => {
                record.verified = Some(false);
                Ok(record)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use reqwest::StatusCode;

    use crate::models::{RetrievedPage, StrategyKind};
    use crate::scrapers::ProbeResponse;

    const FILE_URL: &str = "https://www.mediafire.com/file/abc123/somefile.zip/file";

    struct Fixed {
        html: String,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Strategy for Fixed {
        fn kind(&self) -> StrategyKind {
            StrategyKind::Http
        }

        async fn attempt(&self, target: &Target) -> ExtractResult<RetrievedPage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RetrievedPage::new(self.html.clone(), StrategyKind::Http, &target.fetch_url))
        }
    }

    struct NoRedirects;

    #[async_trait]
    impl RedirectResolver for NoRedirects {
        async fn location(&self, _url: &str) -> anyhow::Result<Option<String>> {
            Ok(None)
        }
    }

    struct StatusProbe(StatusCode);

    #[async_trait]
    impl LinkProbe for StatusProbe {
        async fn probe(&self, _url: &str) -> anyhow::Result<ProbeResponse> {
            Ok(ProbeResponse {
                status: self.0,
                headers: HashMap::new(),
            })
        }
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.retry.backoff_base_ms = 10;
        settings.retry.jitter = false;
        settings
    }

    fn service(settings: Settings, html: &str) -> (ExtractService, Arc<Fixed>, Arc<ManualClock>) {
        let strategy = Arc::new(Fixed {
            html: html.to_string(),
            calls: AtomicUsize::new(0),
        });
        let clock = Arc::new(ManualClock::new());
        let service = ExtractService::builder(settings)
            .strategy(strategy.clone())
            .resolver(Arc::new(NoRedirects))
            .probe(Arc::new(StatusProbe(StatusCode::NOT_FOUND)))
            .clock(clock.clone())
            .build()
            .unwrap();
        (service, strategy, clock)
    }

    const GOOD: &str = r#"<div class="filename">somefile.zip</div>
        <a id="downloadButton" href="https://download1.mediafire.com/abc123/somefile.zip">Download (1 MB)</a>"#;

    #[tokio::test]
    async fn test_second_call_is_cached_until_ttl() {
        let (service, strategy, clock) = service(settings(), GOOD);
        let request = ExtractionRequest::new(FILE_URL).with_hint(StrategyHint::Http);

        let first = service.extract(Source::FileLocker, &request).await.unwrap();
        assert!(matches!(first, Outcome::Fresh { attempts: 1, .. }));

        // case differences hit the same entry
        let upper = ExtractionRequest::new(FILE_URL.to_uppercase()).with_hint(StrategyHint::Http);
        let second = service.extract(Source::FileLocker, &upper).await.unwrap();
        assert!(matches!(second, Outcome::Cached(_)));
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(301));
        let third = service.extract(Source::FileLocker, &request).await.unwrap();
        assert!(matches!(third, Outcome::Fresh { .. }));
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_force_skips_cache_read() {
        let (service, strategy, _) = service(settings(), GOOD);
        let request = ExtractionRequest::new(FILE_URL).with_hint(StrategyHint::Http);
        service.extract(Source::FileLocker, &request).await.unwrap();

        let forced = request.clone().with_force(true);
        let outcome = service.extract(Source::FileLocker, &forced).await.unwrap();
        assert!(matches!(outcome, Outcome::Fresh { .. }));
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalid_url_is_not_retried() {
        let (service, strategy, _) = service(settings(), GOOD);
        let request = ExtractionRequest::new("https://example.org/nothing");
        let err = service.extract(Source::FileLocker, &request).await.unwrap_err();
        assert!(matches!(err, ExtractError::InvalidUrl(_)));
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrecognized_page_exhausts_retries() {
        let (service, strategy, _) = service(settings(), "<html><body>hi</body></html>");
        let request = ExtractionRequest::new(FILE_URL).with_hint(StrategyHint::Http);
        let err = service.extract(Source::FileLocker, &request).await.unwrap_err();
        assert!(matches!(err, ExtractError::ExtractionIncomplete(_)));
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 3);
        assert!(service.cache().is_empty());
    }

    #[tokio::test]
    async fn test_flag_policy_marks_unverified() {
        let mut settings = settings();
        settings.verify = VerifyPolicy::Flag;
        let (service, _, _) = service(settings, GOOD);
        let request = ExtractionRequest::new(FILE_URL).with_hint(StrategyHint::Http);
        let outcome = service.extract(Source::FileLocker, &request).await.unwrap();
        assert_eq!(outcome.record().unwrap().verified, Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_discard_policy_retries_then_fails() {
        let mut settings = settings();
        settings.verify = VerifyPolicy::Discard;
        let (service, strategy, _) = service(settings, GOOD);
        let request = ExtractionRequest::new(FILE_URL).with_hint(StrategyHint::Http);
        let err = service.extract(Source::FileLocker, &request).await.unwrap_err();
        assert!(matches!(err, ExtractError::VerificationFailed(_)));
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_default_deadline_covers_worst_case_auto_run() {
        let settings = Settings::default();
        let service = ExtractService::from_settings(settings.clone()).unwrap();
        let retry = &settings.retry;

        let mut worst = Duration::ZERO;
        for attempt in 0..retry.max_attempts {
            let kinds = plan(Source::FileLocker, StrategyHint::Auto, attempt);
            worst += service.strategies.chain(Source::FileLocker, &kinds).budget();
            if attempt + 1 < retry.max_attempts {
                let base = retry.backoff_base_ms;
                worst += Duration::from_millis(base * 2u64.pow(attempt) + base / 2);
            }
        }
        let deadline = Duration::from_secs(retry.deadline_secs.unwrap());
        assert!(worst < deadline, "worst case {:?} vs deadline {:?}", worst, deadline);
    }

    #[tokio::test]
    async fn test_duplicate_at_max_attempt_number_stays_in_range() {
        let (service, strategy, _) = service(settings(), GOOD);
        let request = ExtractionRequest::new(FILE_URL).with_attempt(u32::MAX);
        let _claim = service
            .in_flight
            .try_claim(&cache_key(Source::FileLocker, FILE_URL))
            .unwrap();

        let outcome = service.extract(Source::FileLocker, &request).await.unwrap();
        assert_eq!(outcome, Outcome::InProgress { retry: u32::MAX });
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 0);
    }
}
