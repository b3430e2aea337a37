//! Retrieval strategies and the chain that runs them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::normalize::Target;
use crate::error::{ExtractError, ExtractResult};
use crate::extract;
use crate::models::{RetrievedPage, Source, StrategyHint, StrategyKind};
use crate::scrapers::{html_title, is_challenge_page};

/// Outer bound on one strategy attempt when it does not set its own.
pub const DEFAULT_STRATEGY_TIMEOUT: Duration = Duration::from_secs(45);

/// One way of turning a target into page HTML.
///
/// Implementations report every failure as an [`ExtractError`]; nothing
/// else crosses this seam.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Whether this strategy can do anything for the source.
    fn supports(&self, _source: Source) -> bool {
        true
    }

    fn timeout(&self) -> Duration {
        DEFAULT_STRATEGY_TIMEOUT
    }

    async fn attempt(&self, target: &Target) -> ExtractResult<RetrievedPage>;
}

/// How one strategy's attempt turned out.
#[derive(Debug)]
pub enum StrategyOutcome {
    /// Page has the structure the extractor reads.
    Usable(RetrievedPage),
    /// Real HTML, but nothing the extractor recognizes.
    Unrecognized(RetrievedPage),
    Failed(ExtractError),
}

/// Sort a fetched page into usable, unrecognized, or failed.
///
/// A page still offering the repair link is never usable on its own, so the
/// chain goes on to the repair flow.
pub fn classify(source: Source, page: RetrievedPage) -> StrategyOutcome {
    if page.resolved_url.is_some() {
        return StrategyOutcome::Usable(page);
    }
    if page.html.trim().is_empty() {
        return StrategyOutcome::Failed(ExtractError::RetrievalFailed(format!(
            "{} returned an empty page",
            page.strategy_used
        )));
    }
    if extract::needs_repair(source, &page.html) {
        debug!("{} page offers a repair link", page.strategy_used);
        return StrategyOutcome::Unrecognized(page);
    }
    if extract::recognizes(source, &page.html) {
        return StrategyOutcome::Usable(page);
    }
    let title = html_title(&page.html);
    if is_challenge_page(title.as_deref(), &page.html) {
        return StrategyOutcome::Failed(ExtractError::RetrievalFailed(format!(
            "{} hit a bot challenge",
            page.strategy_used
        )));
    }
    StrategyOutcome::Unrecognized(page)
}

/// Strategy kinds to run for a request, in order.
///
/// `Auto` starts with the cheap fetches and escalates on later attempts:
/// attempt 0 runs everything, attempt 1 drops plain HTTP, and from attempt 2
/// on only the browser-driven strategies run.
pub fn plan(source: Source, hint: StrategyHint, attempt: u32) -> Vec<StrategyKind> {
    use StrategyKind::*;

    let mut kinds = match (hint, source) {
        (StrategyHint::Auto, _) => match attempt {
            0 => vec![Http, Bypass, Browser],
            1 => vec![Bypass, Browser],
            _ => vec![Browser],
        },
        (StrategyHint::Http, _) | (StrategyHint::Direct, Source::Pin) => vec![Http],
        (StrategyHint::Bypass, _) => vec![Bypass],
        (StrategyHint::Browser, _) => vec![Browser],
        (StrategyHint::Direct, Source::FileLocker) => vec![Direct],
    };
    if hint == StrategyHint::Auto && source == Source::FileLocker {
        kinds.push(Repair);
    }
    kinds
}

/// Registered strategies by kind.
#[derive(Clone, Default)]
pub struct StrategySet {
    strategies: HashMap<StrategyKind, Arc<dyn Strategy>>,
}

impl StrategySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a strategy, replacing any of the same kind.
    pub fn insert(&mut self, strategy: Arc<dyn Strategy>) {
        self.strategies.insert(strategy.kind(), strategy);
    }

    pub fn kinds(&self) -> Vec<StrategyKind> {
        self.strategies.keys().copied().collect()
    }

    /// Take every strategy from `other`, overriding ones of the same kind.
    pub fn merge(&mut self, other: StrategySet) {
        self.strategies.extend(other.strategies);
    }

    /// Chain of the registered strategies among `kinds` that support `source`.
    pub fn chain(&self, source: Source, kinds: &[StrategyKind]) -> StrategyChain {
        let strategies = kinds
            .iter()
            .filter_map(|kind| self.strategies.get(kind))
            .filter(|s| s.supports(source))
            .cloned()
            .collect();
        StrategyChain::new(strategies)
    }
}

/// Runs strategies in order until one yields a usable page.
pub struct StrategyChain {
    strategies: Vec<Arc<dyn Strategy>>,
}

impl StrategyChain {
    pub fn new(strategies: Vec<Arc<dyn Strategy>>) -> Self {
        Self { strategies }
    }

    pub fn kinds(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Longest the chain can take when every strategy runs to its timeout.
    pub fn budget(&self) -> Duration {
        self.strategies.iter().map(|s| s.timeout()).sum()
    }

    /// First usable page wins. When none is usable but some strategy got
    /// real HTML, the last such page is returned so the extractor can say
    /// what it did not find. If every strategy timed out the last timeout is
    /// returned; any other mix of failures is folded into one
    /// `RetrievalFailed`.
    pub async fn run(&self, target: &Target) -> ExtractResult<RetrievedPage> {
        if self.strategies.is_empty() {
            return Err(ExtractError::RetrievalFailed(
                "no retrieval strategy available".to_string(),
            ));
        }

        let mut fallback = None;
        let mut failures = Vec::new();
        let mut last_timeout = None;
        let mut all_timed_out = true;

        for strategy in &self.strategies {
            let kind = strategy.kind();
            debug!("Trying {} for {}", kind, target.fetch_url);

            let outcome = match tokio::time::timeout(strategy.timeout(), strategy.attempt(target)).await
            {
                Ok(Ok(page)) => classify(target.source, page),
                Ok(Err(e)) => StrategyOutcome::Failed(e),
                Err(_) => StrategyOutcome::Failed(ExtractError::UpstreamTimeout(strategy.timeout())),
            };
            if !matches!(outcome, StrategyOutcome::Failed(ExtractError::UpstreamTimeout(_))) {
                all_timed_out = false;
            }

            match outcome {
                StrategyOutcome::Usable(page) => {
                    info!(
                        "{} produced a usable page for {} (fetched {})",
                        kind,
                        target.canonical_url,
                        page.fetched_at.format("%H:%M:%S%.3f")
                    );
                    return Ok(page);
                }
                StrategyOutcome::Unrecognized(page) => {
                    debug!("{} page not recognized", kind);
                    fallback = Some(page);
                }
                StrategyOutcome::Failed(e) => {
                    warn!("{} failed: {}", kind, e);
                    failures.push(format!("{}: {}", kind, e));
                    if let ExtractError::UpstreamTimeout(after) = e {
                        last_timeout = Some(after);
                    }
                }
            }
        }

        if let Some(page) = fallback {
            return Ok(page);
        }
        match last_timeout {
            Some(after) if all_timed_out => Err(ExtractError::UpstreamTimeout(after)),
            _ => Err(ExtractError::RetrievalFailed(failures.join("; "))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        kind: StrategyKind,
        html: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(kind: StrategyKind, html: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                kind,
                html,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Strategy for Scripted {
        fn kind(&self) -> StrategyKind {
            self.kind
        }

        async fn attempt(&self, target: &Target) -> ExtractResult<RetrievedPage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.html {
                Some(html) => Ok(RetrievedPage::new(html.to_string(), self.kind, &target.fetch_url)),
                None => Err(ExtractError::RetrievalFailed("connection reset".to_string())),
            }
        }
    }

    /// Sleeps past its own timeout on every attempt.
    struct Stalled {
        kind: StrategyKind,
    }

    #[async_trait]
    impl Strategy for Stalled {
        fn kind(&self) -> StrategyKind {
            self.kind
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(10)
        }

        async fn attempt(&self, target: &Target) -> ExtractResult<RetrievedPage> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(RetrievedPage::new(USABLE.to_string(), self.kind, &target.fetch_url))
        }
    }

    /// Hands back a page with the download link already resolved.
    struct Repaired {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Strategy for Repaired {
        fn kind(&self) -> StrategyKind {
            StrategyKind::Repair
        }

        async fn attempt(&self, target: &Target) -> ExtractResult<RetrievedPage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RetrievedPage::new(BROKEN.to_string(), StrategyKind::Repair, &target.fetch_url)
                .with_resolved_url("https://download9.mediafire.com/k/x.zip".to_string()))
        }
    }

    fn target() -> Target {
        Target {
            source: Source::FileLocker,
            canonical_url: "https://www.mediafire.com/file/k/x.zip/file".to_string(),
            fetch_url: "https://www.mediafire.com/file/k/x.zip/file".to_string(),
            file_key: Some("k".to_string()),
            name_hint: Some("x.zip".to_string()),
        }
    }

    const USABLE: &str = r#"<a id="downloadButton" href="https://download1.mediafire.com/k/x.zip">Download</a>"#;
    const PLAIN: &str = "<html><body><p>Welcome</p></body></html>";
    const BROKEN: &str = r#"<div class="filename">x.zip</div>
        <p>This link is broken.</p><a class="retry-link" href="/file/k/repair">Repair</a>"#;
    const CHALLENGE: &str =
        "<html><head><title>Just a moment...</title></head><body>Checking your browser</body></html>";

    #[tokio::test]
    async fn test_chain_stops_at_first_usable_page() {
        let first = Scripted::new(StrategyKind::Http, Some(USABLE));
        let second = Scripted::new(StrategyKind::Browser, Some(USABLE));
        let chain = StrategyChain::new(vec![first.clone(), second.clone()]);

        let page = chain.run(&target()).await.unwrap();
        assert_eq!(page.strategy_used, StrategyKind::Http);
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_chain_skips_failures_and_challenges() {
        let failing = Scripted::new(StrategyKind::Http, None);
        let challenged = Scripted::new(StrategyKind::Bypass, Some(CHALLENGE));
        let browser = Scripted::new(StrategyKind::Browser, Some(USABLE));
        let chain = StrategyChain::new(vec![failing, challenged, browser]);

        let page = chain.run(&target()).await.unwrap();
        assert_eq!(page.strategy_used, StrategyKind::Browser);
    }

    #[tokio::test]
    async fn test_unrecognized_page_is_returned_when_nothing_better() {
        let chain = StrategyChain::new(vec![
            Scripted::new(StrategyKind::Http, Some(PLAIN)),
            Scripted::new(StrategyKind::Browser, None),
        ]);
        let page = chain.run(&target()).await.unwrap();
        assert_eq!(page.strategy_used, StrategyKind::Http);
    }

    #[tokio::test]
    async fn test_all_failed_is_retrieval_failed() {
        let chain = StrategyChain::new(vec![
            Scripted::new(StrategyKind::Http, None),
            Scripted::new(StrategyKind::Bypass, Some(CHALLENGE)),
        ]);
        let err = chain.run(&target()).await.unwrap_err();
        match err {
            ExtractError::RetrievalFailed(msg) => {
                assert!(msg.contains("http"));
                assert!(msg.contains("bypass"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_page_with_repair_link_moves_on_to_repair() {
        let http = Scripted::new(StrategyKind::Http, Some(BROKEN));
        let browser = Scripted::new(StrategyKind::Browser, Some(BROKEN));
        let repair = Arc::new(Repaired {
            calls: AtomicUsize::new(0),
        });
        let chain = StrategyChain::new(vec![http.clone(), browser.clone(), repair.clone()]);

        let page = chain.run(&target()).await.unwrap();
        assert_eq!(page.strategy_used, StrategyKind::Repair);
        assert_eq!(
            page.resolved_url.as_deref(),
            Some("https://download9.mediafire.com/k/x.zip")
        );
        assert_eq!(http.calls.load(Ordering::SeqCst), 1);
        assert_eq!(browser.calls.load(Ordering::SeqCst), 1);
        assert_eq!(repair.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_classify_repair_link_page() {
        let broken = RetrievedPage::new(BROKEN.to_string(), StrategyKind::Http, "https://x");
        assert!(matches!(
            classify(Source::FileLocker, broken),
            StrategyOutcome::Unrecognized(_)
        ));
        let resolved = RetrievedPage::new(BROKEN.to_string(), StrategyKind::Repair, "https://x")
            .with_resolved_url("https://download1.mediafire.com/k/x.zip".to_string());
        assert!(matches!(
            classify(Source::FileLocker, resolved),
            StrategyOutcome::Usable(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_timed_out_is_upstream_timeout() {
        let chain = StrategyChain::new(vec![
            Arc::new(Stalled {
                kind: StrategyKind::Http,
            }),
            Arc::new(Stalled {
                kind: StrategyKind::Browser,
            }),
        ]);
        let err = chain.run(&target()).await.unwrap_err();
        assert_eq!(err, ExtractError::UpstreamTimeout(Duration::from_secs(10)));
        assert_eq!(err.status_code(), axum::http::StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_mixed_with_failure_is_retrieval_failed() {
        let chain = StrategyChain::new(vec![
            Arc::new(Stalled {
                kind: StrategyKind::Http,
            }),
            Scripted::new(StrategyKind::Browser, None),
        ]);
        let err = chain.run(&target()).await.unwrap_err();
        assert!(matches!(err, ExtractError::RetrievalFailed(_)), "{:?}", err);
    }

    #[test]
    fn test_budget_sums_timeouts() {
        let chain = StrategyChain::new(vec![
            Arc::new(Stalled {
                kind: StrategyKind::Http,
            }),
            Scripted::new(StrategyKind::Browser, None),
        ]);
        assert_eq!(chain.budget(), Duration::from_secs(10) + DEFAULT_STRATEGY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_empty_chain() {
        let err = StrategyChain::new(Vec::new()).run(&target()).await.unwrap_err();
        assert!(matches!(err, ExtractError::RetrievalFailed(_)));
    }

    #[test]
    fn test_plan_escalates() {
        use StrategyKind::*;
        assert_eq!(
            plan(Source::FileLocker, StrategyHint::Auto, 0),
            vec![Http, Bypass, Browser, Repair]
        );
        assert_eq!(
            plan(Source::FileLocker, StrategyHint::Auto, 1),
            vec![Bypass, Browser, Repair]
        );
        assert_eq!(plan(Source::Pin, StrategyHint::Auto, 2), vec![Browser]);
        assert_eq!(plan(Source::Pin, StrategyHint::Auto, 9), vec![Browser]);
    }

    #[test]
    fn test_plan_honors_forced_method() {
        use StrategyKind::*;
        assert_eq!(plan(Source::FileLocker, StrategyHint::Http, 3), vec![Http]);
        assert_eq!(plan(Source::FileLocker, StrategyHint::Direct, 0), vec![Direct]);
        assert_eq!(plan(Source::Pin, StrategyHint::Direct, 0), vec![Http]);
        assert_eq!(plan(Source::Pin, StrategyHint::Bypass, 0), vec![Bypass]);
    }

    #[test]
    fn test_set_filters_unregistered_kinds() {
        let mut set = StrategySet::new();
        set.insert(Scripted::new(StrategyKind::Http, Some(USABLE)));
        let chain = set.chain(Source::Pin, &[StrategyKind::Http, StrategyKind::Browser]);
        assert_eq!(chain.kinds(), vec![StrategyKind::Http]);
    }
}
