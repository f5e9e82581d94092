//! Scripted crawl jobs for pipeline tests: an in-memory page map drives the
//! parser, bundles expand from a seed table, and individual URLs can be
//! gated (to hold a parse in flight) or failed on purpose.

use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use spiderling::{Bundle, CrawlJob, Opener, ParseResult, Parser, UrlPatterns, WorkItem};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Two-phase latch: the parser announces it entered the gated URL, the test
/// releases it when ready.
#[derive(Default)]
pub struct Gate {
    entered: AtomicBool,
    entered_notify: Notify,
    released: AtomicBool,
    release_notify: Notify,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn wait_entered(&self) {
        loop {
            let notified = self.entered_notify.notified();
            if self.entered.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }

    pub fn open(&self) {
        self.released.store(true, Ordering::SeqCst);
        self.release_notify.notify_waiters();
    }

    async fn pass(&self) {
        self.entered.store(true, Ordering::SeqCst);
        self.entered_notify.notify_waiters();
        loop {
            let notified = self.release_notify.notified();
            if self.released.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

struct NullOpener;

impl Opener for NullOpener {
    fn open<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async { Ok(String::new()) })
    }
}

pub struct MapParser {
    pages: HashMap<String, ParseResult>,
    failures: Vec<String>,
    gates: HashMap<String, Arc<Gate>>,
    visited: Mutex<Vec<String>>,
}

impl Parser for MapParser {
    fn parse<'a>(
        &'a self,
        _opener: Arc<dyn Opener>,
        url: &'a str,
    ) -> BoxFuture<'a, Result<ParseResult>> {
        Box::pin(async move {
            self.visited.lock().unwrap().push(url.to_owned());
            if let Some(gate) = self.gates.get(url) {
                gate.pass().await;
            }
            if self.failures.iter().any(|failure| failure == url) {
                return Err(anyhow!("scripted failure for {url}"));
            }
            Ok(self.pages.get(url).cloned().unwrap_or_default())
        })
    }
}

struct ListBundle(Vec<String>);

impl Bundle for ListBundle {
    fn urls(&self) -> Vec<String> {
        self.0.clone()
    }
}

/// Scripted job covering both execution modes. Built via [`TestJobBuilder`].
pub struct TestJob {
    patterns: UrlPatterns,
    parser: Arc<MapParser>,
    bundles: HashMap<String, Vec<String>>,
}

impl TestJob {
    pub fn builder() -> TestJobBuilder {
        TestJobBuilder::default()
    }

    /// URLs the parser has been invoked on, in invocation order.
    pub fn visited(&self) -> Vec<String> {
        self.parser.visited.lock().unwrap().clone()
    }
}

impl CrawlJob for TestJob {
    fn patterns(&self) -> &UrlPatterns {
        &self.patterns
    }

    fn opener(&self) -> Arc<dyn Opener> {
        Arc::new(NullOpener)
    }

    fn make_unit(&self, seed: &WorkItem) -> Box<dyn Bundle> {
        Box::new(ListBundle(
            self.bundles
                .get(seed.as_str())
                .cloned()
                .unwrap_or_else(|| vec![seed.as_str().to_owned()]),
        ))
    }
}

#[derive(Default)]
pub struct TestJobBuilder {
    pattern: Option<String>,
    pages: HashMap<String, ParseResult>,
    failures: Vec<String>,
    gates: HashMap<String, Arc<Gate>>,
    bundles: HashMap<String, Vec<String>>,
}

impl TestJobBuilder {
    /// Overrides the single registry pattern (default: `^http://site\.test/`).
    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn page(mut self, url: impl Into<String>, result: ParseResult) -> Self {
        self.pages.insert(url.into(), result);
        self
    }

    pub fn fail(mut self, url: impl Into<String>) -> Self {
        self.failures.push(url.into());
        self
    }

    pub fn gate(mut self, url: impl Into<String>, gate: Arc<Gate>) -> Self {
        self.gates.insert(url.into(), gate);
        self
    }

    pub fn bundle(mut self, seed: impl Into<String>, urls: Vec<String>) -> Self {
        self.bundles.insert(seed.into(), urls);
        self
    }

    pub fn build(self) -> Arc<TestJob> {
        let parser = Arc::new(MapParser {
            pages: self.pages,
            failures: self.failures,
            gates: self.gates,
            visited: Mutex::new(Vec::new()),
        });
        let pattern = self
            .pattern
            .unwrap_or_else(|| r"^http://site\.test/".to_owned());
        let patterns = UrlPatterns::new()
            .register(&pattern, parser.clone())
            .expect("test pattern should compile");

        Arc::new(TestJob {
            patterns,
            parser,
            bundles: self.bundles,
        })
    }
}
