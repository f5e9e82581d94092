use anyhow::{Context, Result};
use futures::future::BoxFuture;
use std::time::Duration;

const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_USER_AGENT: &str = concat!("spiderling/", env!("CARGO_PKG_VERSION"));

/// The capability a parser uses to perform the actual network fetch.
///
/// Kept behind a trait so tests and exotic jobs (authenticated sessions,
/// headless rendering, fixture-backed crawls) can substitute their own
/// transport without touching the execution unit.
pub trait Opener: Send + Sync {
    fn open<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String>>;
}

/// Default opener: a shared `reqwest` client with a request timeout and a
/// crawler user agent.
pub struct HttpOpener {
    client: reqwest::Client,
}

impl HttpOpener {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .context("failed to build http opener client")?;
        Ok(Self { client })
    }
}

impl Opener for HttpOpener {
    fn open<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .with_context(|| format!("fetch failed for {url}"))?;
            let response = response
                .error_for_status()
                .with_context(|| format!("fetch returned error status for {url}"))?;
            response
                .text()
                .await
                .with_context(|| format!("failed to read body of {url}"))
        })
    }
}
