use crate::job::opener::Opener;
use anyhow::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// One unit of work pulled from the queue: a raw URL in single mode, a
/// bundle seed in bundle mode. Re-produced verbatim when requeued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItem(String);

impl WorkItem {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkItem {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for WorkItem {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// What a single parser invocation discovered: follow-up URLs (consumed
/// depth-first within the current bundle) and fresh bundle seeds (pushed to
/// the queue immediately). Either list may be empty.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParseResult {
    pub urls: Vec<String>,
    pub seeds: Vec<String>,
}

impl ParseResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_urls(urls: Vec<String>) -> Self {
        Self {
            urls,
            seeds: Vec::new(),
        }
    }
}

pub type ParseFuture<'a> = BoxFuture<'a, Result<ParseResult>>;

/// Fetches and interprets one URL. Resolved per URL through the job's
/// [`UrlPatterns`](crate::job::patterns::UrlPatterns) registry; the opener
/// performs the actual network fetch.
pub trait Parser: Send + Sync {
    fn parse<'a>(&'a self, opener: Arc<dyn Opener>, url: &'a str) -> ParseFuture<'a>;
}

/// A seed expanded, via a job-supplied rule, into the ordered URL list that
/// makes up one logical unit of work. Lives for a single execution-unit
/// invocation.
pub trait Bundle: Send {
    fn urls(&self) -> Vec<String>;
}
