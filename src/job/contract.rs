use crate::job::opener::Opener;
use crate::job::patterns::UrlPatterns;
use crate::job::work::{Bundle, WorkItem};
use anyhow::Result;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;

pub type JobFuture<'a> = BoxFuture<'a, Result<()>>;

/// One credential set for the optional login procedure; the loader picks one
/// uniformly at random from the configured list before any worker starts.
pub type LoginCredential = HashMap<String, String>;

/// The job definition contract supplied to the loader by dependency
/// injection: the URL-pattern registry, the fetch opener, the bundle
/// constructor, and the optional login procedure. Implementations are
/// immutable once handed to the loader.
pub trait CrawlJob: Send + Sync + 'static {
    /// Registry used both to resolve parsers and to scope discovered links.
    fn patterns(&self) -> &UrlPatterns;

    /// Fetch capability handed to every parser invocation.
    fn opener(&self) -> Arc<dyn Opener>;

    /// Expands a bundle seed into its unit of work. Only invoked when the
    /// job runs in bundle mode.
    fn make_unit(&self, seed: &WorkItem) -> Box<dyn Bundle>;

    /// Whether [`CrawlJob::login`] must run before workers start. Jobs that
    /// return `true` require a credential list in the configuration.
    fn requires_login(&self) -> bool {
        false
    }

    /// Performs the login procedure with the chosen credential set.
    fn login<'a>(&'a self, _credential: &'a LoginCredential) -> JobFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}
