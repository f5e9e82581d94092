use crate::job::contract::CrawlJob;
use crate::job::work::{ParseResult, WorkItem};
use crate::loader::accountant::CompletionAccountant;
use crate::loader::budget::{BudgetGate, BudgetThrottle};
use crate::loader::slots::InFlightSlots;
use crate::queue::work_queue::WorkQueue;
use crate::runtime::telemetry::Telemetry;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// State shared by every worker loop of one loader.
#[derive(Clone)]
pub(crate) struct WorkerShared {
    pub(crate) job: Arc<dyn CrawlJob>,
    pub(crate) queue: Arc<WorkQueue>,
    pub(crate) budget: Arc<BudgetThrottle>,
    pub(crate) accountant: Arc<CompletionAccountant>,
    pub(crate) slots: Arc<InFlightSlots>,
    pub(crate) stop: CancellationToken,
    pub(crate) telemetry: Arc<Telemetry>,
    pub(crate) poll_backoff: Duration,
    pub(crate) bundle_mode: bool,
    pub(crate) debug: bool,
}

/// One worker loop: poll the queue, drive the execution unit, obey the
/// accountant's stop decision. Cancellation is cooperative; an in-progress
/// parse always runs to completion before the stop flag takes effect.
pub(crate) struct Worker {
    id: usize,
    shared: WorkerShared,
}

impl Worker {
    pub(crate) fn new(id: usize, shared: WorkerShared) -> Self {
        Self { id, shared }
    }

    #[tracing::instrument(name = "worker", skip_all, fields(worker = self.id))]
    pub(crate) async fn run(self) -> Result<()> {
        tracing::info!("worker loop started");

        loop {
            if self.shared.stop.is_cancelled() {
                tracing::info!("stop flag set; exiting worker loop");
                break;
            }

            let Some(item) = self.shared.queue.get() else {
                self.shared.telemetry.record_empty_poll();
                tokio::select! {
                    _ = tokio::time::sleep(self.shared.poll_backoff) => {}
                    _ = self.shared.stop.cancelled() => {}
                }
                continue;
            };

            tracing::debug!(item = %item, "checked out work item");
            self.shared.slots.set(self.id, item.clone());

            if self.execute(&item).await? {
                tracing::info!("accountant signalled stop; exiting worker loop");
                break;
            }
        }

        tracing::info!("worker loop exited");
        Ok(())
    }

    /// Runs the fetch/parse/enqueue state machine for one work item and
    /// returns the accountant's stop decision.
    async fn execute(&self, item: &WorkItem) -> Result<bool> {
        if self.shared.bundle_mode {
            self.process_bundle(item).await?;
        } else {
            self.process_single(item).await?;
        }
        self.shared.accountant.complete(self.id, item).await
    }

    async fn process_bundle(&self, seed: &WorkItem) -> Result<()> {
        let unit = self.shared.job.make_unit(seed);
        let mut pending = unit.urls();

        while !pending.is_empty() && !self.shared.stop.is_cancelled() {
            let url = pending.remove(0);

            let Some(parser) = self.shared.job.patterns().parser_for(&url) else {
                tracing::trace!(url, "no parser matches; skipping");
                continue;
            };

            if self.shared.budget.acquire().await? == BudgetGate::Stopped {
                break;
            }

            match parser.parse(self.shared.job.opener(), &url).await {
                Ok(ParseResult { urls, seeds }) => {
                    let mut discovered = self.shared.job.patterns().matches(urls);
                    self.shared
                        .telemetry
                        .record_discovered(discovered.len(), seeds.len());

                    // Depth-first: fresh discoveries run before the rest of
                    // this bundle's pending list.
                    discovered.extend(pending.drain(..));
                    pending = discovered;

                    if !seeds.is_empty() {
                        self.push_discovered(seeds.into_iter().map(WorkItem::new))?;
                    }
                }
                Err(err) => self.handle_parse_error(seed, &url, err)?,
            }
        }

        Ok(())
    }

    async fn process_single(&self, item: &WorkItem) -> Result<()> {
        if self.shared.budget.acquire().await? == BudgetGate::Stopped {
            return Ok(());
        }

        let Some(parser) = self.shared.job.patterns().parser_for(item.as_str()) else {
            tracing::trace!(item = %item, "no parser matches; skipping");
            return Ok(());
        };

        match parser.parse(self.shared.job.opener(), item.as_str()).await {
            Ok(result) => {
                let followups = self.shared.job.patterns().matches(result.urls);
                self.shared.telemetry.record_discovered(followups.len(), 0);
                if !followups.is_empty() {
                    self.push_discovered(followups.into_iter().map(WorkItem::new))?;
                }
            }
            Err(err) => self.handle_parse_error(item, item.as_str(), err)?,
        }

        Ok(())
    }

    fn push_discovered<I>(&self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = WorkItem>,
    {
        match self.shared.queue.put(items) {
            Ok(_) => Ok(()),
            Err(err) if self.shared.stop.is_cancelled() => {
                // Shutdown race: the queue was released while this parse was
                // still in flight. The discoveries are dropped with the run.
                tracing::debug!(error = %err, "dropping discoveries after shutdown");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn handle_parse_error(&self, item: &WorkItem, url: &str, err: anyhow::Error) -> Result<()> {
        self.shared.telemetry.record_parse_error();
        tracing::error!(item = %item, url, error = ?err, "failed to process work item");

        if self.shared.debug {
            return Err(err).with_context(|| format!("processing {item} failed in debug mode"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::contract::CrawlJob;
    use crate::job::opener::Opener;
    use crate::job::patterns::UrlPatterns;
    use crate::job::work::{Bundle, ParseFuture, Parser};
    use crate::queue::work_queue::{QueueTopology, WorkQueueOptions};
    use crate::rpc::node::NodeIdentity;
    use anyhow::anyhow;
    use futures::future::BoxFuture;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct NullOpener;

    impl Opener for NullOpener {
        fn open<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, Result<String>> {
            Box::pin(async { Ok(String::new()) })
        }
    }

    #[derive(Default)]
    struct ScriptedParser {
        pages: HashMap<String, ParseResult>,
        failures: Vec<String>,
        visited: Mutex<Vec<String>>,
    }

    impl Parser for ScriptedParser {
        fn parse<'a>(&'a self, _opener: Arc<dyn Opener>, url: &'a str) -> ParseFuture<'a> {
            Box::pin(async move {
                self.visited.lock().unwrap().push(url.to_owned());
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

    struct ScriptedJob {
        patterns: UrlPatterns,
        parser: Arc<ScriptedParser>,
        bundles: HashMap<String, Vec<String>>,
    }

    impl ScriptedJob {
        fn new(parser: ScriptedParser, bundles: HashMap<String, Vec<String>>) -> Self {
            let parser = Arc::new(parser);
            let patterns = UrlPatterns::new()
                .register(r"^http://site\.test/", parser.clone())
                .expect("pattern should compile");
            Self {
                patterns,
                parser,
                bundles,
            }
        }

        fn visited(&self) -> Vec<String> {
            self.parser.visited.lock().unwrap().clone()
        }
    }

    impl CrawlJob for ScriptedJob {
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

    fn test_queue() -> (tempfile::TempDir, Arc<WorkQueue>) {
        let dir = tempfile::tempdir().expect("temp dir");
        let local = NodeIdentity::new("127.0.0.1", 11300);
        let queue = Arc::new(
            WorkQueue::new(WorkQueueOptions {
                store_dir: dir.path().join("store"),
                backup_dir: dir.path().join("backup"),
                topology: QueueTopology {
                    nodes: vec![local.clone()],
                    local,
                    copies: 1,
                },
                existence_hook: None,
            })
            .expect("queue should open"),
        );
        (dir, queue)
    }

    fn worker_for(job: Arc<dyn CrawlJob>, queue: Arc<WorkQueue>, debug: bool) -> Worker {
        let stop = CancellationToken::new();
        let telemetry = Arc::new(Telemetry::default());
        let slots = Arc::new(InFlightSlots::new(1));
        let shared = WorkerShared {
            job,
            queue,
            budget: Arc::new(BudgetThrottle::new(
                None,
                0,
                Duration::from_millis(1),
                stop.clone(),
                telemetry.clone(),
            )),
            accountant: Arc::new(CompletionAccountant::new(
                0,
                None,
                slots.clone(),
                stop.clone(),
                telemetry.clone(),
            )),
            slots,
            stop,
            telemetry,
            poll_backoff: Duration::from_millis(5),
            bundle_mode: true,
            debug,
        };
        Worker::new(0, shared)
    }

    #[tokio::test]
    async fn bundle_discoveries_run_depth_first() {
        let mut parser = ScriptedParser::default();
        parser.pages.insert(
            "http://site.test/u1".into(),
            ParseResult::with_urls(vec!["http://site.test/u3".into()]),
        );
        let job = Arc::new(ScriptedJob::new(
            parser,
            HashMap::from([(
                "seed".to_string(),
                vec!["http://site.test/u1".into(), "http://site.test/u2".into()],
            )]),
        ));

        let (_dir, queue) = test_queue();
        let worker = worker_for(job.clone(), queue, false);
        worker
            .process_bundle(&WorkItem::new("seed"))
            .await
            .expect("bundle should process");

        assert_eq!(
            job.visited(),
            vec![
                "http://site.test/u1".to_string(),
                "http://site.test/u3".to_string(),
                "http://site.test/u2".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn discovered_seeds_are_queued_immediately() {
        let mut parser = ScriptedParser::default();
        parser.pages.insert(
            "http://site.test/u1".into(),
            ParseResult {
                urls: Vec::new(),
                seeds: vec!["seed-2".into()],
            },
        );
        let job = Arc::new(ScriptedJob::new(
            parser,
            HashMap::from([("seed".to_string(), vec!["http://site.test/u1".into()])]),
        ));

        let (_dir, queue) = test_queue();
        let worker = worker_for(job, queue.clone(), false);
        worker
            .process_bundle(&WorkItem::new("seed"))
            .await
            .expect("bundle should process");

        assert_eq!(queue.snapshot(), vec![WorkItem::new("seed-2")]);
    }

    #[tokio::test]
    async fn out_of_scope_discoveries_are_dropped() {
        let mut parser = ScriptedParser::default();
        parser.pages.insert(
            "http://site.test/u1".into(),
            ParseResult::with_urls(vec![
                "http://offsite.test/x".into(),
                "http://site.test/u2".into(),
            ]),
        );
        let job = Arc::new(ScriptedJob::new(
            parser,
            HashMap::from([("seed".to_string(), vec!["http://site.test/u1".into()])]),
        ));

        let (_dir, queue) = test_queue();
        let worker = worker_for(job.clone(), queue, false);
        worker
            .process_bundle(&WorkItem::new("seed"))
            .await
            .expect("bundle should process");

        assert_eq!(
            job.visited(),
            vec![
                "http://site.test/u1".to_string(),
                "http://site.test/u2".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn parse_failures_are_swallowed_outside_debug_mode() {
        let mut parser = ScriptedParser::default();
        parser.failures.push("http://site.test/u1".into());
        let job = Arc::new(ScriptedJob::new(
            parser,
            HashMap::from([(
                "seed".to_string(),
                vec!["http://site.test/u1".into(), "http://site.test/u2".into()],
            )]),
        ));

        let (_dir, queue) = test_queue();
        let worker = worker_for(job.clone(), queue, false);
        worker
            .process_bundle(&WorkItem::new("seed"))
            .await
            .expect("failure should be swallowed");

        assert_eq!(job.visited().len(), 2, "remaining urls still processed");
    }

    #[tokio::test]
    async fn parse_failures_abort_the_bundle_in_debug_mode() {
        let mut parser = ScriptedParser::default();
        parser.failures.push("http://site.test/u1".into());
        let job = Arc::new(ScriptedJob::new(
            parser,
            HashMap::from([(
                "seed".to_string(),
                vec!["http://site.test/u1".into(), "http://site.test/u2".into()],
            )]),
        ));

        let (_dir, queue) = test_queue();
        let worker = worker_for(job.clone(), queue, true);
        let err = worker
            .process_bundle(&WorkItem::new("seed"))
            .await
            .expect_err("debug mode should propagate");

        assert!(format!("{err:#}").contains("debug mode"));
        assert_eq!(job.visited().len(), 1, "bundle aborted at the failure");
    }
}
