use anyhow::Error as AnyError;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Aggregate failure state for a worker pool.
///
/// A failed or panicked worker terminates only itself; its siblings keep
/// draining the queue until the pool-wide join. The ledger keeps the first
/// error (later ones are logged and counted) so `JobLoader::run` can surface
/// what went wrong instead of silently swallowing partial failure.
#[derive(Clone, Default)]
pub struct FailureLedger {
    inner: Arc<LedgerInner>,
}

#[derive(Default)]
struct LedgerInner {
    failed: AtomicBool,
    failures: AtomicUsize,
    first_error: Mutex<Option<CapturedError>>,
}

#[derive(Clone)]
struct CapturedError {
    inner: Arc<AnyError>,
}

impl fmt::Debug for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CapturedError").field(&self.inner).finish()
    }
}

impl fmt::Display for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.inner.as_ref(), f)
    }
}

impl std::error::Error for CapturedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner.as_ref().as_ref())
    }
}

impl FailureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one worker failure. Only the first error is kept.
    pub fn record(&self, worker_id: usize, error: AnyError) {
        self.inner.failures.fetch_add(1, Ordering::SeqCst);

        if self.inner.failed.swap(true, Ordering::SeqCst) {
            tracing::error!(
                worker = worker_id,
                error = %error,
                "additional worker failure recorded"
            );
            return;
        }

        tracing::error!(worker = worker_id, error = %error, "worker failure recorded");
        let mut slot = self
            .inner
            .first_error
            .lock()
            .expect("failure ledger mutex poisoned");
        *slot = Some(CapturedError {
            inner: Arc::new(error),
        });
    }

    pub fn has_failures(&self) -> bool {
        self.inner.failed.load(Ordering::SeqCst)
    }

    pub fn failure_count(&self) -> usize {
        self.inner.failures.load(Ordering::SeqCst)
    }

    /// First recorded error, if any.
    pub fn error(&self) -> Option<AnyError> {
        self.inner
            .first_error
            .lock()
            .expect("failure ledger mutex poisoned")
            .as_ref()
            .map(|error| error.clone().into())
    }
}
