//! Workload cases and their execution with failure isolation.

use crate::events::panic_message;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;

/// Future produced by one workload invocation
pub type WorkloadFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

type WorkloadFn = Arc<dyn Fn() -> WorkloadFuture + Send + Sync>;
type CleanupFn = Arc<dyn Fn() + Send + Sync>;

/// A named workload exercised by the tester, with optional cleanup.
#[derive(Clone)]
pub struct WorkloadCase {
    name: String,
    workload: WorkloadFn,
    cleanup: Option<CleanupFn>,
}

impl WorkloadCase {
    /// Create a case from an async closure.
    pub fn new<F, Fut>(name: impl Into<String>, workload: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            workload: Arc::new(move || Box::pin(workload()) as WorkloadFuture),
            cleanup: None,
        }
    }

    /// Run `cleanup` after every successful invocation.
    #[must_use]
    pub fn with_cleanup<F>(mut self, cleanup: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.cleanup = Some(Arc::new(cleanup));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_cleanup(&self) -> bool {
        self.cleanup.is_some()
    }

    /// Run the workload to completion, turning a panic into a failure.
    ///
    /// The future is polled in place rather than spawned: dropping the
    /// caller drops the workload with it, so none outlives its run.
    pub(crate) async fn execute(&self) -> Result<(), String> {
        let future = panic::catch_unwind(AssertUnwindSafe(|| (self.workload)()))
            .map_err(|payload| format!("panicked: {}", panic_message(payload.as_ref())))?;

        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("{e:#}")),
            Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
        }
    }

    /// Invoke the cleanup hook, if any.
    pub(crate) fn run_cleanup(&self) -> Result<(), String> {
        let Some(cleanup) = &self.cleanup else {
            return Ok(());
        };
        panic::catch_unwind(AssertUnwindSafe(|| cleanup()))
            .map_err(|payload| format!("cleanup panicked: {}", panic_message(payload.as_ref())))
    }
}

impl fmt::Debug for WorkloadCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkloadCase")
            .field("name", &self.name)
            .field("cleanup", &self.cleanup.is_some())
            .finish()
    }
}
