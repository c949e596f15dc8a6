//! Job handler abstraction
//!
//! Users supply either an async closure or a blocking closure. Both are
//! stored as a [`JobHandler`] and invoked through the same path, each call in
//! its own task so a panic surfaces as a handler failure instead of taking
//! down the dispatcher.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::command::JobClient;
use crate::job::Job;

/// Result returned by a job handler
pub type HandlerResult = anyhow::Result<()>;

/// Job client handed to a handler alongside each job
pub type JobClientRef = Arc<dyn JobClient>;

type AsyncHandlerFn = dyn Fn(JobClientRef, Job) -> BoxFuture<'static, HandlerResult> + Send + Sync;
type BlockingHandlerFn = dyn Fn(JobClientRef, Job) -> HandlerResult + Send + Sync;

/// Business logic invoked for each activated job
#[derive(Clone)]
pub enum JobHandler {
    /// Runs on the async runtime
    Async(Arc<AsyncHandlerFn>),
    /// Runs on the blocking thread pool
    Blocking(Arc<BlockingHandlerFn>),
}

impl JobHandler {
    /// Wrap an async closure
    pub fn from_async<F, Fut>(handler: F) -> Self
    where
        F: Fn(JobClientRef, Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self::Async(Arc::new(move |client, job| handler(client, job).boxed()))
    }

    /// Wrap a blocking closure
    pub fn from_blocking<F>(handler: F) -> Self
    where
        F: Fn(JobClientRef, Job) -> HandlerResult + Send + Sync + 'static,
    {
        Self::Blocking(Arc::new(handler))
    }

    /// Run the handler for one job and wait for it to finish
    ///
    /// A panicking handler yields an error with the message "handler panicked".
    pub async fn invoke(&self, client: JobClientRef, job: Job) -> HandlerResult {
        let joined = match self {
            Self::Async(handler) => tokio::spawn(handler(client, job)).await,
            Self::Blocking(handler) => {
                let handler = Arc::clone(handler);
                tokio::task::spawn_blocking(move || handler(client, job)).await
            }
        };

        match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(anyhow::anyhow!("handler panicked")),
            Err(e) => Err(anyhow::anyhow!("handler task failed: {e}")),
        }
    }
}

impl std::fmt::Debug for JobHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Async(_) => f.write_str("JobHandler::Async"),
            Self::Blocking(_) => f.write_str("JobHandler::Blocking"),
        }
    }
}
