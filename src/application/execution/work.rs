use std::future::Future;

use serde_json::Value;

use super::relay::ProgressReporter;

/// `Ok` resolves the job, `Err` rejects it with exactly that value.
pub type WorkResult = Result<Value, Value>;

/// A unit of work a Runner executes on behalf of a Caller.
///
/// Any `Fn(Vec<Value>, ProgressReporter) -> impl Future<Output = WorkResult>`
/// is a `Work`.  A job may be executed more than once if the connection it
/// arrived on is lost, so work must be safe to retry.
#[async_trait::async_trait]
pub trait Work: Send + Sync {
    async fn run(&self, arguments: Vec<Value>, progress: ProgressReporter) -> WorkResult;
}

#[async_trait::async_trait]
impl<F, Fut> Work for F
where
    F: Fn(Vec<Value>, ProgressReporter) -> Fut + Send + Sync,
    Fut: Future<Output = WorkResult> + Send,
{
    async fn run(&self, arguments: Vec<Value>, progress: ProgressReporter) -> WorkResult {
        self(arguments, progress).await
    }
}

/// Work that resolves every job to the same value, without reporting
/// progress.
#[derive(Debug, Clone)]
pub struct ConstantWork(pub Value);

#[async_trait::async_trait]
impl Work for ConstantWork {
    async fn run(&self, _arguments: Vec<Value>, _progress: ProgressReporter) -> WorkResult {
        Ok(self.0.clone())
    }
}
