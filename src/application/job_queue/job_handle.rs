use std::future::Future;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use futures::Stream;
use serde_json::Value;

use super::channels::JobProgressReceiver;
use super::channels::JobResultReceiver;
use super::errors::JobHandleError;
use super::job_completion::JobCompletion;
use super::job_id::JobId;

/// A job-handle enables awaiting the outcome of a remote job and observing
/// its progress.
///
/// A JobHandle can be awaited directly.  It returns a
/// `Result<JobCompletion, JobHandleError>`
///
/// The handle stays valid across redelivery: if the connection executing the
/// job drops and the job is re-executed elsewhere, progress of the new
/// attempt arrives on the same stream and the outcome on the same handle.
///
/// When the `JobHandle` is dropped its continuations are released.  A job
/// that has not been dispatched yet is then discarded.  A job that is
/// already executing remotely is not stopped.
#[derive(Debug)]
pub struct JobHandle {
    job_id: JobId,
    result_rx: JobResultReceiver,
    progress_rx: Option<JobProgressReceiver>,
}

impl JobHandle {
    // private instantiation fn.  only for use by JobStash
    pub(super) fn new(
        job_id: JobId,
        result_rx: JobResultReceiver,
        progress_rx: JobProgressReceiver,
    ) -> Self {
        Self {
            job_id,
            result_rx,
            progress_rx: Some(progress_rx),
        }
    }

    /// obtain the job identifier
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// takes the progress stream out of the handle.
    ///
    /// returns None if it was taken already.  the stream ends once the job
    /// has settled and every progress notification has been yielded.
    pub fn take_progress(&mut self) -> Option<JobProgress> {
        self.progress_rx.take().map(|rx| JobProgress { rx })
    }

    /// awaits the job while handing every progress notification to
    /// `on_progress`, in the order the runner emitted them.
    ///
    /// All progress that arrived before the outcome is delivered before this
    /// returns.
    ///
    /// ```no_run
    /// # async fn example(caller: remote_tasks::CallerClient) -> anyhow::Result<()> {
    /// let mut seen = vec![];
    /// let value = caller
    ///     .call(vec![])?
    ///     .with_progress(|p| seen.push(p))
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_progress<F>(mut self, mut on_progress: F) -> Result<Value, JobHandleError>
    where
        F: FnMut(Value),
    {
        let Some(mut progress_rx) = self.progress_rx.take() else {
            return self.await?.result();
        };

        let completion = loop {
            tokio::select! {
                biased;

                Some(progress) = progress_rx.recv() => on_progress(progress),

                completion = &mut self.result_rx => break completion,
            }
        };

        // progress sent right before settlement may still be buffered.
        while let Ok(progress) = progress_rx.try_recv() {
            on_progress(progress);
        }

        completion?.result()
    }
}

// we implement Future for JobHandle so that a JobHandle can be
// directly awaited (like a tokio JoinHandle).
impl Future for JobHandle {
    type Output = Result<JobCompletion, JobHandleError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // Directly poll the underlying result_rx
        let result_rx = &mut self.get_mut().result_rx;
        Pin::new(result_rx).poll(cx).map_err(|e| e.into())
    }
}

/// The ordered progress notifications of one job.
#[derive(Debug)]
pub struct JobProgress {
    rx: JobProgressReceiver,
}

impl JobProgress {
    /// receives the next progress notification, or None once the job has
    /// settled and nothing is buffered.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// returns every notification buffered right now.
    pub fn drain(&mut self) -> Vec<Value> {
        std::iter::from_fn(|| self.rx.try_recv().ok()).collect()
    }
}

impl Stream for JobProgress {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
