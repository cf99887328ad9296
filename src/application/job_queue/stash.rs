use std::collections::HashMap;
use std::collections::VecDeque;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::trace;

use super::channels::JobProgressSender;
use super::channels::JobResultSender;
use super::errors::AddJobError;
use super::job_completion::JobCompletion;
use super::job_handle::JobHandle;
use super::job_id::JobId;
use super::job_id::JobIdSpace;

/// Where a pending job is.  A settled job leaves the stash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum JobState {
    /// no connection has been assigned yet, or the assigned one was lost.
    Waiting,
    /// bound to exactly one connection.
    Dispatched,
}

/// A pending job as held by the stash.
#[derive(Debug)]
pub struct JobRecord {
    arguments: Vec<Value>,
    state: JobState,
    attempts: u32,
    result_tx: JobResultSender,
    progress_tx: JobProgressSender,
}

impl JobRecord {
    pub fn state(&self) -> JobState {
        self.state
    }

    /// number of times the job has been dispatched.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// true if the [JobHandle] was dropped.
    pub fn is_abandoned(&self) -> bool {
        self.result_tx.is_closed()
    }
}

/// The arena of every unsettled job of one caller, keyed by [JobId], plus the
/// FIFO of jobs waiting for a connection.
///
/// All mutation goes through the methods below; callers share the stash
/// behind a lock so every method is one indivisible step.
#[derive(Debug, Default)]
pub struct JobStash {
    ids: JobIdSpace,
    jobs: HashMap<JobId, JobRecord>,
    waiting: VecDeque<JobId>,
}

impl JobStash {
    /// stores a new job in the `Waiting` state and returns its handle.
    ///
    /// the job is not queued; see [Self::enqueue_waiting].
    pub fn allocate_and_stash(&mut self, arguments: Vec<Value>) -> Result<JobHandle, AddJobError> {
        let job_id = self.ids.allocate()?;
        let (result_tx, result_rx) = oneshot::channel();
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();

        self.jobs.insert(
            job_id,
            JobRecord {
                arguments,
                state: JobState::Waiting,
                attempts: 0,
                result_tx,
                progress_tx,
            },
        );
        debug!("stashed job {job_id}");

        Ok(JobHandle::new(job_id, result_rx, progress_rx))
    }

    pub fn lookup(&self, job_id: JobId) -> Option<&JobRecord> {
        self.jobs.get(&job_id)
    }

    /// appends a waiting job to the back of the queue.
    ///
    /// returns false if the job is unknown or not `Waiting`.
    pub fn enqueue_waiting(&mut self, job_id: JobId) -> bool {
        match self.jobs.get(&job_id) {
            Some(job) if job.state == JobState::Waiting && !self.waiting.contains(&job_id) => {
                self.waiting.push_back(job_id);
                true
            }
            _ => false,
        }
    }

    /// moves dispatched jobs back to `Waiting`, ahead of everything already
    /// waiting, keeping their relative order.
    ///
    /// returns the ids that were actually requeued.
    pub fn requeue(&mut self, job_ids: impl IntoIterator<Item = JobId>) -> Vec<JobId> {
        let mut requeued = vec![];
        for job_id in job_ids {
            if let Some(job) = self.jobs.get_mut(&job_id) {
                if job.state == JobState::Dispatched {
                    job.state = JobState::Waiting;
                    requeued.push(job_id);
                }
            }
        }

        for job_id in requeued.iter().rev() {
            self.waiting.push_front(*job_id);
        }
        if !requeued.is_empty() {
            debug!("requeued {} job(s) for redelivery", requeued.len());
        }

        requeued
    }

    /// pops the next waiting job, marks it `Dispatched` and returns its id
    /// and arguments.
    ///
    /// jobs whose handle was dropped while waiting are discarded here.
    pub fn take_next_waiting(&mut self) -> Option<(JobId, Vec<Value>)> {
        while let Some(job_id) = self.waiting.pop_front() {
            let Some(job) = self.jobs.get_mut(&job_id) else {
                continue;
            };
            if job.is_abandoned() {
                debug!("discarding job {job_id}: handle was dropped before dispatch");
                self.remove(job_id);
                continue;
            }

            job.state = JobState::Dispatched;
            job.attempts += 1;
            return Some((job_id, job.arguments.clone()));
        }

        None
    }

    /// hands a progress notification to the job's progress stream.
    ///
    /// returns false, delivering nothing, unless the job is `Dispatched`.
    pub fn notify_progress(&self, job_id: JobId, payload: Value) -> bool {
        match self.jobs.get(&job_id) {
            Some(job) if job.state == JobState::Dispatched => {
                // a dropped handle is not an error; the job still settles.
                let _ = job.progress_tx.send(payload);
                true
            }
            _ => {
                trace!("no dispatched job {job_id} to notify");
                false
            }
        }
    }

    /// removes the job, frees its id and delivers the completion.
    ///
    /// returns false if the job was unknown, i.e. already settled.
    pub fn settle(&mut self, job_id: JobId, completion: JobCompletion) -> bool {
        let Some(job) = self.remove(job_id) else {
            return false;
        };

        debug!("job {job_id} settled: {completion}");
        // dropping progress_tx with the record ends the progress stream.
        let _ = job.result_tx.send(completion);
        true
    }

    /// settles every job as `Cancelled`.
    pub fn cancel_all(&mut self) -> usize {
        let job_ids: Vec<JobId> = self.jobs.keys().copied().collect();
        job_ids
            .into_iter()
            .filter(|job_id| self.settle(*job_id, JobCompletion::Cancelled))
            .count()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn num_waiting(&self) -> usize {
        self.waiting.len()
    }

    fn remove(&mut self, job_id: JobId) -> Option<JobRecord> {
        let job = self.jobs.remove(&job_id)?;
        self.waiting.retain(|id| *id != job_id);
        self.ids.free(job_id);
        Some(job)
    }
}
