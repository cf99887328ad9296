//! This module implements the caller-side job stash: the arena of jobs that
//! have been issued but have not settled yet, together with the identifier
//! space their ids are drawn from.
//!
//! Each job is tagged with a [JobId] when it is issued.  The id is the only
//! thing that travels over the wire; every progress notification and the
//! final outcome is routed back to the pending job by that id, whichever
//! connection happens to carry it.
//!
//! Each job has an associated [JobHandle] that is used to await the job's
//! outcome and to observe its progress.  The handle is created when the job
//! is stashed and keeps working across redelivery: if the connection that
//! executes a job goes away, the job goes back to the front of the waiting
//! queue, is executed again from scratch elsewhere, and the new attempt's
//! progress and outcome arrive on the very same handle.
//!
//! A job moves through [JobState::Waiting], [JobState::Dispatched] and
//! finally settles.  A settled job is removed from the stash and its id is
//! freed immediately; the id's index may be reused later, but always with a
//! new generation, so a late notification for the settled job can never be
//! delivered to its successor.
//!
//! ```
//! use remote_tasks::application::job_queue::JobCompletion;
//! use remote_tasks::application::job_queue::JobStash;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let mut stash = JobStash::default();
//! let mut handle = stash.allocate_and_stash(vec![json!(21)]).unwrap();
//! let mut progress = handle.take_progress().unwrap();
//! stash.enqueue_waiting(handle.job_id());
//!
//! // a connection becomes available and takes the job
//! let (job_id, arguments) = stash.take_next_waiting().unwrap();
//! assert_eq!(vec![json!(21)], arguments);
//!
//! // the runner reports and resolves
//! stash.notify_progress(job_id, json!("halfway"));
//! stash.settle(job_id, JobCompletion::Resolved(json!(42)));
//!
//! assert_eq!(Some(json!("halfway")), progress.recv().await);
//! assert_eq!(JobCompletion::Resolved(json!(42)), handle.await.unwrap());
//! # })
//! ```

pub mod channels;
pub mod errors;
mod job_completion;
mod job_handle;
mod job_id;
mod stash;

pub use job_completion::JobCompletion;
pub use job_handle::JobHandle;
pub use job_handle::JobProgress;
pub use job_id::JobId;
pub use job_id::JobIdSpace;
pub use stash::JobRecord;
pub use stash::JobStash;
pub use stash::JobState;
