//! Routing of progress notifications.
//!
//! Outbound, on the Runner: a [ProgressReporter] turns the work's progress
//! signals into `report` events tagged with the job id.
//!
//! Inbound, on the Caller: [relay_report] hands a `report` event to the
//! pending job's progress stream, but only if the connection it arrived on
//! currently owns the job.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;
use tracing::trace;

use crate::application::job_queue::JobId;
use crate::application::job_queue::JobStash;
use crate::application::locks::AtomicMutex;
use crate::application::network::Connection;
use crate::application::network::ConnectionId;
use crate::application::network::OwnerIndex;
use crate::protocol::TaskMessage;

/// Emits the events of one job on one connection.
///
/// Reports and the terminal event go through the same per-job lock, so once
/// the terminal event has been queued no report can follow it.
#[derive(Debug)]
pub(crate) struct JobEmitter {
    id: JobId,
    connection: Arc<dyn Connection>,
    terminal_sent: AtomicMutex<bool>,
}

impl JobEmitter {
    pub(crate) fn new(id: JobId, connection: Arc<dyn Connection>) -> Self {
        Self {
            id,
            connection,
            terminal_sent: AtomicMutex::from(false),
        }
    }

    pub(crate) fn report(&self, payload: Value) -> bool {
        self.terminal_sent.lock(|terminal_sent| {
            if *terminal_sent {
                trace!("dropping report for job {}: outcome already sent", self.id);
                return false;
            }
            self.emit(TaskMessage::Report {
                id: self.id,
                payload,
            })
        })
    }

    /// queues the terminal event.  Only the first call sends anything.
    pub(crate) fn finish(&self, message: TaskMessage) -> bool {
        debug_assert!(message.is_terminal());
        self.terminal_sent.lock_mut(|terminal_sent| {
            if *terminal_sent {
                return false;
            }
            *terminal_sent = true;
            self.emit(message)
        })
    }

    /// stops any further event from being sent, without sending one.
    pub(crate) fn seal(&self) {
        self.terminal_sent.lock_mut(|terminal_sent| *terminal_sent = true);
    }

    fn emit(&self, message: TaskMessage) -> bool {
        match self.connection.send(message) {
            Ok(()) => true,
            Err(err) => {
                debug!("not sending event for job {}: {err}", self.id);
                false
            }
        }
    }
}

/// Handed to [Work](super::Work) to report progress of the job it executes.
///
/// Cheap to clone.  Reports are fire-and-forget: they are not acknowledged,
/// and are dropped silently once the job's outcome has been sent or its
/// connection is gone.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    emitter: Arc<JobEmitter>,
}

impl ProgressReporter {
    /// a reporter emitting `report` events for job `id` on `connection`.
    pub fn new(id: JobId, connection: Arc<dyn Connection>) -> Self {
        Self::from_emitter(Arc::new(JobEmitter::new(id, connection)))
    }

    pub(crate) fn from_emitter(emitter: Arc<JobEmitter>) -> Self {
        Self { emitter }
    }

    pub fn job_id(&self) -> JobId {
        self.emitter.id
    }

    /// returns true if the report was queued for sending.
    pub fn report(&self, payload: impl Into<Value>) -> bool {
        self.emitter.report(payload.into())
    }
}

/// Outcome of routing an inbound `report`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Delivery {
    Delivered,

    /// the job settled, was never known, or is owned by another connection.
    /// The normal race during a redelivery cutover.
    Discarded,
}

/// routes `report (id, payload)` received on `connection`.
pub fn relay_report<H>(
    stash: &JobStash,
    owners: &OwnerIndex<H>,
    connection: ConnectionId,
    id: JobId,
    payload: Value,
) -> Delivery {
    if !owners.is_owned_by(connection, id) {
        trace!("discarding report for job {id} from {connection}: not its owner");
        return Delivery::Discarded;
    }

    if stash.notify_progress(id, payload) {
        Delivery::Delivered
    } else {
        trace!("discarding report for job {id} from {connection}: job is not dispatched");
        Delivery::Discarded
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use serde_json::json;
    use tracing_test::traced_test;

    use super::*;
    use crate::tests::shared::RecordingConnection;

    #[test]
    fn reports_stop_after_terminal_event() {
        let connection = RecordingConnection::new();
        let id = JobId::new(4, 0);
        let emitter = Arc::new(JobEmitter::new(id, connection.clone()));
        let reporter = ProgressReporter::from_emitter(emitter.clone());

        assert!(reporter.report(1));
        assert!(reporter.report("two"));
        assert!(emitter.finish(TaskMessage::Resolve {
            id,
            value: json!("done")
        }));
        assert!(!reporter.report(3));
        assert!(!emitter.finish(TaskMessage::Reject {
            id,
            error: json!("late")
        }));

        assert_eq!(
            vec![
                TaskMessage::Report { id, payload: json!(1) },
                TaskMessage::Report {
                    id,
                    payload: json!("two")
                },
                TaskMessage::Resolve {
                    id,
                    value: json!("done")
                },
            ],
            connection.sent()
        );
    }

    #[traced_test]
    #[test]
    fn closed_connection_swallows_reports() {
        let connection = RecordingConnection::new();
        connection.close();
        let reporter = ProgressReporter::new(JobId::new(0, 0), connection.clone());

        assert!(!reporter.report(1));
        assert!(connection.sent().is_empty());
    }

    #[test]
    fn sealed_emitter_sends_nothing() {
        let connection = RecordingConnection::new();
        let id = JobId::new(0, 0);
        let emitter = Arc::new(JobEmitter::new(id, connection.clone()));

        emitter.seal();
        assert!(!emitter.report(json!(1)));
        assert!(!emitter.finish(TaskMessage::Resolve { id, value: json!(1) }));
        assert!(connection.sent().is_empty());
    }

    #[test]
    fn inbound_reports_need_ownership() {
        let mut stash = JobStash::default();
        let mut owners = OwnerIndex::default();
        let owner = ConnectionId::next();
        let stranger = ConnectionId::next();

        let mut handle = stash.allocate_and_stash(vec![]).unwrap();
        let mut progress = handle.take_progress().unwrap();
        let id = handle.job_id();
        stash.enqueue_waiting(id);
        stash.take_next_waiting();
        owners.register(owner, id, ()).unwrap();

        assert_eq!(
            Delivery::Discarded,
            relay_report(&stash, &owners, stranger, id, json!("stale"))
        );
        assert_eq!(
            Delivery::Delivered,
            relay_report(&stash, &owners, owner, id, json!("prog 1"))
        );

        owners.unregister(owner, id);
        assert_eq!(
            Delivery::Discarded,
            relay_report(&stash, &owners, owner, id, json!("late"))
        );

        assert_eq!(vec![json!("prog 1")], progress.drain());
    }
}
