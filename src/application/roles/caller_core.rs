use std::collections::VecDeque;

use serde_json::Value;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::application::execution::relay_report;
use crate::application::job_queue::errors::AddJobError;
use crate::application::job_queue::JobCompletion;
use crate::application::job_queue::JobHandle;
use crate::application::job_queue::JobId;
use crate::application::job_queue::JobStash;
use crate::application::locks::AtomicMutex;
use crate::application::loops::connection_loop::ConnectionHandler;
use crate::application::network::Connection;
use crate::application::network::ConnectionId;
use crate::application::network::ConnectionLink;
use crate::application::network::OwnerIndex;
use crate::protocol::Role;
use crate::protocol::TaskMessage;

/// What the Caller remembers about a job it dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DispatchTicket {
    attempt: u32,
}

#[derive(Debug)]
struct LinkSlot {
    link: ConnectionLink,
    capacity: usize,
}

/// Everything a Caller mutates, behind one lock.
#[derive(Debug, Default)]
pub(crate) struct CallerState {
    stash: JobStash,
    owners: OwnerIndex<DispatchTicket>,

    // open connections, longest idle first
    links: VecDeque<LinkSlot>,
    shut_down: bool,
}

impl CallerState {
    pub(crate) fn issue(&mut self, arguments: Vec<Value>) -> Result<JobHandle, AddJobError> {
        if self.shut_down {
            return Err(AddJobError::CallerClosed);
        }

        let handle = self.stash.allocate_and_stash(arguments)?;
        self.stash.enqueue_waiting(handle.job_id());
        self.pump();

        Ok(handle)
    }

    pub(crate) fn on_connect(&mut self, link: ConnectionLink, capacity: usize) {
        self.links.push_back(LinkSlot { link, capacity });
        self.pump();
    }

    pub(crate) fn on_message(&mut self, connection: ConnectionId, message: TaskMessage) {
        match message {
            TaskMessage::Report { id, payload } => {
                relay_report(&self.stash, &self.owners, connection, id, payload);
            }
            TaskMessage::Resolve { id, value } => {
                self.settle_from(connection, id, JobCompletion::Resolved(value));
            }
            TaskMessage::Reject { id, error } => {
                self.settle_from(connection, id, JobCompletion::Rejected(error));
            }
            TaskMessage::Do { id, .. } => {
                warn!("Caller got `do` for job {id} from {connection}. Ignoring.");
            }
            TaskMessage::Handshake { .. } | TaskMessage::Bye => {}
        }
    }

    /// forgets the connection and puts every job it owned back in front of
    /// the waiting queue.  Returns those jobs.
    pub(crate) fn on_disconnect(&mut self, connection: ConnectionId) -> Vec<JobId> {
        self.links.retain(|slot| slot.link.id() != connection);
        let lost = self.owners.drain(connection);
        for (id, ticket) in &lost {
            debug!("{connection} lost job {id} during attempt {}", ticket.attempt);
        }
        let requeued = self.stash.requeue(lost.into_iter().map(|(id, _)| id));
        self.pump();

        requeued
    }

    /// dispatches the next waiting job, if any, on `connection`.
    pub(crate) fn assign_next_waiting_to(&mut self, connection: ConnectionId) -> Option<JobId> {
        let link = self
            .links
            .iter()
            .find(|slot| slot.link.id() == connection)?
            .link
            .clone();
        let (id, arguments) = self.stash.take_next_waiting()?;
        let attempt = self.stash.lookup(id).map_or(0, |job| job.attempts());

        if let Err(err) = self.owners.register(connection, id, DispatchTicket { attempt }) {
            error!("Refusing to dispatch: {err}");
            self.stash.requeue([id]);
            return None;
        }

        if link.send(TaskMessage::Do { id, arguments }).is_err() {
            debug!("{connection} closed before job {id} could be sent");
            self.owners.unregister(connection, id);
            self.stash.requeue([id]);
            return None;
        }

        if attempt > 1 {
            info!("Redelivered job {id} to {connection} (attempt {attempt})");
        } else {
            debug!("Dispatched job {id} to {connection}");
        }
        Some(id)
    }

    /// settles every pending job as cancelled and refuses new ones.
    pub(crate) fn shutdown(&mut self) -> usize {
        self.shut_down = true;
        for slot in &self.links {
            self.owners.on_disconnect(slot.link.id());
        }
        self.stash.cancel_all()
    }

    pub(crate) fn num_pending(&self) -> usize {
        self.stash.len()
    }

    pub(crate) fn num_waiting(&self) -> usize {
        self.stash.num_waiting()
    }

    pub(crate) fn num_connections(&self) -> usize {
        self.links.len()
    }

    fn settle_from(&mut self, connection: ConnectionId, id: JobId, completion: JobCompletion) {
        if self.owners.unregister(connection, id).is_none() {
            trace!("discarding outcome for job {id} from {connection}: not its owner");
            return;
        }

        self.stash.settle(id, completion);
        self.pump();
    }

    /// hands waiting jobs to open connections with spare capacity, the one
    /// idle the longest first.
    fn pump(&mut self) {
        if self.shut_down {
            return;
        }

        while self.stash.num_waiting() > 0 {
            let Some(position) = self.links.iter().position(|slot| {
                !slot.link.is_closed() && self.owners.owned_count(slot.link.id()) < slot.capacity
            }) else {
                break;
            };

            // the served connection goes to the back of the rotation
            let Some(slot) = self.links.remove(position) else {
                break;
            };
            let connection = slot.link.id();
            self.links.push_back(slot);

            if self.assign_next_waiting_to(connection).is_none() {
                break;
            }
        }
    }
}

/// The Caller side of the protocol, shared by every connection of one
/// Caller.
#[derive(Debug, Clone)]
pub(crate) struct CallerCore {
    state: AtomicMutex<CallerState>,
    capacity_per_connection: usize,
}

impl CallerCore {
    pub(crate) fn new(capacity_per_connection: usize) -> Self {
        Self {
            state: AtomicMutex::from((CallerState::default(), "caller state")),
            capacity_per_connection,
        }
    }

    pub(crate) fn issue(&self, arguments: Vec<Value>) -> Result<JobHandle, AddJobError> {
        self.state.lock_mut(|s| s.issue(arguments))
    }

    pub(crate) fn shutdown(&self) -> usize {
        let cancelled = self.state.lock_mut(|s| s.shutdown());
        if cancelled > 0 {
            info!("Cancelled {cancelled} pending job(s)");
        }
        cancelled
    }

    pub(crate) fn num_pending(&self) -> usize {
        self.state.lock(|s| s.num_pending())
    }

    pub(crate) fn num_waiting(&self) -> usize {
        self.state.lock(|s| s.num_waiting())
    }

    pub(crate) fn num_connections(&self) -> usize {
        self.state.lock(|s| s.num_connections())
    }
}

impl ConnectionHandler for CallerCore {
    fn role(&self) -> Role {
        Role::Caller
    }

    fn on_connect(&self, link: &ConnectionLink) {
        let capacity = self.capacity_per_connection;
        self.state.lock_mut(|s| s.on_connect(link.clone(), capacity));
    }

    fn on_message(&self, link: &ConnectionLink, message: TaskMessage) {
        self.state.lock_mut(|s| s.on_message(link.id(), message));
    }

    fn on_disconnect(&self, connection: ConnectionId) {
        let requeued = self.state.lock_mut(|s| s.on_disconnect(connection));
        if !requeued.is_empty() {
            info!(
                "{connection} lost with {} job(s) in flight, requeued for redelivery",
                requeued.len()
            );
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use itertools::Itertools;
    use serde_json::json;
    use tokio::sync::mpsc::error::TryRecvError;
    use tracing_test::traced_test;

    use super::*;
    use crate::application::job_queue::JobState;
    use crate::application::network::connection::OutboundReceiver;

    fn open(state: &mut CallerState, capacity: usize) -> (ConnectionLink, OutboundReceiver) {
        let (link, rx) = ConnectionLink::new();
        state.on_connect(link.clone(), capacity);
        (link, rx)
    }

    fn dispatched(rx: &mut OutboundReceiver) -> Vec<(JobId, Vec<Value>)> {
        std::iter::from_fn(|| match rx.try_recv() {
            Ok(TaskMessage::Do { id, arguments }) => Some((id, arguments)),
            _ => None,
        })
        .collect()
    }

    #[traced_test]
    #[test]
    fn jobs_wait_for_a_connection() {
        let mut state = CallerState::default();
        let handle = state.issue(vec![json!(1)]).unwrap();
        assert_eq!(1, state.num_waiting());

        let (_link, mut rx) = open(&mut state, usize::MAX);
        assert_eq!(vec![(handle.job_id(), vec![json!(1)])], dispatched(&mut rx));
        assert_eq!(0, state.num_waiting());
    }

    #[traced_test]
    #[tokio::test]
    async fn outcome_settles_and_progress_is_routed() {
        let mut state = CallerState::default();
        let (link, mut rx) = open(&mut state, usize::MAX);
        let mut handle = state.issue(vec![]).unwrap();
        let mut progress = handle.take_progress().unwrap();
        let id = handle.job_id();
        assert_eq!(1, dispatched(&mut rx).len());

        for i in 1..=4 {
            state.on_message(link.id(), TaskMessage::Report { id, payload: json!(i) });
        }
        state.on_message(
            link.id(),
            TaskMessage::Resolve {
                id,
                value: json!("success"),
            },
        );
        state.on_message(link.id(), TaskMessage::Report { id, payload: json!(5) });

        assert_eq!(JobCompletion::Resolved(json!("success")), handle.await.unwrap());
        assert_eq!(
            vec![json!(1), json!(2), json!(3), json!(4)],
            progress.drain()
        );
        assert_eq!(0, state.num_pending());
    }

    #[traced_test]
    #[tokio::test]
    async fn lost_connection_redelivers_to_next_one() {
        let mut state = CallerState::default();
        let (first, mut first_rx) = open(&mut state, usize::MAX);
        let mut handle = state.issue(vec![json!("x")]).unwrap();
        let mut progress = handle.take_progress().unwrap();
        let id = handle.job_id();
        assert_eq!(1, dispatched(&mut first_rx).len());

        state.on_message(first.id(), TaskMessage::Report { id, payload: json!("prog 1:1") });
        assert_eq!(vec![id], state.on_disconnect(first.id()));
        assert!(state.on_disconnect(first.id()).is_empty());

        // late events from the lost connection go nowhere
        state.on_message(first.id(), TaskMessage::Report { id, payload: json!("stale") });
        state.on_message(first.id(), TaskMessage::Resolve { id, value: json!("stale") });
        assert_eq!(1, state.num_pending());

        let (second, mut second_rx) = open(&mut state, usize::MAX);
        assert_eq!(vec![(id, vec![json!("x")])], dispatched(&mut second_rx));
        state.on_message(second.id(), TaskMessage::Report { id, payload: json!("prog 1:2") });
        state.on_message(second.id(), TaskMessage::Resolve { id, value: json!("success 2") });

        assert_eq!(JobCompletion::Resolved(json!("success 2")), handle.await.unwrap());
        assert_eq!(vec![json!("prog 1:1"), json!("prog 1:2")], progress.drain());
    }

    #[traced_test]
    #[test]
    fn capacity_limits_jobs_per_connection() {
        let mut state = CallerState::default();
        let (a, mut a_rx) = open(&mut state, 1);
        let (_b, mut b_rx) = open(&mut state, 1);

        let handles: Vec<_> = (0..3).map(|i| state.issue(vec![json!(i)]).unwrap()).collect();
        let ids = |jobs: Vec<(JobId, Vec<Value>)>| jobs.into_iter().map(|(id, _)| id).collect_vec();
        assert_eq!(vec![handles[0].job_id()], ids(dispatched(&mut a_rx)));
        assert_eq!(vec![handles[1].job_id()], ids(dispatched(&mut b_rx)));
        assert_eq!(1, state.num_waiting());

        // a frees up and gets the third job
        state.on_message(
            a.id(),
            TaskMessage::Resolve {
                id: handles[0].job_id(),
                value: json!(0),
            },
        );
        assert_eq!(vec![(handles[2].job_id(), vec![json!(2)])], dispatched(&mut a_rx));
        assert_eq!(Err(TryRecvError::Empty), b_rx.try_recv().map(|_| ()));
    }

    #[traced_test]
    #[test]
    fn outcome_from_non_owner_is_ignored() {
        let mut state = CallerState::default();
        let (_a, mut a_rx) = open(&mut state, usize::MAX);
        let handle = state.issue(vec![]).unwrap();
        let id = handle.job_id();
        dispatched(&mut a_rx);

        let stranger = ConnectionId::next();
        state.on_message(stranger, TaskMessage::Resolve { id, value: json!(1) });
        assert_eq!(1, state.num_pending());
    }

    #[traced_test]
    #[tokio::test]
    async fn shutdown_cancels_everything() {
        let mut state = CallerState::default();
        let (_a, _a_rx) = open(&mut state, 1);
        let dispatched_handle = state.issue(vec![]).unwrap();
        let waiting_handle = state.issue(vec![]).unwrap();

        assert_eq!(2, state.shutdown());
        assert_eq!(Err(AddJobError::CallerClosed), state.issue(vec![]).map(|h| h.job_id()));
        assert_eq!(JobCompletion::Cancelled, dispatched_handle.await.unwrap());
        assert_eq!(JobCompletion::Cancelled, waiting_handle.await.unwrap());
    }

    #[traced_test]
    #[test]
    fn job_owned_elsewhere_is_requeued_not_sent() {
        let mut state = CallerState::default();
        let handle = state.issue(vec![json!("x")]).unwrap();
        let id = handle.job_id();

        let other = ConnectionId::next();
        state
            .owners
            .register(other, id, DispatchTicket { attempt: 0 })
            .unwrap();

        let (_a, mut a_rx) = open(&mut state, 1);

        assert!(dispatched(&mut a_rx).is_empty());
        assert_eq!(1, state.num_waiting());
        assert_eq!(
            Some(JobState::Waiting),
            state.stash.lookup(id).map(|job| job.state())
        );
        assert_eq!(Some(other), state.owners.owner_of(id));
        assert!(logs_contain("Refusing to dispatch"));
    }

    #[traced_test]
    #[test]
    fn closed_link_is_skipped() {
        let mut state = CallerState::default();
        let (_dead, dead_rx) = open(&mut state, 1);
        drop(dead_rx);
        let (_alive, mut alive_rx) = open(&mut state, 1);

        let handle = state.issue(vec![]).unwrap();
        let jobs = dispatched(&mut alive_rx);
        assert_eq!(1, jobs.len());
        assert_eq!(handle.job_id(), jobs[0].0);
    }
}
