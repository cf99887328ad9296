use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use super::caller_core::CallerCore;
use crate::application::config::cli_args::Args;
use crate::application::job_queue::errors::AddJobError;
use crate::application::job_queue::JobHandle;
use crate::application::loops::connect_to_peers::dial_loop;
use crate::application::loops::connection_loop::ConnectionHandler;
use crate::application::network::ConnectionPhase;
use crate::protocol::HandshakeData;
use crate::protocol::Role;

/// A Caller that dials a single Runner-host and keeps reconnecting to it.
///
/// Every job issued while the connection is down waits, and is dispatched
/// as soon as a connection opens.  Jobs in flight on a lost connection are
/// dispatched again, from scratch, on the next one; their [JobHandle]s and
/// progress streams keep working.
#[derive(Debug)]
pub struct CallerClient {
    core: CallerCore,
    phase: watch::Receiver<ConnectionPhase>,
    tasks: TaskTracker,
    shutdown: CancellationToken,
}

impl CallerClient {
    /// Starts dialing `peer` (`host:port`).  Must be called from within a
    /// tokio runtime.
    pub fn connect(peer: impl Into<String>, args: Args) -> Self {
        let peer = peer.into();
        let core = CallerCore::new(usize::MAX);
        let (phase_tx, phase) = watch::channel(ConnectionPhase::Connecting);
        let tasks = TaskTracker::new();
        let shutdown = CancellationToken::new();

        info!("Caller dialing {peer}");
        let handler: Arc<dyn ConnectionHandler> = Arc::new(core.clone());
        tasks.spawn(dial_loop(
            peer,
            handler,
            HandshakeData::new(Role::Caller),
            args,
            phase_tx,
            shutdown.clone(),
        ));

        Self {
            core,
            phase,
            tasks,
            shutdown,
        }
    }

    /// Issues a job.  The returned handle resolves to the job's outcome and
    /// carries its progress stream.
    pub fn call(&self, arguments: Vec<Value>) -> Result<JobHandle, AddJobError> {
        self.core.issue(arguments)
    }

    /// Alias of [Self::call].
    pub fn run(&self, arguments: Vec<Value>) -> Result<JobHandle, AddJobError> {
        self.call(arguments)
    }

    /// Alias of [Self::call].
    pub fn request(&self, arguments: Vec<Value>) -> Result<JobHandle, AddJobError> {
        self.call(arguments)
    }

    /// Alias of [Self::call].
    pub fn issue(&self, arguments: Vec<Value>) -> Result<JobHandle, AddJobError> {
        self.call(arguments)
    }

    pub fn phase(&self) -> ConnectionPhase {
        *self.phase.borrow()
    }

    /// A receiver observing every phase change of the connection.
    pub fn subscribe_phase(&self) -> watch::Receiver<ConnectionPhase> {
        self.phase.clone()
    }

    /// number of issued jobs that have not settled yet.
    pub fn num_pending(&self) -> usize {
        self.core.num_pending()
    }

    /// number of jobs waiting for a connection.
    pub fn num_waiting(&self) -> usize {
        self.core.num_waiting()
    }

    /// Cancels every pending job, closes the connection and stops dialing.
    pub async fn close(&self) {
        self.core.shutdown();
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        info!("Caller closed");
    }
}

impl Drop for CallerClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
