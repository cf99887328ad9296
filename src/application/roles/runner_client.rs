use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use super::runner_core::RunnerCore;
use crate::application::config::cli_args::Args;
use crate::application::execution::Work;
use crate::application::loops::connect_to_peers::dial_loop;
use crate::application::loops::connection_loop::ConnectionHandler;
use crate::application::network::ConnectionPhase;
use crate::protocol::HandshakeData;
use crate::protocol::Role;

/// A Runner that dials a Caller-host, executes the jobs it is given, and
/// keeps reconnecting when the connection is lost.
#[derive(Debug)]
pub struct RunnerClient {
    phase: watch::Receiver<ConnectionPhase>,
    tasks: TaskTracker,
    shutdown: CancellationToken,
}

impl RunnerClient {
    /// Starts dialing `peer` (`host:port`).  Must be called from within a
    /// tokio runtime.
    pub fn connect<W>(work: W, peer: impl Into<String>, args: Args) -> Self
    where
        W: Work + 'static,
    {
        let peer = peer.into();
        let (phase_tx, phase) = watch::channel(ConnectionPhase::Connecting);
        let tasks = TaskTracker::new();
        let shutdown = CancellationToken::new();

        info!("Runner dialing {peer}");
        // one core for every reconnect: all connections lead to the same
        // Caller, so its job ids never collide across them
        let handler: Arc<dyn ConnectionHandler> = Arc::new(RunnerCore::new(
            Arc::new(work),
            args.abandon_work_on_disconnect,
            tasks.clone(),
            shutdown.clone(),
        ));
        tasks.spawn(dial_loop(
            peer,
            handler,
            HandshakeData::new(Role::Runner),
            args,
            phase_tx,
            shutdown.clone(),
        ));

        Self {
            phase,
            tasks,
            shutdown,
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        *self.phase.borrow()
    }

    /// A receiver observing every phase change of the connection.
    pub fn subscribe_phase(&self) -> watch::Receiver<ConnectionPhase> {
        self.phase.clone()
    }

    /// Disconnects, stops dialing and cancels the jobs being executed.
    pub async fn close(&self) {
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        info!("Runner closed");
    }
}

impl Drop for RunnerClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
