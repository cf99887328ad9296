use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::application::execution::execute;
use crate::application::execution::ExecutionOwners;
use crate::application::execution::ExecutionTicket;
use crate::application::execution::Work;
use crate::application::job_queue::JobId;
use crate::application::loops::connection_loop::ConnectionHandler;
use crate::application::network::Connection;
use crate::application::network::ConnectionId;
use crate::application::network::ConnectionLink;
use crate::protocol::Role;
use crate::protocol::TaskMessage;

/// The Runner side of the protocol: executes every `do` it receives.
///
/// Jobs are tracked in `owners` under the connection they arrived on. Ids
/// are only unique per Caller, so connections to different Callers must not
/// share one `RunnerCore`.
#[derive(Clone)]
pub(crate) struct RunnerCore {
    work: Arc<dyn Work>,
    owners: ExecutionOwners,
    abandon_work_on_disconnect: bool,
    tasks: TaskTracker,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for RunnerCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerCore")
            .field("owners", &self.owners)
            .field("abandon_work_on_disconnect", &self.abandon_work_on_disconnect)
            .finish_non_exhaustive()
    }
}

impl RunnerCore {
    pub(crate) fn new(
        work: Arc<dyn Work>,
        abandon_work_on_disconnect: bool,
        tasks: TaskTracker,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            work,
            owners: ExecutionOwners::default(),
            abandon_work_on_disconnect,
            tasks,
            shutdown,
        }
    }

    /// number of jobs currently executing on behalf of `connection`.
    #[cfg(test)]
    pub(crate) fn num_executing(&self, connection: ConnectionId) -> usize {
        self.owners.lock(|o| o.owned_count(connection))
    }

    fn start(&self, link: &ConnectionLink, id: JobId, arguments: Vec<Value>) {
        let connection = link.id();
        let ticket = ExecutionTicket::new(self.shutdown.child_token());

        let registered = self.owners.lock_mut(|o| {
            if o.is_owned_by(connection, id) {
                return Ok(false);
            }
            o.register(connection, id, ticket.clone()).map(|()| true)
        });

        match registered {
            Ok(true) => {
                self.tasks.spawn(execute(
                    self.work.clone(),
                    arguments,
                    Arc::new(link.clone()),
                    id,
                    self.owners.clone(),
                    ticket,
                ));
            }
            Ok(false) => warn!("Job {id} is already executing for {connection}. Ignoring."),
            Err(err) => error!("Not executing job: {err}"),
        }
    }
}

impl ConnectionHandler for RunnerCore {
    fn role(&self) -> Role {
        Role::Runner
    }

    fn on_connect(&self, link: &ConnectionLink) {
        debug!("Ready to execute jobs for {}", link.id());
    }

    fn on_message(&self, link: &ConnectionLink, message: TaskMessage) {
        match message {
            TaskMessage::Do { id, arguments } => self.start(link, id, arguments),
            other => warn!(
                "Runner got unexpected `{}` from {}. Ignoring.",
                other.get_type(),
                link.id()
            ),
        }
    }

    fn on_disconnect(&self, connection: ConnectionId) {
        let orphans = self.owners.lock_mut(|o| o.drain(connection));
        if orphans.is_empty() {
            return;
        }

        if self.abandon_work_on_disconnect {
            info!("{connection} lost, abandoning {} job(s)", orphans.len());
            for (_, ticket) in &orphans {
                ticket.cancel();
            }
        } else {
            info!(
                "{connection} lost, {} job(s) will run to completion unheard",
                orphans.len()
            );
        }
    }
}
