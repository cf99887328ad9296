use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::net::ToSocketAddrs;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use super::runner_core::RunnerCore;
use crate::application::config::cli_args::Args;
use crate::application::execution::Work;
use crate::application::loops::connect_to_peers::accept_loop;
use crate::application::loops::connection_loop::ConnectionHandler;
use crate::protocol::HandshakeData;
use crate::protocol::Role;

/// A Runner that accepts connections from Callers and executes their jobs.
///
/// Every accepted connection is tracked on its own, since each Caller
/// numbers its jobs independently.
#[derive(Debug)]
pub struct RunnerServer {
    local_addr: SocketAddr,
    tasks: TaskTracker,
    shutdown: CancellationToken,
}

impl RunnerServer {
    pub async fn bind<W>(work: W, listen: impl ToSocketAddrs, args: Args) -> Result<Self>
    where
        W: Work + 'static,
    {
        let listener = TcpListener::bind(listen).await?;
        let local_addr = listener.local_addr()?;
        let tasks = TaskTracker::new();
        let shutdown = CancellationToken::new();

        info!("Runner accepting Callers on {local_addr}");
        let work: Arc<dyn Work> = Arc::new(work);
        let abandon_work_on_disconnect = args.abandon_work_on_disconnect;
        let connection_tasks = tasks.clone();
        let connection_shutdown = shutdown.clone();
        let handler_for_connection = move || -> Arc<dyn ConnectionHandler> {
            Arc::new(RunnerCore::new(
                work.clone(),
                abandon_work_on_disconnect,
                connection_tasks.clone(),
                connection_shutdown.clone(),
            ))
        };

        tasks.spawn(accept_loop(
            listener,
            handler_for_connection,
            HandshakeData::new(Role::Runner),
            args,
            tasks.clone(),
            shutdown.clone(),
        ));

        Ok(Self {
            local_addr,
            tasks,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting, disconnects every Caller and cancels the jobs being
    /// executed.  Their Callers will redeliver them elsewhere.
    pub async fn close(&self) {
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        info!("Runner on {} closed", self.local_addr);
    }
}

impl Drop for RunnerServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
