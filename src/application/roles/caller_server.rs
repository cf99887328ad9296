use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::net::ToSocketAddrs;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use super::caller_core::CallerCore;
use crate::application::config::cli_args::Args;
use crate::application::job_queue::errors::AddJobError;
use crate::application::job_queue::JobHandle;
use crate::application::loops::connect_to_peers::accept_loop;
use crate::application::loops::connection_loop::ConnectionHandler;
use crate::protocol::HandshakeData;
use crate::protocol::Role;

/// A Caller that accepts connections from any number of Runners and
/// distributes its jobs among them.
///
/// Each Runner is given up to `max_jobs_per_runner` jobs at a time; when
/// one of its jobs settles it gets the next waiting one.  Runners that have
/// been idle the longest are served first, and a Runner that connects later
/// joins the rotation.  Jobs of a Runner that disconnects go back to the
/// front of the queue.
#[derive(Debug)]
pub struct CallerServer {
    core: CallerCore,
    local_addr: SocketAddr,
    tasks: TaskTracker,
    shutdown: CancellationToken,
}

impl CallerServer {
    pub async fn bind(listen: impl ToSocketAddrs, args: Args) -> Result<Self> {
        let listener = TcpListener::bind(listen).await?;
        let local_addr = listener.local_addr()?;
        let core = CallerCore::new(args.max_jobs_per_runner.get());
        let tasks = TaskTracker::new();
        let shutdown = CancellationToken::new();

        info!("Caller accepting Runners on {local_addr}");
        let handler: Arc<dyn ConnectionHandler> = Arc::new(core.clone());
        tasks.spawn(accept_loop(
            listener,
            move || handler.clone(),
            HandshakeData::new(Role::Caller),
            args,
            tasks.clone(),
            shutdown.clone(),
        ));

        Ok(Self {
            core,
            local_addr,
            tasks,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
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

    /// number of Runners currently connected.
    pub fn num_connections(&self) -> usize {
        self.core.num_connections()
    }

    /// number of issued jobs that have not settled yet.
    pub fn num_pending(&self) -> usize {
        self.core.num_pending()
    }

    /// number of jobs waiting for a Runner.
    pub fn num_waiting(&self) -> usize {
        self.core.num_waiting()
    }

    /// Cancels every pending job, disconnects every Runner and stops
    /// accepting.
    pub async fn close(&self) {
        self.core.shutdown();
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        info!("Caller on {} closed", self.local_addr);
    }
}

impl Drop for CallerServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
