// When `cargo-llvm-cov` runs on nightly, enable the unstable coverage
// attribute so test modules can opt out with
// `#[cfg_attr(coverage_nightly, coverage(off))]`.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Remote job invocation with progress.
//!
//! A *Caller* issues jobs and awaits their outcomes; a *Runner* executes
//! them and streams progress back while they run.  Either side may dial the
//! other:
//!
//! - forward: a Caller dials one Runner-host, see [serve] and [client].
//! - flipped: Runners dial a Caller-host that distributes jobs among them,
//!   see [provide] and [marshal].
//!
//! Jobs that were in flight on a lost connection are executed again, from
//! scratch, on the next available connection.  Their [JobHandle]s and
//! progress streams survive that.

pub mod application;
pub mod protocol;


use anyhow::Result;
use tokio::net::ToSocketAddrs;

pub use crate::application::config::cli_args::Args;
pub use crate::application::execution::ConstantWork;
pub use crate::application::execution::ProgressReporter;
pub use crate::application::execution::Work;
pub use crate::application::execution::WorkResult;
pub use crate::application::job_queue::errors::AddJobError;
pub use crate::application::job_queue::errors::JobHandleError;
pub use crate::application::job_queue::JobCompletion;
pub use crate::application::job_queue::JobHandle;
pub use crate::application::job_queue::JobId;
pub use crate::application::job_queue::JobProgress;
pub use crate::application::network::ConnectionPhase;
pub use crate::application::roles::CallerClient;
pub use crate::application::roles::CallerServer;
pub use crate::application::roles::RunnerClient;
pub use crate::application::roles::RunnerServer;

/// Accepts Callers on `listen` and executes their jobs with `work`.
pub async fn serve<W>(work: W, listen: impl ToSocketAddrs) -> Result<RunnerServer>
where
    W: Work + 'static,
{
    RunnerServer::bind(work, listen, Args::default()).await
}

/// Dials the Runner-host at `peer` (`host:port`).
pub fn client(peer: impl Into<String>) -> CallerClient {
    CallerClient::connect(peer, Args::default())
}

/// Dials the Caller-host at `peer` and executes the jobs it hands out
/// with `work`.
pub fn provide<W>(work: W, peer: impl Into<String>) -> RunnerClient
where
    W: Work + 'static,
{
    RunnerClient::connect(work, peer, Args::default())
}

/// Accepts Runners on `listen` and distributes jobs among them.
pub async fn marshal(listen: impl ToSocketAddrs) -> Result<CallerServer> {
    CallerServer::bind(listen, Args::default()).await
}
