//! The four ways to take part in a connection: a Caller or a Runner, each
//! either dialing or accepting.
//!
//! | role   | dials          | accepts        |
//! |--------|----------------|----------------|
//! | Caller | [CallerClient] | [CallerServer] |
//! | Runner | [RunnerClient] | [RunnerServer] |

mod caller_client;
mod caller_core;
mod caller_server;
mod runner_client;
mod runner_core;
mod runner_server;

pub use caller_client::CallerClient;
pub use caller_server::CallerServer;
pub use runner_client::RunnerClient;
pub use runner_server::RunnerServer;
