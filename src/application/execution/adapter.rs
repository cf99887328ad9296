use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;

use super::relay::JobEmitter;
use super::relay::ProgressReporter;
use super::work::Work;
use crate::application::job_queue::JobId;
use crate::application::locks::AtomicMutex;
use crate::application::network::Connection;
use crate::application::network::OwnerIndex;
use crate::protocol::TaskMessage;

/// What a Runner keeps in its owner index for a job it executes.
#[derive(Debug, Clone)]
pub struct ExecutionTicket {
    cancel: CancellationToken,
}

impl ExecutionTicket {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// stops the work. no outcome is sent for a cancelled job.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

pub type ExecutionOwners = AtomicMutex<OwnerIndex<ExecutionTicket>>;

/// Runs one job and forwards its progress and outcome on `connection`.
///
/// The job must have been registered in `owners` under `(connection, id)`
/// with `ticket`.  The entry is removed as the very last step; if the
/// connection was lost in the meantime its disconnect handler removed it
/// already and that removal is a no-op.
pub async fn execute(
    work: Arc<dyn Work>,
    arguments: Vec<Value>,
    connection: Arc<dyn Connection>,
    id: JobId,
    owners: ExecutionOwners,
    ticket: ExecutionTicket,
) {
    let connection_id = connection.id();
    let emitter = Arc::new(JobEmitter::new(id, connection));
    let progress = ProgressReporter::from_emitter(emitter.clone());

    debug!("executing job {id} for {connection_id}");
    let run = AssertUnwindSafe(work.run(arguments, progress)).catch_unwind();
    let outcome = tokio::select! {
        _ = ticket.cancel.cancelled() => None,
        outcome = run => Some(outcome),
    };

    match outcome {
        None => {
            debug!("job {id} was cancelled, no outcome sent");
            emitter.seal();
        }
        Some(Ok(Ok(value))) => {
            debug!("job {id} resolved");
            emitter.finish(TaskMessage::Resolve { id, value });
        }
        Some(Ok(Err(error))) => {
            debug!("job {id} rejected");
            emitter.finish(TaskMessage::Reject { id, error });
        }
        Some(Err(panic)) => {
            let message = panic_message(panic.as_ref());
            error!("job {id} panicked: {message}");
            emitter.finish(TaskMessage::Reject {
                id,
                error: Value::String(message),
            });
        }
    }

    owners.lock_mut(|o| o.unregister(connection_id, id));
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "work panicked".to_string()
    }
}
