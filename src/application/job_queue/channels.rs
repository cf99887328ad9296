use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

use super::job_completion::JobCompletion;

pub(super) type JobResultReceiver = oneshot::Receiver<JobCompletion>;
pub(super) type JobResultSender = oneshot::Sender<JobCompletion>;

pub type JobProgressReceiver = mpsc::UnboundedReceiver<Value>; // used in pub JobProgress
pub(super) type JobProgressSender = mpsc::UnboundedSender<Value>;
