use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use super::handshake_data::HandshakeData;
use crate::application::job_queue::JobId;

/// Sent by the dialing side as the first frame of every connection.
pub const MAGIC_STRING_REQUEST: &[u8] = b"4F1C0D3A7E95B2C8A6D0E1F2B3C4D5E6";

/// Sent back by the accepting side in its handshake reply.
pub const MAGIC_STRING_RESPONSE: &[u8] = b"Hello remote tasks!\n";

/// Every event that can travel over a task connection.
///
/// Serialized as JSON with an `event` tag, one message per length-delimited
/// frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskMessage {
    Handshake {
        magic_value: Vec<u8>,
        data: Box<HandshakeData>,
    },

    /// Caller to Runner: execute a job.
    Do { id: JobId, arguments: Vec<Value> },

    /// Runner to Caller: progress notification for a job.
    Report { id: JobId, payload: Value },

    /// Runner to Caller: the job succeeded.
    Resolve { id: JobId, value: Value },

    /// Runner to Caller: the job failed.
    Reject { id: JobId, error: Value },

    /// Orderly close.
    Bye,
}

impl TaskMessage {
    pub fn get_type(&self) -> String {
        match self {
            TaskMessage::Handshake { .. } => "handshake",
            TaskMessage::Do { .. } => "do",
            TaskMessage::Report { .. } => "report",
            TaskMessage::Resolve { .. } => "resolve",
            TaskMessage::Reject { .. } => "reject",
            TaskMessage::Bye => "bye",
        }
        .to_string()
    }

    /// The job this message belongs to, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            TaskMessage::Do { id, .. }
            | TaskMessage::Report { id, .. }
            | TaskMessage::Resolve { id, .. }
            | TaskMessage::Reject { id, .. } => Some(*id),
            TaskMessage::Handshake { .. } | TaskMessage::Bye => None,
        }
    }

    /// true for `resolve` and `reject`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskMessage::Resolve { .. } | TaskMessage::Reject { .. })
    }
}
