use std::fmt::Display;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use tokio::sync::mpsc;

use crate::protocol::TaskMessage;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(0);

/// Process-wide unique identifier of one physical connection.
///
/// A reconnect yields a new `ConnectionId`, so ownership recorded for a lost
/// connection can never be mistaken for ownership by its replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("connection {0} is closed")]
pub struct ConnectionClosedError(pub ConnectionId);

/// Lifecycle of a dialed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ConnectionPhase {
    Connecting,
    Open,
    Closed,
}

/// A bidirectional event channel to one remote party.
///
/// Progress relay and execution are written against this trait, so any
/// transport able to carry [TaskMessage]s in order can be plugged in.
pub trait Connection: Send + Sync + std::fmt::Debug {
    fn id(&self) -> ConnectionId;

    /// queues a message.  messages are delivered in the order they were
    /// queued.
    fn send(&self, message: TaskMessage) -> Result<(), ConnectionClosedError>;

    fn is_closed(&self) -> bool;
}

pub type OutboundReceiver = mpsc::UnboundedReceiver<TaskMessage>;

/// The sending half of a connection driven by a connection loop: the loop
/// owns the socket and drains the queue behind this link.
#[derive(Debug, Clone)]
pub struct ConnectionLink {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<TaskMessage>,
}

impl ConnectionLink {
    pub fn new() -> (Self, OutboundReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let link = Self {
            id: ConnectionId::next(),
            tx,
        };
        (link, rx)
    }
}

impl Connection for ConnectionLink {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, message: TaskMessage) -> Result<(), ConnectionClosedError> {
        self.tx
            .send(message)
            .map_err(|_| ConnectionClosedError(self.id))
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn connection_ids_are_unique() {
        let (a, _a_rx) = ConnectionLink::new();
        let (b, _b_rx) = ConnectionLink::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn send_fails_once_the_loop_is_gone() {
        let (link, mut rx) = ConnectionLink::new();

        link.send(TaskMessage::Bye).unwrap();
        assert_eq!(Some(TaskMessage::Bye), rx.try_recv().ok());
        assert!(!link.is_closed());

        drop(rx);
        assert!(link.is_closed());
        assert_eq!(
            Err(ConnectionClosedError(link.id())),
            link.send(TaskMessage::Bye)
        );
    }
}
