use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use bytes::BytesMut;
use tokio_serde::formats::SymmetricalJson;
use tokio_serde::Serializer;
use tokio_util::codec::Encoder;
use tokio_util::codec::LengthDelimitedCodec;

use crate::application::locks::AtomicMutex;
use crate::application::network::Connection;
use crate::application::network::ConnectionClosedError;
use crate::application::network::ConnectionId;
use crate::protocol::HandshakeData;
use crate::protocol::Role;
use crate::protocol::TaskMessage;

/// Return a handshake with a fixed instance id, so that its encoding is
/// deterministic.
pub(crate) fn dummy_handshake(role: Role, instance_id: u64) -> HandshakeData {
    HandshakeData {
        role,
        version: env!("CARGO_PKG_VERSION").to_string(),
        instance_id,
    }
}

/// The bytes a framed connection puts on the wire for `message`.
pub(crate) fn to_bytes(message: &TaskMessage) -> Result<Bytes> {
    let mut transport = LengthDelimitedCodec::new();
    let mut formating = SymmetricalJson::<TaskMessage>::default();
    let mut buf = BytesMut::new();
    transport.encode(Pin::new(&mut formating).serialize(message)?, &mut buf)?;
    Ok(buf.freeze())
}

/// A [Connection] that records what is sent on it.
#[derive(Debug)]
pub(crate) struct RecordingConnection {
    id: ConnectionId,
    sent: AtomicMutex<Vec<TaskMessage>>,
    closed: AtomicMutex<bool>,
}

impl RecordingConnection {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::next(),
            sent: AtomicMutex::default(),
            closed: AtomicMutex::from(false),
        })
    }

    pub(crate) fn sent(&self) -> Vec<TaskMessage> {
        self.sent.lock(|sent| sent.clone())
    }

    pub(crate) fn close(&self) {
        self.closed.lock_mut(|closed| *closed = true);
    }
}

impl Connection for RecordingConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, message: TaskMessage) -> Result<(), ConnectionClosedError> {
        if self.is_closed() {
            return Err(ConnectionClosedError(self.id));
        }
        self.sent.lock_mut(|sent| sent.push(message));
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.lock(|closed| *closed)
    }
}
