use std::time::Duration;

use futures::SinkExt;
use futures::TryStreamExt;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio_serde::formats::Json;
use tokio_serde::formats::SymmetricalJson;
use tokio_serde::SymmetricallyFramed;
use tokio_util::codec::Framed;
use tokio_util::codec::LengthDelimitedCodec;
use tracing::debug;
use tracing::warn;

use crate::protocol::HandshakeData;
use crate::protocol::Role;
use crate::protocol::TaskMessage;
use crate::protocol::MAGIC_STRING_REQUEST;
use crate::protocol::MAGIC_STRING_RESPONSE;

// Max task message size is 16MiB
pub const MAX_TASK_FRAME_LENGTH_IN_BYTES: usize = 16 * 1024 * 1024;

/// A socket speaking [TaskMessage]s.
pub type TaskFramed<S> = tokio_serde::Framed<
    Framed<S, LengthDelimitedCodec>,
    TaskMessage,
    TaskMessage,
    Json<TaskMessage, TaskMessage>,
>;

/// Use this function to ensure that the same rules apply for both
/// ingoing and outgoing connections. This limits the size of messages
/// the other side can send.
pub fn get_codec_rules(max_frame_length: usize) -> LengthDelimitedCodec {
    let mut codec_rules = LengthDelimitedCodec::new();
    codec_rules.set_max_frame_length(max_frame_length);
    codec_rules
}

/// Build the communication/serialization/frame handler
pub fn frame<S>(stream: S, max_frame_length: usize) -> TaskFramed<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let length_delimited = Framed::new(stream, get_codec_rules(max_frame_length));
    SymmetricallyFramed::new(length_delimited, SymmetricalJson::default())
}

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("timed out waiting for handshake")]
    Timeout,

    #[error("connection closed during handshake")]
    ConnectionClosed,

    #[error("expected handshake, got `{0}`")]
    UnexpectedMessage(String),

    #[error("wrong magic value {0:?}")]
    BadMagicValue(Vec<u8>),

    #[error("{own} cannot talk to {other}")]
    IncompatibleRole { own: Role, other: Role },

    #[error("incompatible version. own: {own}, other: {other}")]
    IncompatibleVersion { own: String, other: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Handshake as the dialing side: send ours, then expect theirs.
pub async fn initiate_handshake<S>(
    peer: &mut TaskFramed<S>,
    own_handshake: &HandshakeData,
    timeout: Duration,
) -> Result<HandshakeData, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    peer.send(TaskMessage::Handshake {
        magic_value: MAGIC_STRING_REQUEST.to_vec(),
        data: Box::new(own_handshake.clone()),
    })
    .await?;
    debug!("Awaiting handshake response");

    let other_handshake = receive_handshake(peer, MAGIC_STRING_RESPONSE, timeout).await?;
    check_compatibility(own_handshake, &other_handshake)?;

    Ok(other_handshake)
}

/// Handshake as the accepting side: expect theirs, validate, then reply.
///
/// Nothing is sent back if the other side is not acceptable.
pub async fn answer_handshake<S>(
    peer: &mut TaskFramed<S>,
    own_handshake: &HandshakeData,
    timeout: Duration,
) -> Result<HandshakeData, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let other_handshake = receive_handshake(peer, MAGIC_STRING_REQUEST, timeout).await?;
    check_compatibility(own_handshake, &other_handshake)?;

    peer.send(TaskMessage::Handshake {
        magic_value: MAGIC_STRING_RESPONSE.to_vec(),
        data: Box::new(own_handshake.clone()),
    })
    .await?;

    Ok(other_handshake)
}

async fn receive_handshake<S>(
    peer: &mut TaskFramed<S>,
    expected_magic: &[u8],
    timeout: Duration,
) -> Result<HandshakeData, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let message = tokio::time::timeout(timeout, peer.try_next())
        .await
        .map_err(|_| HandshakeError::Timeout)??;

    match message {
        Some(TaskMessage::Handshake { magic_value, data }) => {
            if magic_value != expected_magic {
                return Err(HandshakeError::BadMagicValue(magic_value));
            }
            Ok(*data)
        }
        Some(other) => Err(HandshakeError::UnexpectedMessage(other.get_type())),
        None => Err(HandshakeError::ConnectionClosed),
    }
}

fn check_compatibility(own: &HandshakeData, other: &HandshakeData) -> Result<(), HandshakeError> {
    if other.role != own.role.counterpart() {
        return Err(HandshakeError::IncompatibleRole {
            own: own.role,
            other: other.role,
        });
    }

    if !versions_are_compatible(&own.version, &other.version) {
        warn!(
            "Attempting to connect to incompatible version. Own version: {}, other version: {}",
            own.version, other.version
        );
        return Err(HandshakeError::IncompatibleVersion {
            own: own.version.clone(),
            other: other.version.clone(),
        });
    }

    Ok(())
}

/// Same major version. Versions "0.0.n" are only compatible with themselves.
pub(crate) fn versions_are_compatible(own_version: &str, other_version: &str) -> bool {
    let parse = |version: &str| match semver::Version::parse(version) {
        Ok(version) => Some(version),
        Err(err) => {
            warn!("Version is not a valid semver version. Got error: {err}");
            None
        }
    };
    let (Some(own_version), Some(other_version)) = (parse(own_version), parse(other_version))
    else {
        return false;
    };

    if own_version.major == 0 && own_version.minor == 0
        || other_version.major == 0 && other_version.minor == 0
    {
        return own_version == other_version;
    }

    own_version.major == other_version.major
}
