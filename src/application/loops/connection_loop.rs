use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::bail;
use anyhow::Result;
use futures::sink::Sink;
use futures::sink::SinkExt;
use futures::stream::TryStream;
use futures::stream::TryStreamExt;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::application::network::connection::OutboundReceiver;
use crate::application::network::Connection;
use crate::application::network::ConnectionId;
use crate::application::network::ConnectionLink;
use crate::protocol::Role;
use crate::protocol::TaskMessage;

/// The role-specific reaction to the events of a connection.
///
/// Handlers are infallible and never block: every method runs to completion
/// without awaiting, so nothing a remote party sends can stall or fail the
/// loop that drives the connection.
pub trait ConnectionHandler: Send + Sync {
    fn role(&self) -> Role;

    /// called once the handshake succeeded, before any message is handled.
    fn on_connect(&self, link: &ConnectionLink);

    fn on_message(&self, link: &ConnectionLink, message: TaskMessage);

    /// called exactly once per opened connection, after the link is closed.
    /// Must also tolerate being called for a connection that never opened.
    fn on_disconnect(&self, connection: ConnectionId);
}

/// Drives one open connection until either side closes it.
pub(crate) struct ConnectionLoop {
    handler: Arc<dyn ConnectionHandler>,
    peer_address: SocketAddr,
    shutdown: CancellationToken,
}

impl ConnectionLoop {
    pub(crate) fn new(
        handler: Arc<dyn ConnectionHandler>,
        peer_address: SocketAddr,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            handler,
            peer_address,
            shutdown,
        }
    }

    /// Loop for the connection tasks. Awaits either a message from the
    /// other side, a message queued on the link, or shutdown.
    async fn run<S>(
        &self,
        mut peer: S,
        link: &ConnectionLink,
        mut outbound_rx: OutboundReceiver,
    ) -> Result<()>
    where
        S: Sink<TaskMessage> + TryStream<Ok = TaskMessage> + Unpin,
        <S as Sink<TaskMessage>>::Error: std::error::Error + Sync + Send + 'static,
        <S as TryStream>::Error: std::error::Error,
    {
        let peer_address = self.peer_address;
        loop {
            select! {
                () = self.shutdown.cancelled() => {
                    info!("Closing connection to {peer_address}");
                    // best effort, the other side copes with a plain close too
                    let _ = peer.send(TaskMessage::Bye).await;
                    break;
                }

                // Messages queued by the role, in order
                Some(message) = outbound_rx.recv() => {
                    peer.send(message).await?;
                }

                // Messages from the other side
                peer_message = peer.try_next() => {
                    let peer_message = match peer_message {
                        Ok(message) => message,
                        Err(err) => {
                            warn!("Error when receiving from {peer_address}: {err}");
                            bail!("Closing connection to {peer_address} because of error {err}.");
                        }
                    };
                    let Some(peer_message) = peer_message else {
                        info!("{peer_address} closed connection.");
                        break;
                    };

                    match peer_message {
                        TaskMessage::Bye => {
                            info!("Got bye from {peer_address}. Closing connection.");
                            break;
                        }
                        TaskMessage::Handshake { .. } => {
                            warn!("Ignoring repeated handshake from {peer_address}");
                        }
                        message => {
                            let kind = message.get_type();
                            match message.job_id() {
                                Some(id) => debug!("Got {kind} for job {id} from {peer_address}"),
                                None => debug!("Got {kind} from {peer_address}"),
                            }
                            self.handler.on_message(link, message);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Announces the connection to the handler, runs the loop, and always
    /// runs the disconnect callback afterwards, regardless of how the loop
    /// ended.
    pub(crate) async fn run_wrapper<S>(
        &self,
        peer: S,
        link: ConnectionLink,
        outbound_rx: OutboundReceiver,
    ) -> Result<()>
    where
        S: Sink<TaskMessage> + TryStream<Ok = TaskMessage> + Unpin,
        <S as Sink<TaskMessage>>::Error: std::error::Error + Sync + Send + 'static,
        <S as TryStream>::Error: std::error::Error,
    {
        self.handler.on_connect(&link);

        let res = self.run(peer, &link, outbound_rx).await;
        debug!(
            "Exited {} connection loop for {}",
            self.handler.role(),
            self.peer_address
        );

        // outbound_rx is gone by now, so the link reports itself closed
        debug_assert!(link.is_closed());
        self.handler.on_disconnect(link.id());

        res
    }
}
