use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use futures::FutureExt;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::connection_loop::ConnectionHandler;
use super::connection_loop::ConnectionLoop;
use crate::application::config::cli_args::Args;
use crate::application::network::framing::answer_handshake;
use crate::application::network::framing::frame;
use crate::application::network::framing::initiate_handshake;
use crate::application::network::Connection;
use crate::application::network::ConnectionLink;
use crate::application::network::ConnectionPhase;
use crate::protocol::HandshakeData;

/// Respond to an incoming connection.
///
/// Catch and process errors (if any) gracefully.  A panic in the connection
/// task still runs the handler's disconnect callback.
///
/// All incoming connections must go through this function.
pub(crate) async fn answer_peer<S>(
    stream: S,
    peer_address: SocketAddr,
    handler: Arc<dyn ConnectionHandler>,
    own_handshake: HandshakeData,
    args: Args,
    shutdown: CancellationToken,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + std::fmt::Debug + Unpin,
{
    let (link, outbound_rx) = ConnectionLink::new();
    let connection_id = link.id();
    let handler_clone = handler.clone();
    let mut inner_ret: Result<()> = Ok(());

    let panic_result = std::panic::AssertUnwindSafe(async {
        info!("Established incoming TCP connection with {peer_address}");
        let mut peer = frame(stream, args.max_frame_length);
        let other_handshake =
            answer_handshake(&mut peer, &own_handshake, args.handshake_timeout).await;
        inner_ret = match other_handshake {
            Ok(other_handshake) => {
                info!(
                    "Connection accepted from {} {peer_address} ({connection_id})",
                    other_handshake.role
                );
                ConnectionLoop::new(handler, peer_address, shutdown)
                    .run_wrapper(peer, link, outbound_rx)
                    .await
            }
            Err(err) => {
                warn!("Refusing incoming connection from {peer_address}: {err}");
                Err(err.into())
            }
        };
    })
    .catch_unwind()
    .await;

    if panic_result.is_err() {
        error!("Connection task (incoming) for {peer_address} panicked. Invoking close connection callback");
        handler_clone.on_disconnect(connection_id);
    }

    inner_ret
}

/// Perform handshake and drive a dialed connection, while handling any
/// panics in the connection task gracefully.
///
/// `phase` becomes [ConnectionPhase::Open] once the handshake succeeded.
///
/// All outgoing connections must go through this function.
pub(crate) async fn call_peer<S>(
    stream: S,
    peer_address: SocketAddr,
    handler: Arc<dyn ConnectionHandler>,
    own_handshake: &HandshakeData,
    args: &Args,
    phase: &watch::Sender<ConnectionPhase>,
    shutdown: CancellationToken,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + std::fmt::Debug + Unpin,
{
    let (link, outbound_rx) = ConnectionLink::new();
    let connection_id = link.id();
    let handler_clone = handler.clone();
    let mut inner_ret: Result<()> = Ok(());

    let panic_result = std::panic::AssertUnwindSafe(async {
        info!("Established outgoing TCP connection with {peer_address}");
        let mut peer = frame(stream, args.max_frame_length);
        inner_ret = match initiate_handshake(&mut peer, own_handshake, args.handshake_timeout).await
        {
            Ok(other_handshake) => {
                info!(
                    "Outgoing connection accepted by {} {peer_address} ({connection_id})",
                    other_handshake.role
                );
                phase.send_replace(ConnectionPhase::Open);
                ConnectionLoop::new(handler, peer_address, shutdown)
                    .run_wrapper(peer, link, outbound_rx)
                    .await
            }
            Err(err) => {
                warn!("Handshake with {peer_address} failed: {err}");
                Err(err.into())
            }
        };
    })
    .catch_unwind()
    .await;

    if panic_result.is_err() {
        error!("Connection task (outgoing) for {peer_address} panicked. Invoking close connection callback");
        handler_clone.on_disconnect(connection_id);
    }

    inner_ret
}

/// Keeps one dialed connection alive until `shutdown` is cancelled.
///
/// A lost or failed connection is retried after the reconnection delay,
/// which doubles with every consecutive failure and resets once a
/// connection opens.  `phase` reports where the loop currently is.
pub(crate) async fn dial_loop(
    peer: String,
    handler: Arc<dyn ConnectionHandler>,
    own_handshake: HandshakeData,
    args: Args,
    phase: watch::Sender<ConnectionPhase>,
    shutdown: CancellationToken,
) {
    let mut consecutive_failures = 0u32;

    loop {
        phase.send_replace(ConnectionPhase::Connecting);
        debug!("Attempting to initiate connection to {peer}");

        let stream = tokio::select! {
            () = shutdown.cancelled() => break,
            stream = TcpStream::connect(peer.as_str()) => stream,
        };

        match stream {
            Err(err) => warn!("Failed to establish connection to {peer}: {err}"),
            Ok(stream) => match stream.peer_addr() {
                Err(err) => warn!("Connection to {peer} lost right away: {err}"),
                Ok(peer_address) => {
                    if let Err(err) = call_peer(
                        stream,
                        peer_address,
                        handler.clone(),
                        &own_handshake,
                        &args,
                        &phase,
                        shutdown.clone(),
                    )
                    .await
                    {
                        error!("An error occurred: {err}. Connection closing");
                    }
                    info!("Connection to {peer_address} closing");
                }
            },
        }

        if shutdown.is_cancelled() {
            break;
        }
        if *phase.borrow() == ConnectionPhase::Open {
            consecutive_failures = 0;
        }
        phase.send_replace(ConnectionPhase::Connecting);

        let delay = args.reconnection_backoff(consecutive_failures);
        consecutive_failures = consecutive_failures.saturating_add(1);
        info!(
            "Reconnecting to {peer} in {}",
            humantime::format_duration(delay)
        );
        tokio::select! {
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    phase.send_replace(ConnectionPhase::Closed);
    debug!("Stopped dialing {peer}");
}

/// Accepts connections until `shutdown` is cancelled.  Each connection gets
/// the handler returned by `handler_for_connection` and runs in its own task
/// on `tasks`.
pub(crate) async fn accept_loop<F>(
    listener: TcpListener,
    handler_for_connection: F,
    own_handshake: HandshakeData,
    args: Args,
    tasks: TaskTracker,
    shutdown: CancellationToken,
) where
    F: Fn() -> Arc<dyn ConnectionHandler> + Send,
{
    loop {
        let accepted = tokio::select! {
            () = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer_address)) => {
                tasks.spawn(answer_peer(
                    stream,
                    peer_address,
                    handler_for_connection(),
                    own_handshake.clone(),
                    args.clone(),
                    shutdown.clone(),
                ));
            }
            Err(err) => warn!("Failed to accept connection: {err}"),
        }
    }

    debug!("Stopped accepting connections");
}
