/// WebSocket front end: accepts TCP connections, upgrades them and pumps
/// frames between each socket and the hub actor.
use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::Message;

use crate::hub::{ConnId, ConnectParams};
use crate::runtime::{HubHandle, Outbound};
use crate::{RelayConfig, RelayError};

/// Per-connection limits taken from [`RelayConfig`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnectionLimits {
    outbound_buffer: usize,
    max_frame_size: usize,
}

impl ConnectionLimits {
    fn websocket_config(self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.max_frame_size);
        config.max_frame_size = Some(self.max_frame_size);
        config
    }
}

impl From<&RelayConfig> for ConnectionLimits {
    fn from(config: &RelayConfig) -> Self {
        Self {
            outbound_buffer: config.outbound_buffer.max(1),
            max_frame_size: config.max_frame_size,
        }
    }
}

/// Accept connections until `shutdown` flips or its sender is dropped.
pub(crate) async fn accept_loop(
    listener: TcpListener,
    hub: HubHandle,
    limits: ConnectionLimits,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut next_conn: ConnId = 0;
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    next_conn += 1;
                    tokio::spawn(serve_connection(stream, peer, next_conn, hub.clone(), limits));
                }
                Err(e) => tracing::warn!("accept failed: {e}"),
            },
            _ = shutdown.changed() => break,
        }
    }
    tracing::info!("relay stopped accepting connections");
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    conn: ConnId,
    hub: HubHandle,
    limits: ConnectionLimits,
) {
    match run_connection(stream, conn, &hub, limits).await {
        Ok(()) => tracing::debug!(conn, %peer, "connection closed"),
        Err(e) => tracing::debug!(conn, %peer, "connection ended: {e}"),
    }
    hub.closed(conn).await;
}

async fn run_connection(
    stream: TcpStream,
    conn: ConnId,
    hub: &HubHandle,
    limits: ConnectionLimits,
) -> Result<(), RelayError> {
    let mut query = None;
    let capture_query = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        query = request.uri().query().map(str::to_owned);
        Ok(response)
    };
    let ws = tokio_tungstenite::accept_hdr_async_with_config(
        stream,
        capture_query,
        Some(limits.websocket_config()),
    )
    .await?;

    let (outbound_tx, mut outbound_rx) = mpsc::channel(limits.outbound_buffer);
    hub.open(conn, ConnectParams::from_query(query.as_deref()), outbound_tx)
        .await?;

    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => hub.frame(conn, text).await?,
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => hub.frame(conn, text).await?,
                    Err(_) => tracing::debug!(conn, "non-utf8 binary frame dropped"),
                },
                Some(Ok(Message::Close(_))) | None => break,
                // Ping/pong are answered by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },

            outbound = outbound_rx.recv() => match outbound {
                Some(Outbound::Frame(text)) => sink.send(Message::Text(text)).await?,
                Some(Outbound::Close(reason)) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(reason.code()),
                        reason: reason.reason().into(),
                    };
                    sink.send(Message::Close(Some(frame))).await?;
                    break;
                }
                // Hub dropped the connection without a reason.
                None => break,
            },
        }
    }

    let _ = sink.close().await;
    Ok(())
}
