//! WebSocket plumbing shared by the consumer, producer and discovery.

use encore_wire::{Envelope, SessionId};
use futures_util::{Sink, SinkExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::ClientError;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Relay URL carrying the session id and auto-join flag as query params.
pub(crate) fn session_url(base: &Url, session: Option<&SessionId>, auto_join: bool) -> Url {
    let mut url = base.clone();
    let session = session.filter(|s| !s.is_empty());
    if session.is_some() || auto_join {
        let mut query = url.query_pairs_mut();
        if let Some(session) = session {
            query.append_pair("sessionId", session.as_str());
        }
        if auto_join {
            query.append_pair("autoJoin", "true");
        }
    }
    url
}

pub(crate) async fn open(url: &Url) -> Result<WsStream, ClientError> {
    let (ws, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|source| ClientError::Connect {
            url: url.to_string(),
            source,
        })?;
    Ok(ws)
}

pub(crate) async fn send_envelope<S>(sink: &mut S, envelope: &Envelope) -> Result<(), ClientError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    sink.send(Message::Text(envelope.to_text()?)).await?;
    Ok(())
}

/// One inbound WebSocket item, reduced to what the clients act on.
#[derive(Debug)]
pub(crate) enum Inbound {
    Envelope(Envelope),
    /// The connection is over; the string says why.
    Closed(String),
    Ignored,
}

impl Inbound {
    pub(crate) fn from_ws(item: Option<Result<Message, tungstenite::Error>>) -> Self {
        match item {
            Some(Ok(Message::Text(text))) => match Envelope::from_bytes(text.as_bytes()) {
                Ok(envelope) => Inbound::Envelope(envelope),
                Err(e) => {
                    tracing::warn!("undecodable frame from relay: {e}");
                    Inbound::Ignored
                }
            },
            Some(Ok(Message::Close(Some(frame)))) => {
                Inbound::Closed(format!("{} {}", u16::from(frame.code), frame.reason))
            }
            Some(Ok(Message::Close(None))) => Inbound::Closed("closed by relay".into()),
            Some(Ok(_)) => Inbound::Ignored,
            Some(Err(e)) => Inbound::Closed(e.to_string()),
            None => Inbound::Closed("stream ended".into()),
        }
    }
}
