use std::time::Duration;

use encore_wire::{Handshake, Message, SessionId};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;
use url::Url;

use crate::connection::{self, Inbound};
use crate::ClientError;

/// How long discovery waits for the relay's answer.
pub const DISCOVER_TIMEOUT: Duration = Duration::from_secs(5);

/// Ask a relay which sessions currently have a producer.
///
/// Opens a throwaway connection, sends `discover` and closes once the
/// `sessions` reply arrives.
pub async fn discover(url: &str) -> Result<Vec<SessionId>, ClientError> {
    let url = Url::parse(url)?;
    tokio::time::timeout(DISCOVER_TIMEOUT, discover_inner(&url))
        .await
        .map_err(|_| ClientError::Timeout)?
}

async fn discover_inner(url: &Url) -> Result<Vec<SessionId>, ClientError> {
    let mut ws = connection::open(url).await?;
    ws.send(tungstenite::Message::Text(Handshake::discover_text()?))
        .await?;

    loop {
        match Inbound::from_ws(ws.next().await) {
            Inbound::Envelope(envelope) => match envelope.message {
                Message::Sessions(list) => {
                    let _ = ws.close(None).await;
                    tracing::debug!(count = list.sessions.len(), "discovered sessions");
                    return Ok(list.sessions);
                }
                Message::Error(error) => {
                    return Err(ClientError::Relay {
                        code: error.code,
                        message: error.message,
                    });
                }
                other => {
                    tracing::debug!(kind = other.kind().as_str(), "ignoring message");
                }
            },
            Inbound::Closed(reason) => return Err(ClientError::Closed(reason)),
            Inbound::Ignored => {}
        }
    }
}
