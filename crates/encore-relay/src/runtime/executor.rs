//! Effect executor — the only place hub output reaches a connection.
//!
//! - Send -> try_send a frame on the connection's outbound queue
//! - Close -> try_send the close, then drop the queue so the connection
//!   task ends even if the close did not fit

use std::collections::HashMap;

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::hub::{ConnId, HubEffect};

use super::Outbound;

/// Execute hub effects against the per-connection outbound queues.
pub(super) fn execute_effects(
    effects: Vec<HubEffect>,
    outbound: &mut HashMap<ConnId, mpsc::Sender<Outbound>>,
) {
    for effect in effects {
        match effect {
            HubEffect::Send { conn, frame } => {
                let Some(tx) = outbound.get(&conn) else {
                    tracing::debug!(conn, "send to unknown connection dropped");
                    continue;
                };
                // try_send: a slow connection never stalls the hub
                match tx.try_send(Outbound::Frame(frame)) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(conn, "outbound queue full, frame dropped");
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!(conn, "connection already gone");
                    }
                }
            }
            HubEffect::Close { conn, reason } => {
                if let Some(tx) = outbound.remove(&conn) {
                    let _ = tx.try_send(Outbound::Close(reason));
                }
            }
        }
    }
}
