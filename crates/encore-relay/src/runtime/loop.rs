/// The hub event loop.
///
/// A single async task that owns the [`Hub`] and every connection's
/// outbound sender, multiplexing connection commands with the expiry timer.
use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::hub::{ConnId, Hub};

use super::executor::execute_effects;
use super::{HubCommand, Outbound};

pub(super) async fn hub_loop(
    mut hub: Hub,
    sweep_interval: Duration,
    mut cmd_rx: mpsc::Receiver<HubCommand>,
) {
    let mut outbound: HashMap<ConnId, mpsc::Sender<Outbound>> = HashMap::new();

    let mut sweep = tokio::time::interval(sweep_interval);
    // Skip the immediate first tick
    sweep.tick().await;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    tracing::debug!("all hub handles dropped");
                    break;
                };
                match cmd {
                    HubCommand::Open { conn, params, outbound: tx } => {
                        outbound.insert(conn, tx);
                        hub.open(conn, params);
                    }
                    HubCommand::Frame { conn, text } => {
                        let effects = hub.handle_frame(conn, &text, Instant::now());
                        execute_effects(effects, &mut outbound);
                    }
                    HubCommand::Closed { conn } => {
                        outbound.remove(&conn);
                        hub.disconnect(conn);
                    }
                    HubCommand::ActiveSessions { reply } => {
                        let _ = reply.send(hub.active_sessions());
                    }
                    HubCommand::Shutdown => {
                        let effects = hub.shutdown();
                        tracing::info!(connections = effects.len(), "hub shutting down");
                        execute_effects(effects, &mut outbound);
                        break;
                    }
                }
            }

            _ = sweep.tick() => {
                let effects = hub.sweep(Instant::now());
                if !effects.is_empty() {
                    tracing::debug!(expired = effects.len(), "expiry sweep");
                }
                execute_effects(effects, &mut outbound);
            }
        }
    }
}
