/// Hub runtime — runs the [`Hub`] as a single-writer actor.
///
/// Connection tasks never touch hub state. They send commands over one
/// mpsc channel, and the actor applies them one at a time, so registration,
/// routing and version stamping can never interleave. Expiry sweeps run on
/// the same task.
mod executor;
mod r#loop;

use std::time::Duration;

use encore_wire::SessionId;
use tokio::sync::{mpsc, oneshot};

use crate::hub::{CloseReason, ConnId, ConnectParams, Hub};
use crate::RelayError;

// ── Commands (connections → hub) ──────────────────────────────────────

pub(crate) enum HubCommand {
    /// A connection finished its WebSocket handshake.
    Open {
        conn: ConnId,
        params: ConnectParams,
        outbound: mpsc::Sender<Outbound>,
    },
    /// One inbound text frame.
    Frame { conn: ConnId, text: String },
    /// The socket is gone.
    Closed { conn: ConnId },
    /// Query: sessions with a registered producer.
    ActiveSessions {
        reply: oneshot::Sender<Vec<SessionId>>,
    },
    /// Close every connection and stop.
    Shutdown,
}

// ── Outbound (hub → one connection) ───────────────────────────────────

#[derive(Debug, PartialEq)]
pub(crate) enum Outbound {
    Frame(String),
    Close(CloseReason),
}

// ── HubHandle ────────────────────────────────────────────────────────

/// Handle to the running hub actor. Cheap to clone.
#[derive(Clone)]
pub(crate) struct HubHandle {
    cmd_tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    pub(crate) async fn open(
        &self,
        conn: ConnId,
        params: ConnectParams,
        outbound: mpsc::Sender<Outbound>,
    ) -> Result<(), RelayError> {
        self.send(HubCommand::Open {
            conn,
            params,
            outbound,
        })
        .await
    }

    pub(crate) async fn frame(&self, conn: ConnId, text: String) -> Result<(), RelayError> {
        self.send(HubCommand::Frame { conn, text }).await
    }

    pub(crate) async fn closed(&self, conn: ConnId) {
        let _ = self.cmd_tx.send(HubCommand::Closed { conn }).await;
    }

    pub(crate) async fn active_sessions(&self) -> Vec<SessionId> {
        let (tx, rx) = oneshot::channel();
        let _ = self
            .cmd_tx
            .send(HubCommand::ActiveSessions { reply: tx })
            .await;
        rx.await.unwrap_or_default()
    }

    pub(crate) async fn shutdown(&self) {
        let _ = self.cmd_tx.send(HubCommand::Shutdown).await;
    }

    async fn send(&self, cmd: HubCommand) -> Result<(), RelayError> {
        self.cmd_tx.send(cmd).await.map_err(|_| RelayError::HubClosed)
    }
}

// ── HubRuntime ───────────────────────────────────────────────────────

pub(crate) struct HubRuntime;

impl HubRuntime {
    /// Spawn the hub actor on the current tokio runtime.
    pub(crate) fn spawn(hub: Hub, sweep_interval: Duration) -> HubHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel::<HubCommand>(1024);
        tokio::spawn(r#loop::hub_loop(hub, sweep_interval, cmd_rx));
        HubHandle { cmd_tx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CEILING: Duration = Duration::from_secs(30 * 60);
    const SWEEP: Duration = Duration::from_secs(60);

    fn hello(role: &str, session: &str) -> String {
        format!(
            r#"{{"v":1,"sessionId":"{session}","kind":"hello","ts":0,"payload":{{"role":"{role}"}}}}"#
        )
    }

    async fn connect(hub: &HubHandle, conn: ConnId) -> mpsc::Receiver<Outbound> {
        let (tx, rx) = mpsc::channel(16);
        hub.open(conn, ConnectParams::default(), tx).await.unwrap();
        rx
    }

    #[tokio::test]
    async fn registers_and_answers_queries() {
        let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();
        let hub = HubRuntime::spawn(Hub::new(CEILING), SWEEP);

        let mut rx = connect(&hub, 1).await;
        hub.frame(1, hello("producer", "s1")).await.unwrap();

        let Some(Outbound::Frame(welcome)) = rx.recv().await else {
            panic!("expected welcome frame");
        };
        assert!(welcome.contains(r#""kind":"welcome""#));
        assert_eq!(hub.active_sessions().await, vec![SessionId::from("s1")]);

        hub.closed(1).await;
        assert!(hub.active_sessions().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_closes_old_connections() {
        let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();
        let hub = HubRuntime::spawn(Hub::new(CEILING), SWEEP);

        let mut rx = connect(&hub, 1).await;
        hub.frame(1, hello("consumer", "s1")).await.unwrap();
        assert!(matches!(rx.recv().await, Some(Outbound::Frame(_))));

        tokio::time::sleep(CEILING + SWEEP + Duration::from_secs(1)).await;

        assert_eq!(rx.recv().await, Some(Outbound::Close(CloseReason::Expired)));
        // The executor dropped its sender after the close.
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn shutdown_closes_connections_and_stops() {
        let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();
        let hub = HubRuntime::spawn(Hub::new(CEILING), SWEEP);

        let mut rx = connect(&hub, 1).await;
        hub.shutdown().await;

        assert_eq!(rx.recv().await, Some(Outbound::Close(CloseReason::Shutdown)));
        assert!(hub.frame(1, hello("consumer", "")).await.is_err());
    }
}
