/// Consumer client — attaches to a relay session, feeds a [`PlayerMachine`]
/// and reconnects with backoff.
///
/// A single task owns the socket and the machine. The application talks to
/// it through a [`ConsumerHandle`] and reads [`ConsumerEvent`]s. A fresh
/// machine is built for every connection; the relay's cache replay brings
/// it up to date.
use std::time::Duration;

use encore_wire::{Envelope, ErrorPayload, Hello, Lyrics, Message, Role, SessionId};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use url::Url;

use crate::backoff::ReconnectBackoff;
use crate::connection::{self, Inbound, WsStream};
use crate::machine::{MachineEvent, PlayerMachine, Snapshot};
use crate::{ClientConfig, ClientError};

// ── Events (client → app) ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ConsumerEvent {
    /// Registered with the relay.
    Welcome {
        session_id: SessionId,
        connected_at: u64,
    },
    /// Auto-join was ambiguous; pick one with [`ConsumerHandle::join`].
    Sessions(Vec<SessionId>),
    /// The relay reported an error.
    Error(ErrorPayload),
    /// Machine state after any change.
    State(Snapshot),
    Lyrics(Lyrics),
    /// The connection dropped; the client retries after `retry_in`.
    Disconnected { reason: String, retry_in: Duration },
}

// ── Commands (app → client) ───────────────────────────────────────────

enum ConsumerCommand {
    Intent(MachineEvent),
    Join(SessionId),
    Shutdown,
}

/// Handle to a running consumer. Cheap to clone.
#[derive(Clone)]
pub struct ConsumerHandle {
    cmd_tx: mpsc::Sender<ConsumerCommand>,
}

impl ConsumerHandle {
    /// Play a specific track.
    pub async fn select(&self, track_id: impl Into<String>) -> Result<(), ClientError> {
        self.intent(MachineEvent::UserSelect {
            track_id: track_id.into(),
        })
        .await
    }

    pub async fn next(&self) -> Result<(), ClientError> {
        self.intent(MachineEvent::UserNext).await
    }

    /// Go back one track, or restart the current one when `allow_rewind`
    /// is set and playback is past the rewind threshold.
    pub async fn prev(&self, allow_rewind: bool, position_ms: u64) -> Result<(), ClientError> {
        self.intent(MachineEvent::UserPrev {
            allow_rewind,
            position_ms,
        })
        .await
    }

    pub async fn rewind(&self) -> Result<(), ClientError> {
        self.intent(MachineEvent::UserRewind).await
    }

    /// Join a specific session, e.g. one listed after an ambiguous auto-join.
    pub async fn join(&self, session_id: SessionId) -> Result<(), ClientError> {
        self.send(ConsumerCommand::Join(session_id)).await
    }

    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(ConsumerCommand::Shutdown).await;
    }

    async fn intent(&self, event: MachineEvent) -> Result<(), ClientError> {
        self.send(ConsumerCommand::Intent(event)).await
    }

    async fn send(&self, cmd: ConsumerCommand) -> Result<(), ClientError> {
        self.cmd_tx.send(cmd).await.map_err(|_| ClientError::Shutdown)
    }
}

/// Channels returned when a consumer starts.
pub struct ConsumerChannels {
    pub handle: ConsumerHandle,
    pub events: mpsc::Receiver<ConsumerEvent>,
}

// ── ConsumerClient ───────────────────────────────────────────────────

pub struct ConsumerClient;

impl ConsumerClient {
    /// Validate the config and spawn the consumer task.
    pub fn spawn(config: ClientConfig) -> Result<ConsumerChannels, ClientError> {
        let url = Url::parse(&config.url)?;
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer);

        let task = ConsumerTask {
            base_url: url,
            session: config.session_id.clone(),
            auto_join: config.auto_join,
            backoff: ReconnectBackoff::with_schedule(config.reconnect_schedule.clone()),
            cmd_rx,
            event_tx,
        };
        tokio::spawn(task.run());

        Ok(ConsumerChannels {
            handle: ConsumerHandle { cmd_tx },
            events: event_rx,
        })
    }
}

/// How one connection ended.
enum SessionEnd {
    Shutdown,
    /// Reconnect right away, e.g. to switch sessions.
    Rejoin,
    Lost(String),
}

struct ConsumerTask {
    base_url: Url,
    /// Session from `welcome` or `join`, reused on every reconnection.
    session: Option<SessionId>,
    auto_join: bool,
    backoff: ReconnectBackoff,
    cmd_rx: mpsc::Receiver<ConsumerCommand>,
    event_tx: mpsc::Sender<ConsumerEvent>,
}

impl ConsumerTask {
    async fn run(mut self) {
        loop {
            let url = connection::session_url(
                &self.base_url,
                self.session.as_ref(),
                self.auto_join && self.session.is_none(),
            );
            let reason = match connection::open(&url).await {
                Ok(ws) => match self.run_connection(ws).await {
                    SessionEnd::Shutdown => return,
                    SessionEnd::Rejoin => continue,
                    SessionEnd::Lost(reason) => reason,
                },
                Err(e) => e.to_string(),
            };

            let retry_in = self.backoff.next_delay();
            tracing::info!(%reason, ?retry_in, "consumer disconnected");
            self.emit(ConsumerEvent::Disconnected { reason, retry_in }).await;
            if !self.wait_offline(retry_in).await {
                return;
            }
        }
    }

    /// Sleep out the backoff while still honouring commands. Returns false
    /// on shutdown.
    async fn wait_offline(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                cmd = self.cmd_rx.recv() => match cmd {
                    None | Some(ConsumerCommand::Shutdown) => return false,
                    Some(ConsumerCommand::Join(session)) => self.session = Some(session),
                    Some(ConsumerCommand::Intent(event)) => {
                        tracing::debug!(?event, "offline, intent dropped");
                    }
                },
            }
        }
    }

    async fn run_connection(&mut self, ws: WsStream) -> SessionEnd {
        let (mut sink, mut stream) = ws.split();
        let mut machine = PlayerMachine::new();
        let mut registered: Option<SessionId> = None;

        let hello = hello_envelope(self.session.clone().unwrap_or_default());
        if let Err(e) = connection::send_envelope(&mut sink, &hello).await {
            return SessionEnd::Lost(e.to_string());
        }

        loop {
            let deadline = machine.ack_deadline();
            tokio::select! {
                item = stream.next() => match Inbound::from_ws(item) {
                    Inbound::Envelope(envelope) => {
                        self.on_envelope(envelope, &mut machine, &mut registered).await;
                    }
                    Inbound::Closed(reason) => return SessionEnd::Lost(reason),
                    Inbound::Ignored => {}
                },

                cmd = self.cmd_rx.recv() => match cmd {
                    None | Some(ConsumerCommand::Shutdown) => {
                        let _ = sink.close().await;
                        return SessionEnd::Shutdown;
                    }
                    Some(ConsumerCommand::Join(session)) => {
                        self.session = Some(session.clone());
                        if registered.is_some() {
                            let _ = sink.close().await;
                            return SessionEnd::Rejoin;
                        }
                        // Still role-less: a second hello naming the session
                        // registers on this connection.
                        if let Err(e) = connection::send_envelope(&mut sink, &hello_envelope(session)).await {
                            return SessionEnd::Lost(e.to_string());
                        }
                    }
                    Some(ConsumerCommand::Intent(event)) => {
                        let Some(session) = registered.clone() else {
                            tracing::debug!(?event, "not joined yet, intent dropped");
                            continue;
                        };
                        let command = machine.handle(event, Instant::now());
                        if let Some(command) = command {
                            let envelope = Envelope::new(session, Message::Control(command));
                            if let Err(e) = connection::send_envelope(&mut sink, &envelope).await {
                                return SessionEnd::Lost(e.to_string());
                            }
                        }
                        self.emit(ConsumerEvent::State(machine.snapshot())).await;
                    }
                },

                _ = ack_timer(deadline) => {
                    machine.handle(MachineEvent::AckTimeout, Instant::now());
                    self.emit(ConsumerEvent::State(machine.snapshot())).await;
                }
            }
        }
    }

    async fn on_envelope(
        &mut self,
        envelope: Envelope,
        machine: &mut PlayerMachine,
        registered: &mut Option<SessionId>,
    ) {
        let now = Instant::now();
        match envelope.message {
            Message::Welcome(welcome) => {
                tracing::info!(session = %welcome.session_id, "joined session");
                self.backoff.reset();
                self.session = Some(welcome.session_id.clone());
                *registered = Some(welcome.session_id.clone());
                self.emit(ConsumerEvent::Welcome {
                    session_id: welcome.session_id,
                    connected_at: welcome.connected_at,
                })
                .await;
            }
            Message::Sessions(list) => {
                self.emit(ConsumerEvent::Sessions(list.sessions)).await;
            }
            Message::Error(error) => {
                tracing::warn!(code = %error.code, "relay error: {}", error.message);
                self.emit(ConsumerEvent::Error(error)).await;
            }
            Message::PlayerState(state) => {
                machine.handle(MachineEvent::ServerPlayer(state), now);
                self.emit(ConsumerEvent::State(machine.snapshot())).await;
            }
            Message::QueueUpdate(queue) => {
                machine.handle(MachineEvent::ServerQueue(queue), now);
                self.emit(ConsumerEvent::State(machine.snapshot())).await;
            }
            Message::Lyrics(lyrics) => {
                self.emit(ConsumerEvent::Lyrics(lyrics)).await;
            }
            other => {
                tracing::debug!(kind = other.kind().as_str(), "ignoring message");
            }
        }
    }

    async fn emit(&self, event: ConsumerEvent) {
        if self.event_tx.send(event).await.is_err() {
            tracing::debug!("event receiver dropped");
        }
    }
}

fn hello_envelope(session: SessionId) -> Envelope {
    Envelope::new(
        session,
        Message::Hello(Hello {
            role: Role::Consumer,
        }),
    )
}

/// Resolves at `deadline`, or never when there is none.
async fn ack_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
