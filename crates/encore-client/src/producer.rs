/// Producer client — publishes now-playing state to a relay session and
/// receives control commands from its consumers.
///
/// The session id is fixed for the life of the client. Every (re)connection
/// re-sends the latest known state right after `hello`, because a producer
/// disconnect empties the relay's cache for the session.
use std::time::Duration;

use encore_wire::{
    ControlCommand, Envelope, Heartbeat, Hello, Lyrics, Message, PlayerState, QueueState, Role,
    SessionId,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use url::Url;

use crate::backoff::ReconnectBackoff;
use crate::connection::{self, Inbound, WsStream};
use crate::{ClientError, ProducerConfig};

// ── Commands (app → client) ───────────────────────────────────────────

enum ProducerCommand {
    Player(PlayerState),
    Queue(QueueState),
    Lyrics(Lyrics),
    Shutdown,
}

/// Handle to a running producer. Cheap to clone.
#[derive(Clone)]
pub struct ProducerHandle {
    session_id: SessionId,
    cmd_tx: mpsc::Sender<ProducerCommand>,
}

impl ProducerHandle {
    /// The session this producer publishes under.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub async fn publish_player(&self, state: PlayerState) -> Result<(), ClientError> {
        self.send(ProducerCommand::Player(state)).await
    }

    /// The relay stamps the version; whatever `queue.version` holds is
    /// overwritten.
    pub async fn publish_queue(&self, queue: QueueState) -> Result<(), ClientError> {
        self.send(ProducerCommand::Queue(queue)).await
    }

    pub async fn publish_lyrics(&self, lyrics: Lyrics) -> Result<(), ClientError> {
        self.send(ProducerCommand::Lyrics(lyrics)).await
    }

    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(ProducerCommand::Shutdown).await;
    }

    async fn send(&self, cmd: ProducerCommand) -> Result<(), ClientError> {
        self.cmd_tx.send(cmd).await.map_err(|_| ClientError::Shutdown)
    }
}

/// Channels returned when a producer starts.
pub struct ProducerChannels {
    pub handle: ProducerHandle,
    /// Control commands forwarded by the relay from consumers.
    pub controls: mpsc::Receiver<ControlCommand>,
}

// ── Change suppression ────────────────────────────────────────────────

/// Latest state handed to the producer, whether or not it was sent.
#[derive(Debug, Default)]
struct Latest {
    player: Option<PlayerState>,
    queue: Option<QueueState>,
    lyrics: Option<Lyrics>,
}

/// What was last sent on the current connection.
///
/// State is compared without inline album art, which is large and changes
/// nothing a consumer reconciles on.
#[derive(Debug, Default)]
struct SentTracker {
    player: Option<PlayerState>,
    queue: Option<QueueState>,
    lyrics_track: Option<String>,
}

impl SentTracker {
    /// Record `state` and report whether it differs from the last one.
    fn player_changed(&mut self, state: &PlayerState) -> bool {
        let stripped = strip_player(state);
        if self.player.as_ref() == Some(&stripped) {
            return false;
        }
        self.player = Some(stripped);
        true
    }

    fn queue_changed(&mut self, queue: &QueueState) -> bool {
        let stripped = strip_queue(queue);
        if self.queue.as_ref() == Some(&stripped) {
            return false;
        }
        self.queue = Some(stripped);
        true
    }

    fn lyrics_changed(&mut self, lyrics: &Lyrics) -> bool {
        if self.lyrics_track.as_deref() == Some(lyrics.track_id.as_str()) {
            return false;
        }
        self.lyrics_track = Some(lyrics.track_id.clone());
        true
    }
}

fn strip_player(state: &PlayerState) -> PlayerState {
    PlayerState {
        current_track: state.current_track.as_ref().map(|t| t.without_art_data()),
        ..state.clone()
    }
}

fn strip_queue(queue: &QueueState) -> QueueState {
    QueueState {
        current: queue.current.as_ref().map(|t| t.without_art_data()),
        next: queue.next.iter().map(|t| t.without_art_data()).collect(),
        prev: queue.prev.iter().map(|t| t.without_art_data()).collect(),
        // Stamped by the relay.
        version: 0,
    }
}

// ── ProducerClient ───────────────────────────────────────────────────

pub struct ProducerClient;

impl ProducerClient {
    /// Validate the config and spawn the producer task.
    pub fn spawn(config: ProducerConfig) -> Result<ProducerChannels, ClientError> {
        let base_url = Url::parse(&config.url)?;
        let session_id = config
            .session_id
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(SessionId::generate);
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (control_tx, control_rx) = mpsc::channel(config.control_buffer);

        let task = ProducerTask {
            url: connection::session_url(&base_url, Some(&session_id), false),
            session_id: session_id.clone(),
            heartbeat_interval: config.heartbeat_interval,
            backoff: ReconnectBackoff::with_schedule(config.reconnect_schedule.clone()),
            latest: Latest::default(),
            cmd_rx,
            control_tx,
        };
        tokio::spawn(task.run());

        Ok(ProducerChannels {
            handle: ProducerHandle { session_id, cmd_tx },
            controls: control_rx,
        })
    }
}

enum ConnectionEnd {
    Shutdown,
    Lost(String),
}

struct ProducerTask {
    url: Url,
    session_id: SessionId,
    heartbeat_interval: Duration,
    backoff: ReconnectBackoff,
    latest: Latest,
    cmd_rx: mpsc::Receiver<ProducerCommand>,
    control_tx: mpsc::Sender<ControlCommand>,
}

impl ProducerTask {
    async fn run(mut self) {
        loop {
            let reason = match connection::open(&self.url).await {
                Ok(ws) => match self.run_connection(ws).await {
                    ConnectionEnd::Shutdown => return,
                    ConnectionEnd::Lost(reason) => reason,
                },
                Err(e) => e.to_string(),
            };

            let retry_in = self.backoff.next_delay();
            tracing::info!(session = %self.session_id, %reason, ?retry_in, "producer disconnected");
            if !self.wait_offline(retry_in).await {
                return;
            }
        }
    }

    /// Sleep out the backoff, still recording published state. Returns
    /// false on shutdown.
    async fn wait_offline(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                cmd = self.cmd_rx.recv() => match cmd {
                    None | Some(ProducerCommand::Shutdown) => return false,
                    Some(cmd) => self.record(cmd),
                },
            }
        }
    }

    fn record(&mut self, cmd: ProducerCommand) {
        match cmd {
            ProducerCommand::Player(state) => self.latest.player = Some(state),
            ProducerCommand::Queue(queue) => self.latest.queue = Some(queue),
            ProducerCommand::Lyrics(lyrics) => self.latest.lyrics = Some(lyrics),
            ProducerCommand::Shutdown => {}
        }
    }

    async fn run_connection(&mut self, ws: WsStream) -> ConnectionEnd {
        let (mut sink, mut stream) = ws.split();
        let mut sent = SentTracker::default();

        // The relay handles frames in order, so state may follow the hello
        // without waiting for `welcome`.
        let hello = Message::Hello(Hello {
            role: Role::Producer,
        });
        let mut outgoing = vec![hello];
        outgoing.extend(self.pending_state(&mut sent));
        for message in outgoing {
            if let Err(e) = connection::send_envelope(&mut sink, &self.envelope(message)).await {
                return ConnectionEnd::Lost(e.to_string());
            }
        }

        let mut heartbeat = tokio::time::interval(self.heartbeat_interval);
        heartbeat.tick().await; // Skip the immediate first tick

        loop {
            let outgoing: Vec<Message> = tokio::select! {
                item = stream.next() => match Inbound::from_ws(item) {
                    Inbound::Envelope(envelope) => match envelope.message {
                        Message::Welcome(welcome) => {
                            tracing::info!(session = %welcome.session_id, "producer registered");
                            self.backoff.reset();
                            Vec::new()
                        }
                        Message::Control(command) => {
                            self.deliver(command);
                            Vec::new()
                        }
                        Message::Error(error) => {
                            tracing::warn!(code = %error.code, "relay error: {}", error.message);
                            Vec::new()
                        }
                        other => {
                            tracing::debug!(kind = other.kind().as_str(), "ignoring message");
                            Vec::new()
                        }
                    },
                    Inbound::Closed(reason) => return ConnectionEnd::Lost(reason),
                    Inbound::Ignored => Vec::new(),
                },

                cmd = self.cmd_rx.recv() => match cmd {
                    None | Some(ProducerCommand::Shutdown) => {
                        let _ = sink.close().await;
                        return ConnectionEnd::Shutdown;
                    }
                    Some(cmd) => {
                        self.record(cmd);
                        self.pending_state(&mut sent)
                    }
                },

                _ = heartbeat.tick() => vec![Message::Heartbeat(Heartbeat {})],
            };

            for message in outgoing {
                let envelope = self.envelope(message);
                if let Err(e) = connection::send_envelope(&mut sink, &envelope).await {
                    return ConnectionEnd::Lost(e.to_string());
                }
            }
        }
    }

    /// Latest state not yet sent on this connection, in cache replay order.
    fn pending_state(&self, sent: &mut SentTracker) -> Vec<Message> {
        let mut out = Vec::new();
        if let Some(state) = &self.latest.player {
            if sent.player_changed(state) {
                out.push(Message::PlayerState(state.clone()));
            }
        }
        if let Some(queue) = &self.latest.queue {
            if sent.queue_changed(queue) {
                out.push(Message::QueueUpdate(queue.clone()));
            }
        }
        if let Some(lyrics) = &self.latest.lyrics {
            if sent.lyrics_changed(lyrics) {
                out.push(Message::Lyrics(lyrics.clone()));
            }
        }
        out
    }

    fn deliver(&self, command: ControlCommand) {
        // try_send: never block the socket loop on a slow consumer of controls
        if let Err(e) = self.control_tx.try_send(command) {
            tracing::warn!("control command dropped: {e}");
        }
    }

    fn envelope(&self, message: Message) -> Envelope {
        Envelope::new(self.session_id.clone(), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encore_wire::Track;

    fn track(id: &str, art: Option<&str>) -> Track {
        Track {
            id: id.into(),
            name: id.to_uppercase(),
            artists: vec!["Artist".into()],
            album: "Album".into(),
            album_art_url: None,
            album_art_data: art.map(str::to_string),
            duration_ms: 180_000,
            uid: None,
        }
    }

    fn playing(id: &str, art: Option<&str>) -> PlayerState {
        PlayerState {
            current_track: Some(track(id, art)),
            is_playing: true,
            ..PlayerState::default()
        }
    }

    fn task() -> ProducerTask {
        let (_cmd_tx, cmd_rx) = mpsc::channel(1);
        let (control_tx, _control_rx) = mpsc::channel(1);
        ProducerTask {
            url: Url::parse("ws://localhost:17777").unwrap(),
            session_id: SessionId::generate(),
            heartbeat_interval: Duration::from_secs(30),
            backoff: ReconnectBackoff::new(),
            latest: Latest::default(),
            cmd_rx,
            control_tx,
        }
    }

    #[test]
    fn player_state_suppressed_when_unchanged() {
        let mut sent = SentTracker::default();
        assert!(sent.player_changed(&playing("a", None)));
        assert!(!sent.player_changed(&playing("a", None)));
        assert!(sent.player_changed(&playing("b", None)));
    }

    #[test]
    fn album_art_data_is_ignored() {
        let mut sent = SentTracker::default();
        assert!(sent.player_changed(&playing("a", Some("data:image/png;base64,AAAA"))));
        assert!(!sent.player_changed(&playing("a", Some("data:image/png;base64,BBBB"))));
        assert!(!sent.player_changed(&playing("a", None)));

        let queue = |art| QueueState {
            current: Some(track("a", art)),
            next: vec![track("b", art)],
            prev: Vec::new(),
            version: 0,
        };
        assert!(sent.queue_changed(&queue(Some("x"))));
        assert!(!sent.queue_changed(&queue(None)));
    }

    #[test]
    fn queue_version_does_not_count_as_change() {
        let mut sent = SentTracker::default();
        let mut queue = QueueState {
            current: Some(track("a", None)),
            ..QueueState::default()
        };
        assert!(sent.queue_changed(&queue));
        queue.version = 7;
        assert!(!sent.queue_changed(&queue));
    }

    #[test]
    fn lyrics_keyed_by_track_id() {
        let mut sent = SentTracker::default();
        let lyrics = |id: &str, line: &str| Lyrics {
            track_id: id.into(),
            synced: None,
            unsynced: Some(vec![line.into()]),
        };
        assert!(sent.lyrics_changed(&lyrics("a", "one")));
        assert!(!sent.lyrics_changed(&lyrics("a", "two")));
        assert!(sent.lyrics_changed(&lyrics("b", "one")));
    }

    #[test]
    fn fresh_connection_resends_everything_in_cache_order() {
        let mut task = task();
        task.record(ProducerCommand::Lyrics(Lyrics {
            track_id: "a".into(),
            synced: None,
            unsynced: None,
        }));
        task.record(ProducerCommand::Queue(QueueState::default()));
        task.record(ProducerCommand::Player(playing("a", None)));

        let mut sent = SentTracker::default();
        let kinds: Vec<&str> = task
            .pending_state(&mut sent)
            .iter()
            .map(|m| m.kind().as_str())
            .collect();
        assert_eq!(kinds, vec!["player_state", "queue_update", "lyrics"]);
        assert!(task.pending_state(&mut sent).is_empty());

        // A reconnection starts with a fresh tracker.
        assert_eq!(task.pending_state(&mut SentTracker::default()).len(), 3);
    }

    #[test]
    fn full_control_channel_drops_instead_of_blocking() {
        let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();
        let (control_tx, mut control_rx) = mpsc::channel(1);
        let task = ProducerTask {
            control_tx,
            ..task()
        };
        task.deliver(ControlCommand::Play);
        task.deliver(ControlCommand::Pause);
        assert_eq!(control_rx.try_recv().unwrap(), ControlCommand::Play);
        assert!(control_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn generated_session_id_is_stable() {
        let config = ProducerConfig::new()
            .url("ws://127.0.0.1:9")
            .reconnect_schedule(vec![Duration::from_secs(60)]);
        let ProducerChannels { handle, .. } = ProducerClient::spawn(config).unwrap();
        assert_eq!(handle.session_id().as_str().len(), 32);
        let clone = handle.clone();
        assert_eq!(clone.session_id(), handle.session_id());
        handle.shutdown().await;
    }
}
