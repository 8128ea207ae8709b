/// Hub — relay-side session registry, state cache and router.
///
/// Pure state machine: the runtime feeds it connection lifecycle events and
/// raw text frames, and it returns `Vec<HubEffect>` for the caller to
/// execute. It never touches sockets, so every registration, routing
/// decision and version stamp happens inside one `&mut self` call.
///
/// Responsibilities:
/// - Handshake: `discover` replies, `hello` role registration, auto-join
/// - One producer and any number of consumers per session
/// - Queue version stamping and a three-entry state cache for late joiners
/// - Control forwarding from consumers to the producer
/// - Connection-age expiry
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use encore_wire::{
    now_ms, Envelope, ErrorPayload, Handshake, Message, Role, SessionId, SessionList, Welcome,
};
use tokio::time::Instant;

/// Relay-local identifier of one physical connection.
pub type ConnId = u64;

// ── Connection parameters ─────────────────────────────────────────────

/// Parameters supplied out-of-band when a connection is established.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectParams {
    pub session_id: Option<SessionId>,
    pub auto_join: bool,
}

impl ConnectParams {
    /// Parse `sessionId` and `autoJoin=true` from a request query string.
    pub fn from_query(query: Option<&str>) -> Self {
        let mut params = Self::default();
        let Some(query) = query else {
            return params;
        };
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "sessionId" if !value.is_empty() => {
                    params.session_id = Some(SessionId::from(value.into_owned()));
                }
                "autoJoin" => params.auto_join = value == "true",
                _ => {}
            }
        }
        params
    }
}

// ── Effects ───────────────────────────────────────────────────────────

/// Why the hub asked for a connection to be closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// First frame was neither `discover` nor a valid `hello`.
    ProtocolViolation,
    /// Auto-join found no session to join.
    NoSessions,
    /// Connection outlived the idle ceiling.
    Expired,
    /// Relay is shutting down.
    Shutdown,
}

impl CloseReason {
    /// WebSocket close code.
    pub fn code(self) -> u16 {
        match self {
            CloseReason::ProtocolViolation => 1008,
            CloseReason::NoSessions | CloseReason::Expired | CloseReason::Shutdown => 1000,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            CloseReason::ProtocolViolation => "first message must be hello",
            CloseReason::NoSessions => "no sessions",
            CloseReason::Expired => "session expired",
            CloseReason::Shutdown => "relay shutting down",
        }
    }
}

/// Output of the hub for the runtime to carry out.
#[derive(Debug, Clone, PartialEq)]
pub enum HubEffect {
    /// Write one text frame to a connection.
    Send { conn: ConnId, frame: String },
    /// Close a connection. The hub has already forgotten it.
    Close { conn: ConnId, reason: CloseReason },
}

// ── State ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum ConnState {
    AwaitingHello(ConnectParams),
    Registered(Registration),
}

#[derive(Debug, Clone)]
struct Registration {
    role: Role,
    session: SessionId,
    registered_at: Instant,
}

/// Last producer broadcast of each cacheable kind, as sent on the wire.
#[derive(Debug, Default)]
struct StateCache {
    player: Option<String>,
    queue: Option<String>,
    lyrics: Option<String>,
}

impl StateCache {
    /// Replay order for late joiners: player, queue, lyrics.
    fn frames(&self) -> impl Iterator<Item = &String> {
        [&self.player, &self.queue, &self.lyrics]
            .into_iter()
            .flatten()
    }
}

/// Routing and cache state for every session on this relay.
pub struct Hub {
    idle_ceiling: Duration,
    conns: HashMap<ConnId, ConnState>,
    producers: HashMap<SessionId, ConnId>,
    consumers: HashMap<SessionId, BTreeSet<ConnId>>,
    /// Survives producer disconnect while consumers remain, so a returning
    /// producer never restarts versions they already applied. Dropped once
    /// the session has neither a producer nor consumers.
    queue_versions: HashMap<SessionId, u64>,
    cache: HashMap<SessionId, StateCache>,
}

impl Hub {
    pub fn new(idle_ceiling: Duration) -> Self {
        Self {
            idle_ceiling,
            conns: HashMap::new(),
            producers: HashMap::new(),
            consumers: HashMap::new(),
            queue_versions: HashMap::new(),
            cache: HashMap::new(),
        }
    }

    /// Sessions that currently have a registered producer, sorted.
    pub fn active_sessions(&self) -> Vec<SessionId> {
        let mut sessions: Vec<SessionId> = self.producers.keys().cloned().collect();
        sessions.sort();
        sessions
    }

    /// Number of live connections, registered or not.
    pub fn connection_count(&self) -> usize {
        self.conns.len()
    }

    pub fn consumer_count(&self, session: &SessionId) -> usize {
        self.consumers.get(session).map_or(0, BTreeSet::len)
    }

    /// Last version stamped on a queue update for this session (0 if none).
    pub fn queue_version(&self, session: &SessionId) -> u64 {
        self.queue_versions.get(session).copied().unwrap_or(0)
    }

    /// Track a freshly accepted connection. It has no role until `hello`.
    pub fn open(&mut self, conn: ConnId, params: ConnectParams) {
        tracing::debug!(conn, ?params, "connection opened");
        self.conns.insert(conn, ConnState::AwaitingHello(params));
    }

    /// Process one inbound text frame from a connection.
    pub fn handle_frame(&mut self, conn: ConnId, data: &str, now: Instant) -> Vec<HubEffect> {
        match self.conns.get(&conn) {
            Some(ConnState::AwaitingHello(params)) => {
                let params = params.clone();
                self.handle_handshake(conn, params, data, now)
            }
            Some(ConnState::Registered(reg)) => {
                let reg = reg.clone();
                self.route(conn, &reg, data)
            }
            None => {
                tracing::debug!(conn, "frame from unknown connection dropped");
                vec![]
            }
        }
    }

    /// Forget a connection. Idempotent.
    ///
    /// A producer takes its registration and the session cache with it,
    /// unless it had already been displaced by a newer producer.
    pub fn disconnect(&mut self, conn: ConnId) {
        let Some(ConnState::Registered(reg)) = self.conns.remove(&conn) else {
            return;
        };
        match reg.role {
            Role::Producer => {
                if self.producers.get(&reg.session) == Some(&conn) {
                    self.producers.remove(&reg.session);
                    self.cache.remove(&reg.session);
                    tracing::info!(conn, session = %reg.session, "producer disconnected");
                } else {
                    tracing::debug!(conn, session = %reg.session, "displaced producer disconnected");
                }
            }
            Role::Consumer => {
                if let Some(set) = self.consumers.get_mut(&reg.session) {
                    set.remove(&conn);
                    let remaining = set.len();
                    if remaining == 0 {
                        self.consumers.remove(&reg.session);
                    }
                    tracing::info!(conn, session = %reg.session, remaining, "consumer disconnected");
                }
            }
        }

        // Every client machine starts at version 0 on a new connection, so
        // an empty session can restart its count.
        if !self.producers.contains_key(&reg.session) && !self.consumers.contains_key(&reg.session) {
            self.queue_versions.remove(&reg.session);
        }
    }

    /// Close every registered connection older than the idle ceiling.
    ///
    /// Age is measured from registration, not from the last frame.
    pub fn sweep(&mut self, now: Instant) -> Vec<HubEffect> {
        let expired: Vec<ConnId> = self
            .conns
            .iter()
            .filter_map(|(&conn, state)| match state {
                ConnState::Registered(reg)
                    if now.saturating_duration_since(reg.registered_at) > self.idle_ceiling =>
                {
                    Some(conn)
                }
                _ => None,
            })
            .collect();

        expired
            .into_iter()
            .map(|conn| {
                tracing::info!(conn, "connection expired");
                self.disconnect(conn);
                HubEffect::Close {
                    conn,
                    reason: CloseReason::Expired,
                }
            })
            .collect()
    }

    /// Close every connection and drop all session state.
    pub fn shutdown(&mut self) -> Vec<HubEffect> {
        let mut conns: Vec<ConnId> = self.conns.keys().copied().collect();
        conns.sort_unstable();
        self.conns.clear();
        self.producers.clear();
        self.consumers.clear();
        self.queue_versions.clear();
        self.cache.clear();
        conns
            .into_iter()
            .map(|conn| HubEffect::Close {
                conn,
                reason: CloseReason::Shutdown,
            })
            .collect()
    }

    // ── Handshake ────────────────────────────────────────────────────────

    fn handle_handshake(
        &mut self,
        conn: ConnId,
        params: ConnectParams,
        data: &str,
        now: Instant,
    ) -> Vec<HubEffect> {
        let (envelope_session, role) = match Handshake::from_bytes(data.as_bytes()) {
            Ok(Handshake::Discover) => {
                return self.sessions_reply(conn).into_iter().collect();
            }
            Ok(Handshake::Hello { session_id, hello }) => (session_id, hello.role),
            Err(e) => {
                tracing::warn!(conn, "protocol violation: {e}");
                self.conns.remove(&conn);
                return vec![HubEffect::Close {
                    conn,
                    reason: CloseReason::ProtocolViolation,
                }];
            }
        };

        let explicit = params
            .session_id
            .or_else(|| (!envelope_session.is_empty()).then_some(envelope_session));

        let session = match explicit {
            Some(session) => session,
            None if role == Role::Consumer && params.auto_join => {
                let active = self.active_sessions();
                match active.as_slice() {
                    [] => {
                        tracing::info!(conn, "auto-join found no sessions");
                        self.conns.remove(&conn);
                        let mut effects: Vec<HubEffect> = send(
                            conn,
                            SessionId::empty(),
                            Message::Error(ErrorPayload::no_sessions()),
                        )
                        .into_iter()
                        .collect();
                        effects.push(HubEffect::Close {
                            conn,
                            reason: CloseReason::NoSessions,
                        });
                        return effects;
                    }
                    [only] => {
                        tracing::info!(conn, session = %only, "auto-joining consumer");
                        only.clone()
                    }
                    _ => {
                        tracing::debug!(conn, candidates = active.len(), "auto-join is ambiguous");
                        return self.sessions_reply(conn).into_iter().collect();
                    }
                }
            }
            None => SessionId::generate(),
        };

        self.register(conn, role, session, now)
    }

    fn register(
        &mut self,
        conn: ConnId,
        role: Role,
        session: SessionId,
        now: Instant,
    ) -> Vec<HubEffect> {
        match role {
            Role::Producer => match self.producers.insert(session.clone(), conn) {
                Some(previous) if previous != conn => {
                    tracing::info!(conn, previous, session = %session, "producer replaced");
                }
                _ => tracing::info!(conn, session = %session, "producer connected"),
            },
            Role::Consumer => {
                let set = self.consumers.entry(session.clone()).or_default();
                set.insert(conn);
                tracing::info!(conn, session = %session, total = set.len(), "consumer connected");
            }
        }
        self.conns.insert(
            conn,
            ConnState::Registered(Registration {
                role,
                session: session.clone(),
                registered_at: now,
            }),
        );

        let welcome = Message::Welcome(Welcome {
            session_id: session.clone(),
            connected_at: now_ms(),
        });
        let mut effects: Vec<HubEffect> = send(conn, session.clone(), welcome).into_iter().collect();

        if role == Role::Consumer {
            if let Some(cache) = self.cache.get(&session) {
                effects.extend(cache.frames().map(|frame| HubEffect::Send {
                    conn,
                    frame: frame.clone(),
                }));
            }
        }
        effects
    }

    fn sessions_reply(&self, conn: ConnId) -> Option<HubEffect> {
        let sessions = SessionList {
            sessions: self.active_sessions(),
        };
        send(conn, SessionId::empty(), Message::Sessions(sessions))
    }

    // ── Routing ──────────────────────────────────────────────────────────

    fn route(&mut self, conn: ConnId, reg: &Registration, data: &str) -> Vec<HubEffect> {
        let envelope = match Envelope::from_bytes(data.as_bytes()) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(conn, "invalid message: {e}");
                return send(
                    conn,
                    reg.session.clone(),
                    Message::Error(ErrorPayload::invalid_message()),
                )
                .into_iter()
                .collect();
            }
        };

        match reg.role {
            Role::Producer => self.route_from_producer(conn, &reg.session, envelope, data),
            Role::Consumer => self.route_from_consumer(conn, &reg.session, envelope, data),
        }
    }

    fn route_from_producer(
        &mut self,
        conn: ConnId,
        session: &SessionId,
        envelope: Envelope,
        data: &str,
    ) -> Vec<HubEffect> {
        if self.producers.get(session) != Some(&conn) {
            tracing::debug!(
                conn,
                session = %session,
                kind = envelope.kind().as_str(),
                "dropping push from displaced producer"
            );
            return vec![];
        }

        let Envelope {
            session_id,
            ts,
            message,
        } = envelope;

        let frame = match message {
            Message::PlayerState(_) => {
                let frame = data.to_owned();
                self.cache.entry(session.clone()).or_default().player = Some(frame.clone());
                frame
            }
            Message::Lyrics(_) => {
                let frame = data.to_owned();
                self.cache.entry(session.clone()).or_default().lyrics = Some(frame.clone());
                frame
            }
            Message::QueueUpdate(mut queue) => {
                let version = {
                    let counter = self.queue_versions.entry(session.clone()).or_insert(0);
                    *counter += 1;
                    *counter
                };
                queue.version = version;
                let stamped = Envelope {
                    session_id,
                    ts,
                    message: Message::QueueUpdate(queue),
                };
                let Some(frame) = encode(&stamped) else {
                    return vec![];
                };
                self.cache.entry(session.clone()).or_default().queue = Some(frame.clone());
                frame
            }
            Message::Heartbeat(_) => return vec![],
            other => {
                tracing::debug!(conn, kind = other.kind().as_str(), "ignoring producer message");
                return vec![];
            }
        };

        self.broadcast(session, frame)
    }

    fn route_from_consumer(
        &self,
        conn: ConnId,
        session: &SessionId,
        envelope: Envelope,
        data: &str,
    ) -> Vec<HubEffect> {
        match envelope.message {
            Message::Control(command) => match self.producers.get(session) {
                Some(&producer) => {
                    tracing::debug!(conn, producer, ?command, "forwarding control");
                    vec![HubEffect::Send {
                        conn: producer,
                        frame: data.to_owned(),
                    }]
                }
                None => {
                    tracing::debug!(conn, session = %session, ?command, "no producer, control dropped");
                    vec![]
                }
            },
            Message::Heartbeat(_) => vec![],
            other => {
                tracing::debug!(conn, kind = other.kind().as_str(), "ignoring consumer message");
                vec![]
            }
        }
    }

    fn broadcast(&self, session: &SessionId, frame: String) -> Vec<HubEffect> {
        self.consumers
            .get(session)
            .into_iter()
            .flatten()
            .map(|&conn| HubEffect::Send {
                conn,
                frame: frame.clone(),
            })
            .collect()
    }
}

fn send(conn: ConnId, session: SessionId, message: Message) -> Option<HubEffect> {
    encode(&Envelope::new(session, message)).map(|frame| HubEffect::Send { conn, frame })
}

fn encode(envelope: &Envelope) -> Option<String> {
    match envelope.to_text() {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::warn!(kind = envelope.kind().as_str(), "failed to encode envelope: {e}");
            None
        }
    }
}
