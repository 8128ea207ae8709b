use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::types::{
    ControlCommand, ErrorPayload, Heartbeat, Hello, Lyrics, PlayerState, QueueState, SessionList,
    Welcome,
};
use crate::{SessionId, WireError};

/// The only wire version this crate speaks.
pub const PROTOCOL_VERSION: u64 = 1;

/// Closed set of envelope kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Hello,
    Welcome,
    PlayerState,
    QueueUpdate,
    Lyrics,
    Heartbeat,
    Control,
    Error,
    Sessions,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Hello => "hello",
            Kind::Welcome => "welcome",
            Kind::PlayerState => "player_state",
            Kind::QueueUpdate => "queue_update",
            Kind::Lyrics => "lyrics",
            Kind::Heartbeat => "heartbeat",
            Kind::Control => "control",
            Kind::Error => "error",
            Kind::Sessions => "sessions",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "hello" => Kind::Hello,
            "welcome" => Kind::Welcome,
            "player_state" => Kind::PlayerState,
            "queue_update" => Kind::QueueUpdate,
            "lyrics" => Kind::Lyrics,
            "heartbeat" => Kind::Heartbeat,
            "control" => Kind::Control,
            "error" => Kind::Error,
            "sessions" => Kind::Sessions,
            _ => return None,
        })
    }
}

/// Envelope body: the kind tag and its payload, as one value.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Hello(Hello),
    Welcome(Welcome),
    PlayerState(PlayerState),
    QueueUpdate(QueueState),
    Lyrics(Lyrics),
    Heartbeat(Heartbeat),
    Control(ControlCommand),
    Error(ErrorPayload),
    Sessions(SessionList),
}

impl Message {
    pub fn kind(&self) -> Kind {
        match self {
            Message::Hello(_) => Kind::Hello,
            Message::Welcome(_) => Kind::Welcome,
            Message::PlayerState(_) => Kind::PlayerState,
            Message::QueueUpdate(_) => Kind::QueueUpdate,
            Message::Lyrics(_) => Kind::Lyrics,
            Message::Heartbeat(_) => Kind::Heartbeat,
            Message::Control(_) => Kind::Control,
            Message::Error(_) => Kind::Error,
            Message::Sessions(_) => Kind::Sessions,
        }
    }

    fn decode(kind: Kind, payload: serde_json::Value) -> Result<Self, WireError> {
        Ok(match kind {
            Kind::Hello => Message::Hello(decode_payload(kind, payload)?),
            Kind::Welcome => Message::Welcome(decode_payload(kind, payload)?),
            Kind::PlayerState => Message::PlayerState(decode_payload(kind, payload)?),
            Kind::QueueUpdate => Message::QueueUpdate(decode_payload(kind, payload)?),
            Kind::Lyrics => Message::Lyrics(decode_payload(kind, payload)?),
            Kind::Heartbeat => Message::Heartbeat(decode_payload(kind, payload)?),
            Kind::Control => Message::Control(decode_payload(kind, payload)?),
            Kind::Error => Message::Error(decode_payload(kind, payload)?),
            Kind::Sessions => Message::Sessions(decode_payload(kind, payload)?),
        })
    }

    fn payload_ref(&self) -> PayloadRef<'_> {
        match self {
            Message::Hello(p) => PayloadRef::Hello(p),
            Message::Welcome(p) => PayloadRef::Welcome(p),
            Message::PlayerState(p) => PayloadRef::PlayerState(p),
            Message::QueueUpdate(p) => PayloadRef::QueueUpdate(p),
            Message::Lyrics(p) => PayloadRef::Lyrics(p),
            Message::Heartbeat(p) => PayloadRef::Heartbeat(p),
            Message::Control(p) => PayloadRef::Control(p),
            Message::Error(p) => PayloadRef::Error(p),
            Message::Sessions(p) => PayloadRef::Sessions(p),
        }
    }
}

fn decode_payload<T: DeserializeOwned>(
    kind: Kind,
    payload: serde_json::Value,
) -> Result<T, WireError> {
    serde_json::from_value(payload).map_err(|source| WireError::InvalidPayload {
        kind: kind.as_str(),
        source,
    })
}

/// Versioned, kind-tagged wire message.
///
/// The protocol version is implicit: decoding rejects anything but
/// [`PROTOCOL_VERSION`] and encoding always writes it.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub session_id: SessionId,
    /// Unix timestamp in milliseconds.
    pub ts: u64,
    pub message: Message,
}

/// Wire shape used for decoding, before the payload is matched to its kind.
#[derive(Deserialize)]
struct RawEnvelope {
    v: u64,
    #[serde(rename = "sessionId")]
    session_id: SessionId,
    kind: String,
    ts: u64,
    payload: serde_json::Value,
}

#[derive(Serialize)]
struct RawEnvelopeRef<'a> {
    v: u64,
    #[serde(rename = "sessionId")]
    session_id: &'a SessionId,
    kind: &'static str,
    ts: u64,
    payload: PayloadRef<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum PayloadRef<'a> {
    Hello(&'a Hello),
    Welcome(&'a Welcome),
    PlayerState(&'a PlayerState),
    QueueUpdate(&'a QueueState),
    Lyrics(&'a Lyrics),
    Heartbeat(&'a Heartbeat),
    Control(&'a ControlCommand),
    Error(&'a ErrorPayload),
    Sessions(&'a SessionList),
}

impl Envelope {
    /// Create an envelope stamped with the current time.
    pub fn new(session_id: SessionId, message: Message) -> Self {
        Self {
            session_id,
            ts: now_ms(),
            message,
        }
    }

    pub fn kind(&self) -> Kind {
        self.message.kind()
    }

    /// Serialize to JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(&self.as_raw()).map_err(WireError::Serialization)
    }

    /// Serialize to a JSON string, for text frames.
    pub fn to_text(&self) -> Result<String, WireError> {
        serde_json::to_string(&self.as_raw()).map_err(WireError::Serialization)
    }

    /// Decode and validate an envelope from JSON bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, WireError> {
        let raw: RawEnvelope = serde_json::from_slice(data).map_err(WireError::Malformed)?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawEnvelope) -> Result<Self, WireError> {
        if raw.v != PROTOCOL_VERSION {
            return Err(WireError::UnsupportedVersion(raw.v));
        }
        let kind = Kind::parse(&raw.kind).ok_or(WireError::UnknownKind(raw.kind))?;
        Ok(Self {
            session_id: raw.session_id,
            ts: raw.ts,
            message: Message::decode(kind, raw.payload)?,
        })
    }

    fn as_raw(&self) -> RawEnvelopeRef<'_> {
        RawEnvelopeRef {
            v: PROTOCOL_VERSION,
            session_id: &self.session_id,
            kind: self.kind().as_str(),
            ts: self.ts,
            payload: self.message.payload_ref(),
        }
    }
}

// ── Handshake ─────────────────────────────────────────────────────────

/// First frame on a fresh connection: a role-less discovery request or a
/// `hello` that establishes a role.
#[derive(Debug, Clone, PartialEq)]
pub enum Handshake {
    Discover,
    Hello {
        /// Session named inside the hello envelope (empty if none).
        session_id: SessionId,
        hello: Hello,
    },
}

#[derive(Deserialize)]
struct KindPeek {
    #[serde(default)]
    kind: Option<String>,
}

#[derive(Serialize)]
struct DiscoverRequest<'a> {
    v: u64,
    #[serde(rename = "sessionId")]
    session_id: &'a str,
    kind: &'static str,
    ts: u64,
    payload: Heartbeat,
}

impl Handshake {
    const DISCOVER: &'static str = "discover";

    /// Classify a first frame. Anything other than `discover` or a valid
    /// `hello` envelope is an error.
    pub fn from_bytes(data: &[u8]) -> Result<Self, WireError> {
        let peek: KindPeek = serde_json::from_slice(data).map_err(WireError::Malformed)?;
        if peek.kind.as_deref() == Some(Self::DISCOVER) {
            return Ok(Handshake::Discover);
        }
        let envelope = Envelope::from_bytes(data)?;
        match envelope.message {
            Message::Hello(hello) => Ok(Handshake::Hello {
                session_id: envelope.session_id,
                hello,
            }),
            other => Err(WireError::UnexpectedKind {
                expected: Kind::Hello.as_str(),
                found: other.kind().as_str(),
            }),
        }
    }

    /// Encoded discovery request.
    pub fn discover_text() -> Result<String, WireError> {
        serde_json::to_string(&DiscoverRequest {
            v: PROTOCOL_VERSION,
            session_id: "",
            kind: Self::DISCOVER,
            ts: now_ms(),
            payload: Heartbeat {},
        })
        .map_err(WireError::Serialization)
    }
}

/// Current time in milliseconds since UNIX epoch.
#[inline]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
