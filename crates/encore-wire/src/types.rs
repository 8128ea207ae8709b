//! Payload types carried inside envelopes.
//!
//! Field names follow the wire's camelCase convention. Nullable fields
//! default to `None` when absent so older producers that omit them still
//! decode.
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::SessionId;

// ── Media model ───────────────────────────────────────────────────────

/// A playable item. `id` is the identity used for matching everywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub album: String,
    #[serde(default)]
    pub album_art_url: Option<String>,
    /// Base64 encoded artwork, filled in by producers that inline images.
    #[serde(default)]
    pub album_art_data: Option<String>,
    pub duration_ms: u64,
    /// Player-specific queue slot id, forwarded as `skipTo.trackUid`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl Track {
    /// Copy of this track without inlined artwork, for cheap comparisons.
    pub fn without_art_data(&self) -> Self {
        Self {
            album_art_data: None,
            ..self.clone()
        }
    }
}

/// Palette extracted from the current artwork.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackColors {
    #[serde(default)]
    pub vibrant: Option<String>,
    #[serde(default)]
    pub prominent: Option<String>,
    #[serde(default)]
    pub desaturated: Option<String>,
    #[serde(default)]
    pub light_vibrant: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    Track,
    Context,
}

/// Authoritative player snapshot pushed by the producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub current_track: Option<Track>,
    pub is_playing: bool,
    pub position_ms: u64,
    #[serde(default)]
    pub tempo: Option<f64>,
    pub volume: f64,
    pub shuffle_enabled: bool,
    pub repeat_mode: RepeatMode,
    #[serde(default)]
    pub colors: Option<TrackColors>,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            current_track: None,
            is_playing: false,
            position_ms: 0,
            tempo: None,
            volume: 100.0,
            shuffle_enabled: false,
            repeat_mode: RepeatMode::Off,
            colors: None,
        }
    }
}

/// Queue snapshot. `next` is nearest-first, `prev` is oldest-first.
///
/// `version` is stamped by the relay; producers leave it at zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueState {
    pub current: Option<Track>,
    pub next: Vec<Track>,
    pub prev: Vec<Track>,
    #[serde(default)]
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricLine {
    /// Offset into the track, in milliseconds.
    pub start_time: u64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lyrics {
    pub track_id: String,
    #[serde(default)]
    pub synced: Option<Vec<LyricLine>>,
    #[serde(default)]
    pub unsynced: Option<Vec<String>>,
}

// ── Session control ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Producer,
    Consumer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    pub session_id: SessionId,
    pub connected_at: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {}

/// Discovery reply: ids of sessions that currently have a producer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionList {
    pub sessions: Vec<SessionId>,
}

/// Error codes travel as SCREAMING_SNAKE_CASE strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidMessage,
    NoSessions,
    /// A code this build does not know, kept verbatim.
    Other(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::InvalidMessage => "INVALID_MESSAGE",
            Self::NoSessions => "NO_SESSIONS",
            Self::Other(code) => code,
        }
    }
}

impl From<String> for ErrorCode {
    fn from(code: String) -> Self {
        match code.as_str() {
            "INVALID_MESSAGE" => Self::InvalidMessage,
            "NO_SESSIONS" => Self::NoSessions,
            _ => Self::Other(code),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorPayload {
    pub fn invalid_message() -> Self {
        Self {
            code: ErrorCode::InvalidMessage,
            message: "Failed to parse message".into(),
        }
    }

    pub fn no_sessions() -> Self {
        Self {
            code: ErrorCode::NoSessions,
            message: "No active sessions available".into(),
        }
    }
}

// ── Playback control (consumer → producer) ────────────────────────────

/// Playback command forwarded verbatim from a consumer to the producer.
///
/// `skipTo` and `playTrack` jump straight to an arbitrary queue or history
/// entry instead of stepping one position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum ControlCommand {
    Play,
    Pause,
    TogglePlayPause,
    Next,
    Previous,
    SkipPrevious,
    Seek {
        #[serde(rename = "positionMs")]
        position_ms: u64,
    },
    SetVolume {
        volume: f64,
    },
    SkipTo {
        #[serde(rename = "trackUri")]
        track_uri: String,
        #[serde(rename = "trackUid", default, skip_serializing_if = "Option::is_none")]
        track_uid: Option<String>,
    },
    PlayTrack {
        #[serde(rename = "trackId")]
        track_id: String,
    },
}
