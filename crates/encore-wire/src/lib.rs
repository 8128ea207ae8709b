//! Encore wire format.
//!
//! Every frame exchanged between a producer, the relay and its consumers is
//! a JSON envelope: `{v, sessionId, kind, ts, payload}`. The `kind` field
//! selects exactly one payload shape; decoding matches it exhaustively, so an
//! unknown kind or a payload of the wrong shape is a [`WireError`], never a
//! silently ignored value.
//!
//! # Quick start
//!
//! ```rust
//! use encore_wire::{Envelope, Hello, Message, Role, SessionId};
//!
//! let hello = Envelope::new(SessionId::empty(), Message::Hello(Hello { role: Role::Consumer }));
//! let bytes = hello.to_bytes().unwrap();
//! let decoded = Envelope::from_bytes(&bytes).unwrap();
//! assert_eq!(decoded.kind().as_str(), "hello");
//! ```

mod envelope;
mod error;
mod session;
mod types;

pub use envelope::{now_ms, Envelope, Handshake, Kind, Message, PROTOCOL_VERSION};
pub use error::WireError;
pub use session::SessionId;
pub use types::{
    ControlCommand, ErrorCode, ErrorPayload, Heartbeat, Hello, LyricLine, Lyrics, PlayerState,
    QueueState, RepeatMode, Role, SessionList, Track, TrackColors, Welcome,
};
