use encore_wire::{ErrorCode, WireError};

/// Errors returned by the Encore clients.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid relay url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("connection to {url} failed: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("relay reported {code}: {message}")]
    Relay { code: ErrorCode, message: String },

    #[error("connection closed: {0}")]
    Closed(String),

    #[error("timed out waiting for the relay")]
    Timeout,

    #[error("client is shut down")]
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_error_display() {
        let err = ClientError::Relay {
            code: ErrorCode::NoSessions,
            message: "No active sessions available".into(),
        };
        assert_eq!(
            err.to_string(),
            "relay reported NO_SESSIONS: No active sessions available"
        );
    }
}
