/// Errors produced while decoding or encoding envelopes.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u64),

    #[error("unknown message kind: {0}")]
    UnknownKind(String),

    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("expected {expected} envelope, got {found}")]
    UnexpectedKind {
        expected: &'static str,
        found: &'static str,
    },

    #[error("envelope serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_unknown_kind() {
        let err = WireError::UnknownKind("subscribe".into());
        assert_eq!(err.to_string(), "unknown message kind: subscribe");
    }

    #[test]
    fn display_unsupported_version() {
        let err = WireError::UnsupportedVersion(2);
        assert_eq!(err.to_string(), "unsupported protocol version 2");
    }

    #[test]
    fn display_invalid_payload_names_kind() {
        let source = serde_json::from_str::<u8>("\"x\"").unwrap_err();
        let err = WireError::InvalidPayload {
            kind: "queue_update",
            source,
        };
        assert!(err.to_string().starts_with("invalid queue_update payload"));
    }
}
