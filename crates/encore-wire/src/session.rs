use std::fmt;

use serde::{Deserialize, Serialize};

/// Session identifier: 128 random bits rendered as 32 lowercase hex chars.
///
/// Unguessable and URL-safe, so it can travel as a query parameter. The empty
/// id is legal on the wire and marks envelopes that belong to no session yet
/// (discovery replies, a consumer's first `hello`).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random session id.
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::random();
        Self(hex::encode(bytes))
    }

    /// The empty id used before a session is known.
    pub fn empty() -> Self {
        Self(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Ids come from clients, so cut on a char boundary.
        let short = self
            .0
            .char_indices()
            .nth(8)
            .map_or(self.0.as_str(), |(end, _)| &self.0[..end]);
        write!(f, "SessionId({short})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_32_hex_chars() {
        let id = SessionId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn generated_ids_differ() {
        assert_ne!(SessionId::generate(), SessionId::generate());
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = SessionId::from("abc123");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc123\"");
    }

    #[test]
    fn debug_is_truncated() {
        let id = SessionId::from("0123456789abcdef");
        assert_eq!(format!("{id:?}"), "SessionId(01234567)");
    }

    #[test]
    fn debug_truncates_multibyte_ids_on_char_boundary() {
        let id = SessionId::from("aéééé");
        assert_eq!(format!("{id:?}"), "SessionId(aéééé)");

        let long = SessionId::from("ééééééééééé");
        assert_eq!(format!("{long:?}"), "SessionId(éééééééé)");
    }
}
