use std::time::Duration;

use encore_wire::SessionId;

use crate::backoff::default_schedule;

/// Relay URL used when neither the builder nor `ENCORE_RELAY_URL` sets one.
pub const DEFAULT_RELAY_URL: &str = "ws://localhost:17777";

fn relay_url_from_env() -> String {
    std::env::var("ENCORE_RELAY_URL").unwrap_or_else(|_| DEFAULT_RELAY_URL.to_string())
}

/// Configuration for a [`ConsumerClient`](crate::ConsumerClient).
///
/// ```rust
/// use encore_client::ClientConfig;
///
/// let config = ClientConfig::new()
///     .url("ws://192.168.0.21:17777")
///     .auto_join(true);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub(crate) url: String,
    pub(crate) session_id: Option<SessionId>,
    pub(crate) auto_join: bool,
    pub(crate) reconnect_schedule: Vec<Duration>,
    pub(crate) event_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientConfig {
    /// Create a new config with defaults.
    ///
    /// If the `ENCORE_RELAY_URL` environment variable is set, it will be
    /// used as the relay URL. This can be overridden with [`.url()`].
    ///
    /// [`.url()`]: ClientConfig::url
    pub fn new() -> Self {
        Self {
            url: relay_url_from_env(),
            session_id: None,
            auto_join: false,
            reconnect_schedule: default_schedule(),
            event_buffer: 256,
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn relay_url(&self) -> &str {
        &self.url
    }

    /// Join this session instead of auto-joining or starting a new one.
    pub fn session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Join the only active session when no id is known.
    pub fn auto_join(mut self, enabled: bool) -> Self {
        self.auto_join = enabled;
        self
    }

    /// Replace the reconnect delays (default: 100 ms up to 10 s).
    pub fn reconnect_schedule(mut self, schedule: Vec<Duration>) -> Self {
        self.reconnect_schedule = schedule;
        self
    }

    /// Set the event channel capacity (default: 256).
    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }
}

/// Configuration for a [`ProducerClient`](crate::ProducerClient).
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub(crate) url: String,
    pub(crate) session_id: Option<SessionId>,
    pub(crate) heartbeat_interval: Duration,
    pub(crate) reconnect_schedule: Vec<Duration>,
    pub(crate) control_buffer: usize,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ProducerConfig {
    /// Create a new config with defaults. Reads `ENCORE_RELAY_URL` like
    /// [`ClientConfig::new`].
    pub fn new() -> Self {
        Self {
            url: relay_url_from_env(),
            session_id: None,
            heartbeat_interval: Duration::from_secs(30),
            reconnect_schedule: default_schedule(),
            control_buffer: 64,
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Publish under this session id. Without one, a fresh id is generated
    /// once and kept across reconnections.
    pub fn session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Set the heartbeat interval (default: 30 s). Must be non-zero.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn reconnect_schedule(mut self, schedule: Vec<Duration>) -> Self {
        self.reconnect_schedule = schedule;
        self
    }

    /// Set the control command channel capacity (default: 64).
    pub fn control_buffer(mut self, capacity: usize) -> Self {
        self.control_buffer = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = ClientConfig::new()
            .url("ws://10.0.0.2:17777")
            .session_id(SessionId::from("abc"))
            .event_buffer(0);
        assert_eq!(config.relay_url(), "ws://10.0.0.2:17777");
        assert_eq!(config.session_id, Some(SessionId::from("abc")));
        assert_eq!(config.event_buffer, 1);
        assert_eq!(config.reconnect_schedule.len(), 6);
    }

    #[test]
    fn producer_defaults() {
        let config = ProducerConfig::new().heartbeat_interval(Duration::ZERO);
        assert_eq!(config.heartbeat_interval, Duration::from_millis(1));
        assert_eq!(ProducerConfig::new().heartbeat_interval, Duration::from_secs(30));
        assert!(ProducerConfig::new().session_id.is_none());
    }
}
