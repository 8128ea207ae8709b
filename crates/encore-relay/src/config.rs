use std::net::SocketAddr;
use std::time::Duration;

/// Port the relay listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 17777;

/// Configuration for a [`Relay`](crate::Relay).
///
/// All fields have sensible defaults. Use the builder pattern:
///
/// ```rust
/// use std::time::Duration;
/// use encore_relay::RelayConfig;
///
/// let config = RelayConfig::new()
///     .bind_addr("127.0.0.1:0".parse().unwrap())
///     .session_idle_ceiling(Duration::from_secs(600));
/// ```
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub(crate) bind_addr: SocketAddr,
    /// Maximum connection age before the sweep force-closes it.
    pub(crate) session_idle_ceiling: Duration,
    pub(crate) sweep_interval: Duration,
    /// Frames queued per connection before new ones are dropped.
    pub(crate) outbound_buffer: usize,
    pub(crate) max_frame_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayConfig {
    /// Create a new config with defaults.
    ///
    /// If the `ENCORE_RELAY_ADDR` environment variable holds a socket
    /// address, it replaces the default `0.0.0.0:17777`.
    pub fn new() -> Self {
        let bind_addr = std::env::var("ENCORE_RELAY_ADDR")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)));

        Self {
            bind_addr,
            session_idle_ceiling: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(60),
            outbound_buffer: 256,
            max_frame_size: 1024 * 1024, // 1 MB
        }
    }

    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the maximum connection age (default: 30 minutes).
    pub fn session_idle_ceiling(mut self, ceiling: Duration) -> Self {
        self.session_idle_ceiling = ceiling;
        self
    }

    /// Set how often expired connections are swept (default: 60 s).
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the per-connection outbound queue size (default: 256 frames).
    pub fn outbound_buffer(mut self, capacity: usize) -> Self {
        self.outbound_buffer = capacity;
        self
    }

    /// Set the maximum inbound frame size (default: 1 MB).
    pub fn max_frame_size(mut self, bytes: usize) -> Self {
        self.max_frame_size = bytes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = RelayConfig::new()
            .bind_addr("127.0.0.1:0".parse().unwrap())
            .session_idle_ceiling(Duration::from_secs(5))
            .sweep_interval(Duration::from_secs(1))
            .outbound_buffer(8)
            .max_frame_size(4096);
        assert_eq!(config.bind_addr.port(), 0);
        assert_eq!(config.session_idle_ceiling, Duration::from_secs(5));
        assert_eq!(config.sweep_interval, Duration::from_secs(1));
        assert_eq!(config.outbound_buffer, 8);
        assert_eq!(config.max_frame_size, 4096);
    }

    #[test]
    fn defaults() {
        let config = RelayConfig::new();
        assert_eq!(config.session_idle_ceiling, Duration::from_secs(1800));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.outbound_buffer, 256);
    }
}
