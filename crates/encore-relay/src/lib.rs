//! Encore relay hub.
//!
//! Registers one producer and any number of consumers per session, caches
//! the producer's last player, queue and lyrics broadcasts for late
//! joiners, stamps queue updates with a per-session version, forwards
//! consumer control commands to the producer, and reaps connections that
//! outlive the idle ceiling.
//!
//! All session state lives in one [`Hub`] owned by a single actor task.
//! Each WebSocket connection runs its own task and talks to the actor over
//! a channel.
//!
//! ```rust,no_run
//! use encore_relay::{Relay, RelayConfig};
//!
//! # async fn run() -> Result<(), encore_relay::RelayError> {
//! let (relay, addr) = Relay::bind(RelayConfig::new()).await?;
//! println!("listening on {addr}");
//! relay.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod hub;
mod runtime;
mod server;

use std::net::SocketAddr;
use std::sync::Arc;

use encore_wire::SessionId;
use tokio::net::TcpListener;
use tokio::sync::watch;

pub use config::{RelayConfig, DEFAULT_PORT};
pub use error::RelayError;
pub use hub::{CloseReason, ConnId, ConnectParams, Hub, HubEffect};

use runtime::{HubHandle, HubRuntime};
use server::ConnectionLimits;

/// Entry point for running a relay.
pub struct Relay;

impl Relay {
    /// Bind the listener, spawn the hub actor and start accepting.
    ///
    /// Returns a handle and the address actually bound, which differs from
    /// the configured one when port 0 was requested.
    pub async fn bind(config: RelayConfig) -> Result<(RelayHandle, SocketAddr), RelayError> {
        let bind_error = |source| RelayError::Bind {
            addr: config.bind_addr,
            source,
        };
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let hub = HubRuntime::spawn(
            Hub::new(config.session_idle_ceiling),
            config.sweep_interval,
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(server::accept_loop(
            listener,
            hub.clone(),
            ConnectionLimits::from(&config),
            shutdown_rx,
        ));

        tracing::info!(%local_addr, "relay listening");
        let handle = RelayHandle {
            hub,
            shutdown: Arc::new(shutdown_tx),
            local_addr,
        };
        Ok((handle, local_addr))
    }
}

/// Handle to a running relay. Cheap to clone.
///
/// Dropping every clone stops the accept loop; connections already open
/// keep running until they close.
#[derive(Clone)]
pub struct RelayHandle {
    hub: HubHandle,
    shutdown: Arc<watch::Sender<bool>>,
    local_addr: SocketAddr,
}

impl RelayHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sessions that currently have a registered producer.
    pub async fn active_sessions(&self) -> Vec<SessionId> {
        self.hub.active_sessions().await
    }

    /// Stop accepting, close every connection with a normal close and stop
    /// the hub.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        self.hub.shutdown().await;
    }
}
