//! Encore clients.
//!
//! - [`PlayerMachine`]: the consumer-side reconciliation state machine.
//!   Pure, clock-injected, and usable without any transport.
//! - [`ConsumerClient`]: attaches to a relay session, drives a machine from
//!   relay broadcasts and user intents, and reconnects with backoff.
//! - [`ProducerClient`]: publishes player, queue and lyrics state under one
//!   session and receives consumers' control commands.
//! - [`discover`]: one-shot listing of the relay's active sessions.
//!
//! ```rust,no_run
//! use encore_client::{ClientConfig, ConsumerClient, ConsumerEvent};
//!
//! # async fn run() -> Result<(), encore_client::ClientError> {
//! let mut channels = ConsumerClient::spawn(ClientConfig::new().auto_join(true))?;
//! while let Some(event) = channels.events.recv().await {
//!     if let ConsumerEvent::State(snapshot) = event {
//!         println!("{:?}", snapshot.queue.current.map(|t| t.name));
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod backoff;
mod config;
mod connection;
mod consumer;
mod discover;
mod error;
mod machine;
mod producer;

pub use backoff::{default_schedule, ReconnectBackoff, RECONNECT_SCHEDULE_MS};
pub use config::{ClientConfig, ProducerConfig, DEFAULT_RELAY_URL};
pub use consumer::{ConsumerChannels, ConsumerClient, ConsumerEvent, ConsumerHandle};
pub use discover::{discover, DISCOVER_TIMEOUT};
pub use error::ClientError;
pub use machine::{
    Direction, MachineEvent, MachineState, PendingCommand, PlayerMachine, Snapshot, ACK_TIMEOUT,
    REWIND_THRESHOLD_MS,
};
pub use producer::{ProducerChannels, ProducerClient, ProducerHandle};
