//! Shared fixtures for end-to-end tests: a relay on an ephemeral port,
//! clients pointed at it, and helpers for waiting on client events.

use std::time::Duration;

use anyhow::{anyhow, Context};
use encore_client::{
    ClientConfig, ConsumerChannels, ConsumerClient, ConsumerEvent, ProducerChannels,
    ProducerClient, ProducerConfig,
};
use encore_relay::{Relay, RelayConfig, RelayHandle};
use encore_wire::{Lyrics, PlayerState, QueueState, SessionId, Track};
use tokio::sync::mpsc;

/// Upper bound for any single wait in these tests.
pub const WAIT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();
}

/// A relay bound to 127.0.0.1 on a free port.
pub struct TestRelay {
    pub handle: RelayHandle,
    pub url: String,
}

impl TestRelay {
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_with(RelayConfig::new()).await
    }

    pub async fn start_with(config: RelayConfig) -> anyhow::Result<Self> {
        init_tracing();
        let config = config.bind_addr("127.0.0.1:0".parse()?);
        let (handle, addr) = Relay::bind(config).await?;
        Ok(Self {
            handle,
            url: format!("ws://{addr}"),
        })
    }

    /// Reconnect quickly so tests that drop connections stay fast.
    pub fn consumer_config(&self) -> ClientConfig {
        ClientConfig::new()
            .url(self.url.clone())
            .reconnect_schedule(fast_schedule())
    }

    pub fn producer_config(&self) -> ProducerConfig {
        ProducerConfig::new()
            .url(self.url.clone())
            .reconnect_schedule(fast_schedule())
    }

    pub fn consumer(&self, config: ClientConfig) -> anyhow::Result<ConsumerChannels> {
        Ok(ConsumerClient::spawn(config)?)
    }

    /// Start a producer and wait until the relay lists its session.
    pub async fn producer(&self) -> anyhow::Result<ProducerChannels> {
        let channels = ProducerClient::spawn(self.producer_config())?;
        self.wait_for_session(channels.handle.session_id()).await?;
        Ok(channels)
    }

    pub async fn wait_for_session(&self, session: &SessionId) -> anyhow::Result<()> {
        self.wait_sessions(|sessions| sessions.contains(session))
            .await
            .with_context(|| format!("session {session} never registered"))
    }

    /// Poll the relay's discovery list until `pred` holds.
    pub async fn wait_sessions(
        &self,
        pred: impl Fn(&[SessionId]) -> bool,
    ) -> anyhow::Result<()> {
        tokio::time::timeout(WAIT, async {
            loop {
                if pred(self.handle.active_sessions().await.as_slice()) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .map_err(|_| anyhow!("relay sessions never matched"))
    }
}

pub fn fast_schedule() -> Vec<Duration> {
    vec![Duration::from_millis(50)]
}

/// Receive events until one matches `pred`, returning it.
pub async fn next_event<T>(
    rx: &mut mpsc::Receiver<T>,
    pred: impl Fn(&T) -> bool,
) -> anyhow::Result<T> {
    tokio::time::timeout(WAIT, async {
        while let Some(event) = rx.recv().await {
            if pred(&event) {
                return Ok(event);
            }
        }
        Err(anyhow!("channel closed"))
    })
    .await
    .map_err(|_| anyhow!("timed out waiting for event"))?
}

/// Next consumer state snapshot satisfying `pred`.
pub async fn next_state(
    events: &mut mpsc::Receiver<ConsumerEvent>,
    pred: impl Fn(&encore_client::Snapshot) -> bool,
) -> anyhow::Result<encore_client::Snapshot> {
    match next_event(events, |e| matches!(e, ConsumerEvent::State(s) if pred(s))).await? {
        ConsumerEvent::State(snapshot) => Ok(snapshot),
        other => Err(anyhow!("unexpected event {other:?}")),
    }
}

// ── Fixtures ──────────────────────────────────────────────────────────

pub fn track(id: &str) -> Track {
    Track {
        id: id.into(),
        name: format!("Song {id}"),
        artists: vec!["Artist".into()],
        album: "Album".into(),
        album_art_url: None,
        album_art_data: None,
        duration_ms: 200_000,
        uid: Some(format!("uid-{id}")),
    }
}

pub fn queue(current: &str, next: &[&str], prev: &[&str]) -> QueueState {
    QueueState {
        current: Some(track(current)),
        next: next.iter().map(|id| track(id)).collect(),
        prev: prev.iter().map(|id| track(id)).collect(),
        version: 0,
    }
}

pub fn playing(id: &str) -> PlayerState {
    PlayerState {
        current_track: Some(track(id)),
        is_playing: true,
        position_ms: 1_000,
        ..PlayerState::default()
    }
}

pub fn lyrics(track_id: &str) -> Lyrics {
    Lyrics {
        track_id: track_id.into(),
        synced: None,
        unsynced: Some(vec!["la la la".into()]),
    }
}
