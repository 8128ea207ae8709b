/// PlayerMachine — per-consumer reconciliation of optimistic commands with
/// authoritative relay pushes.
///
/// Two states, `Ready` and `WaitingAck`. User intents dispatch at most one
/// [`ControlCommand`] and may record a pending command; server pushes are
/// merged under a queue version guard and can acknowledge the pending
/// command. The machine owns no timer: it exposes [`ack_deadline`] and the
/// driver feeds [`MachineEvent::AckTimeout`] once that instant passes.
///
/// [`ack_deadline`]: PlayerMachine::ack_deadline
use std::fmt;
use std::time::Duration;

use encore_wire::{ControlCommand, PlayerState, QueueState, Track};
use tokio::time::Instant;

/// How long a pending command waits for an acknowledging player state.
pub const ACK_TIMEOUT: Duration = Duration::from_millis(2000);

/// Playback position past which "previous" restarts the current track.
pub const REWIND_THRESHOLD_MS: u64 = 3500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    Ready,
    WaitingAck,
}

/// Which neighbour a pending skip is heading to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Prev,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Next => "next",
            Direction::Prev => "prev",
        })
    }
}

/// An optimistically dispatched command awaiting acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingCommand {
    pub track_id: Option<String>,
    pub direction: Option<Direction>,
    pub started_at: Option<Instant>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MachineEvent {
    /// Queue snapshot from the relay.
    ServerQueue(QueueState),
    /// Player state from the relay.
    ServerPlayer(PlayerState),
    /// Jump to a specific track.
    UserSelect { track_id: String },
    UserNext,
    /// Go back. With `allow_rewind`, a position past the rewind threshold
    /// restarts the current track instead.
    UserPrev { allow_rewind: bool, position_ms: u64 },
    UserRewind,
    /// The driver's ack timer fired. Ignored unless the deadline has passed.
    AckTimeout,
    /// The transport confirmed the pending command.
    TransportAck,
}

/// Render-ready view of the machine.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub state: MachineState,
    pub queue: QueueState,
    pub player: PlayerState,
    pub pending_track_id: Option<String>,
    pub pending_direction: Option<Direction>,
}

pub struct PlayerMachine {
    state: MachineState,
    queue: QueueState,
    player: PlayerState,
    pending: PendingCommand,
    ack_deadline: Option<Instant>,
}

impl Default for PlayerMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerMachine {
    pub fn new() -> Self {
        Self {
            state: MachineState::Ready,
            queue: QueueState::default(),
            player: PlayerState::default(),
            pending: PendingCommand::default(),
            ack_deadline: None,
        }
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn queue(&self) -> &QueueState {
        &self.queue
    }

    pub fn player(&self) -> &PlayerState {
        &self.player
    }

    pub fn pending(&self) -> &PendingCommand {
        &self.pending
    }

    /// When the pending command times out, if one is in flight.
    pub fn ack_deadline(&self) -> Option<Instant> {
        self.ack_deadline
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state,
            queue: self.queue.clone(),
            player: self.player.clone(),
            pending_track_id: self.pending.track_id.clone(),
            pending_direction: self.pending.direction,
        }
    }

    /// Apply one event. Returns the command to dispatch, if any.
    pub fn handle(&mut self, event: MachineEvent, now: Instant) -> Option<ControlCommand> {
        match event {
            MachineEvent::ServerQueue(snapshot) => {
                self.apply_queue(snapshot);
                None
            }
            MachineEvent::ServerPlayer(state) => {
                let acknowledged = self.state == MachineState::WaitingAck
                    && self.pending.track_id.is_some()
                    && state.current_track.as_ref().map(|t| &t.id) == self.pending.track_id.as_ref();
                self.apply_player(state);
                if acknowledged {
                    tracing::debug!("pending command acknowledged");
                    self.settle();
                }
                None
            }
            MachineEvent::UserSelect { track_id } => {
                let command = ControlCommand::PlayTrack {
                    track_id: track_id.clone(),
                };
                self.await_ack(track_id, None, now);
                Some(command)
            }
            MachineEvent::UserNext => self.skip(Direction::Next, now),
            MachineEvent::UserPrev {
                allow_rewind,
                position_ms,
            } => {
                if allow_rewind && position_ms > REWIND_THRESHOLD_MS {
                    Some(self.rewind())
                } else {
                    self.skip(Direction::Prev, now)
                }
            }
            MachineEvent::UserRewind => Some(self.rewind()),
            MachineEvent::AckTimeout => {
                if matches!(self.ack_deadline, Some(deadline) if now >= deadline) {
                    tracing::debug!(track_id = ?self.pending.track_id, "pending command timed out");
                    self.settle();
                }
                None
            }
            MachineEvent::TransportAck => {
                if self.state == MachineState::WaitingAck {
                    self.settle();
                }
                None
            }
        }
    }

    // ── Transitions ──────────────────────────────────────────────────────

    fn apply_queue(&mut self, snapshot: QueueState) {
        if snapshot.version >= self.queue.version {
            self.queue = snapshot;
        } else {
            tracing::debug!(
                incoming = snapshot.version,
                current = self.queue.version,
                "stale queue ignored"
            );
        }
    }

    fn apply_player(&mut self, state: PlayerState) {
        if let Some(track) = &state.current_track {
            self.queue.current = Some(track.clone());
        }
        self.player = state;
    }

    /// Step to the neighbouring track in `direction`.
    ///
    /// A new intent always replaces whatever was pending, even when there is
    /// nothing to step to. A neighbour that is already current still becomes
    /// pending, but no command is sent for it; the next player state or the
    /// ack deadline settles it.
    fn skip(&mut self, direction: Direction, now: Instant) -> Option<ControlCommand> {
        let Some(target) = self.neighbour(direction).cloned() else {
            self.settle();
            return None;
        };
        let already_current = self.queue.current.as_ref().map(|t| &t.id) == Some(&target.id);
        self.await_ack(target.id.clone(), Some(direction), now);
        if already_current {
            tracing::debug!(track_id = %target.id, "neighbour is already current, not sent");
            return None;
        }
        Some(ControlCommand::SkipTo {
            track_uri: target.id,
            track_uid: target.uid,
        })
    }

    /// `next` is nearest-first and `prev` oldest-first.
    fn neighbour(&self, direction: Direction) -> Option<&Track> {
        match direction {
            Direction::Next => self.queue.next.first(),
            Direction::Prev => self.queue.prev.last(),
        }
    }

    fn rewind(&mut self) -> ControlCommand {
        self.settle();
        ControlCommand::Seek { position_ms: 0 }
    }

    fn await_ack(&mut self, track_id: String, direction: Option<Direction>, now: Instant) {
        self.pending = PendingCommand {
            track_id: Some(track_id),
            direction,
            started_at: Some(now),
        };
        self.state = MachineState::WaitingAck;
        self.ack_deadline = Some(now + ACK_TIMEOUT);
    }

    fn settle(&mut self) {
        self.pending = PendingCommand::default();
        self.state = MachineState::Ready;
        self.ack_deadline = None;
    }
}
