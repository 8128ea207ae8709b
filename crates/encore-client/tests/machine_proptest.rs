use std::time::Duration;

use encore_client::{
    MachineEvent, MachineState, PlayerMachine, ReconnectBackoff, RECONNECT_SCHEDULE_MS,
};
use encore_wire::{QueueState, Track};
use proptest::prelude::*;
use tokio::time::Instant;

fn track(id: &str) -> Track {
    Track {
        id: id.into(),
        name: id.into(),
        artists: Vec::new(),
        album: String::new(),
        album_art_url: None,
        album_art_data: None,
        duration_ms: 1000,
        uid: None,
    }
}

fn queue_at(version: u64) -> QueueState {
    QueueState {
        current: Some(track(&format!("t{version}"))),
        next: vec![track(&format!("t{}", version + 1))],
        prev: Vec::new(),
        version,
    }
}

#[derive(Debug, Clone)]
enum Step {
    Queue(u64),
    Next,
    Prev,
    Select(u8),
    Timeout(u64),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (0u64..50).prop_map(Step::Queue),
        1 => Just(Step::Next),
        1 => Just(Step::Prev),
        1 => any::<u8>().prop_map(Step::Select),
        1 => (0u64..5000).prop_map(Step::Timeout),
    ]
}

proptest! {
    /// Whatever order queue snapshots arrive in, the applied version never
    /// goes down and always ends at the highest one seen.
    #[test]
    fn applied_queue_versions_never_decrease(versions in prop::collection::vec(0u64..1000, 1..64)) {
        let mut machine = PlayerMachine::new();
        let now = Instant::now();
        let mut last = 0;
        for version in &versions {
            machine.handle(MachineEvent::ServerQueue(queue_at(*version)), now);
            let applied = machine.queue().version;
            prop_assert!(applied >= last);
            last = applied;
        }
        prop_assert_eq!(last, *versions.iter().max().unwrap());
    }

    /// User intents and timeouts interleaved with snapshots do not break the
    /// version guard, and pending state always matches the machine state.
    #[test]
    fn intents_never_roll_back_the_queue(steps in prop::collection::vec(step(), 1..64)) {
        let mut machine = PlayerMachine::new();
        let start = Instant::now();
        let mut last = 0;
        for step in steps {
            let event = match step {
                Step::Queue(v) => MachineEvent::ServerQueue(queue_at(v)),
                Step::Next => MachineEvent::UserNext,
                Step::Prev => MachineEvent::UserPrev { allow_rewind: false, position_ms: 0 },
                Step::Select(id) => MachineEvent::UserSelect { track_id: format!("t{id}") },
                Step::Timeout(ms) => {
                    let event = MachineEvent::AckTimeout;
                    machine.handle(event, start + Duration::from_millis(ms));
                    continue;
                }
            };
            machine.handle(event, start);

            prop_assert!(machine.queue().version >= last);
            last = machine.queue().version;
            match machine.state() {
                MachineState::Ready => prop_assert!(machine.pending().track_id.is_none()),
                MachineState::WaitingAck => {
                    prop_assert!(machine.pending().track_id.is_some());
                    prop_assert!(machine.ack_deadline().is_some());
                }
            }
        }
    }

    /// The n-th consecutive failure waits the n-th scheduled delay, capped
    /// at the last entry.
    #[test]
    fn backoff_follows_schedule(failures in 1usize..32) {
        let mut backoff = ReconnectBackoff::new();
        let mut delay = Duration::ZERO;
        for _ in 0..failures {
            delay = backoff.next_delay();
        }
        let step = (failures - 1).min(RECONNECT_SCHEDULE_MS.len() - 1);
        prop_assert_eq!(delay, Duration::from_millis(RECONNECT_SCHEDULE_MS[step]));
    }

    /// Delays never shrink between resets.
    #[test]
    fn backoff_is_monotonic(failures in 1usize..32, reset_at in 0usize..32) {
        let mut backoff = ReconnectBackoff::new();
        let mut prev = Duration::ZERO;
        for i in 0..failures {
            if i == reset_at {
                backoff.reset();
                prev = Duration::ZERO;
            }
            let delay = backoff.next_delay();
            prop_assert!(delay >= prev);
            prev = delay;
        }
    }
}
