use std::collections::HashMap;
use std::time::Duration;

use encore_relay::{ConnId, ConnectParams, Hub, HubEffect};
use encore_wire::{Envelope, Message, SessionId};
use proptest::prelude::*;
use tokio::time::Instant;

const SESSION: &str = "s1";

#[derive(Debug, Clone)]
enum Op {
    Queue,
    Player,
    Join,
    Leave(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Queue),
        1 => Just(Op::Player),
        1 => Just(Op::Join),
        1 => (0usize..8).prop_map(Op::Leave),
    ]
}

fn frame(kind: &str, payload: &str) -> String {
    format!(r#"{{"v":1,"sessionId":"{SESSION}","kind":"{kind}","ts":0,"payload":{payload}}}"#)
}

fn queue_versions(effects: &[HubEffect], seen: &mut HashMap<ConnId, Vec<u64>>) {
    for effect in effects {
        if let HubEffect::Send { conn, frame } = effect {
            let envelope = Envelope::from_bytes(frame.as_bytes()).unwrap();
            if let Message::QueueUpdate(queue) = envelope.message {
                seen.entry(*conn).or_default().push(queue.version);
            }
        }
    }
}

proptest! {
    /// However consumers come and go, each accepted queue update bumps the
    /// session version by exactly one, and every consumer sees strictly
    /// increasing versions.
    #[test]
    fn queue_versions_are_stamped_once_and_in_order(ops in prop::collection::vec(op(), 1..80)) {
        let mut hub = Hub::new(Duration::from_secs(1800));
        let now = Instant::now();
        hub.open(0, ConnectParams::default());
        hub.handle_frame(0, &frame("hello", r#"{"role":"producer"}"#), now);

        let mut consumers: Vec<ConnId> = Vec::new();
        let mut next_conn: ConnId = 1;
        let mut seen: HashMap<ConnId, Vec<u64>> = HashMap::new();
        let mut updates = 0u64;

        for op in ops {
            let effects = match op {
                Op::Queue => {
                    updates += 1;
                    hub.handle_frame(0, &frame("queue_update", r#"{"current":null,"next":[],"prev":[]}"#), now)
                }
                Op::Player => hub.handle_frame(
                    0,
                    &frame("player_state", r#"{"currentTrack":null,"isPlaying":false,"positionMs":0,"volume":100,"shuffleEnabled":false,"repeatMode":"off"}"#),
                    now,
                ),
                Op::Join => {
                    let conn = next_conn;
                    next_conn += 1;
                    consumers.push(conn);
                    hub.open(conn, ConnectParams::default());
                    hub.handle_frame(conn, &frame("hello", r#"{"role":"consumer"}"#), now)
                }
                Op::Leave(i) => {
                    if !consumers.is_empty() {
                        let conn = consumers.remove(i % consumers.len());
                        hub.disconnect(conn);
                    }
                    Vec::new()
                }
            };
            queue_versions(&effects, &mut seen);
            prop_assert_eq!(hub.queue_version(&SessionId::from(SESSION)), updates);
        }

        for versions in seen.values() {
            prop_assert!(versions.windows(2).all(|w| w[0] < w[1]), "{:?}", versions);
        }
        prop_assert_eq!(hub.consumer_count(&SessionId::from(SESSION)), consumers.len());
    }
}
