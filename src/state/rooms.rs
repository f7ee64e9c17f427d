use std::fmt;

use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::dto::ws::RoomEvent;

/// Named broadcast group a socket can join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomKey {
    /// Everyone following an exercise: facilitators and participants alike.
    Exercise(Uuid),
    /// A single participant's personal channel.
    Participant(Uuid),
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomKey::Exercise(id) => write!(f, "exercise:{id}"),
            RoomKey::Participant(id) => write!(f, "participant:{id}"),
        }
    }
}

/// Registry of realtime rooms, each backed by its own Tokio broadcast channel.
///
/// Rooms are created lazily on first subscription and dropped once their last subscriber
/// leaves. Broadcasting into a room nobody joined is a no-op.
pub struct RoomHub {
    rooms: DashMap<RoomKey, broadcast::Sender<RoomEvent>>,
    capacity: usize,
}

impl RoomHub {
    /// Create an empty hub whose rooms buffer `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Join `key`, creating the room when needed.
    pub fn subscribe(&self, key: RoomKey) -> broadcast::Receiver<RoomEvent> {
        self.rooms
            .entry(key)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Deliver `event` to every current member of `key`, returning how many received it.
    pub fn broadcast(&self, key: RoomKey, event: RoomEvent) -> usize {
        self.rooms
            .get(&key)
            .map(|sender| sender.send(event).unwrap_or(0))
            .unwrap_or(0)
    }

    /// Drop the room if nobody listens anymore.
    pub fn release(&self, key: RoomKey) {
        self.rooms
            .remove_if(&key, |_, sender| sender.receiver_count() == 0);
    }

    /// Number of live subscribers of `key`.
    pub fn subscriber_count(&self, key: RoomKey) -> usize {
        self.rooms
            .get(&key)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Number of rooms currently allocated.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn members_of_a_room_receive_its_events_only() {
        let hub = RoomHub::new(4);
        let exercise = RoomKey::Exercise(Uuid::new_v4());
        let other = RoomKey::Exercise(Uuid::new_v4());

        let mut member = hub.subscribe(exercise);
        let mut outsider = hub.subscribe(other);

        let delivered = hub.broadcast(exercise, RoomEvent::new("injectReleased", json!({"n": 1})));
        assert_eq!(delivered, 1);

        let received = member.recv().await.unwrap();
        assert_eq!(received.event, "injectReleased");
        assert_eq!(received.data, json!({"n": 1}));
        assert!(outsider.try_recv().is_err());
    }

    #[test]
    fn broadcasting_to_an_unknown_room_reaches_nobody() {
        let hub = RoomHub::new(4);
        let key = RoomKey::Participant(Uuid::new_v4());
        assert_eq!(hub.broadcast(key, RoomEvent::new("participantUpdated", json!({}))), 0);
        assert_eq!(hub.room_count(), 0);
    }

    #[test]
    fn release_keeps_rooms_with_listeners() {
        let hub = RoomHub::new(4);
        let key = RoomKey::Exercise(Uuid::new_v4());

        let first = hub.subscribe(key);
        let second = hub.subscribe(key);
        assert_eq!(hub.subscriber_count(key), 2);

        drop(first);
        hub.release(key);
        assert_eq!(hub.room_count(), 1);

        drop(second);
        hub.release(key);
        assert_eq!(hub.room_count(), 0);
    }
}
