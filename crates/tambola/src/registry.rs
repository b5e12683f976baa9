//! Event fan-out: which connections are listening to which rooms.
//!
//! The store holds the truth; this registry only routes push events to
//! live connections. A subscriber that went away is pruned lazily the
//! next time a broadcast to it fails.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tambola_model::{PlayerId, RoomCode};
use tambola_protocol::GameEvent;
use tokio::sync::mpsc;

/// Sender half of a connection's event queue.
pub type EventSender = mpsc::UnboundedSender<GameEvent>;

/// Tracks live subscriptions per room. Cheap to clone; clones share
/// state.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    inner: Arc<Mutex<HashMap<RoomCode, HashMap<PlayerId, EventSender>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a connection to a room's events. A resubscription
    /// (reconnect) replaces the stale sender.
    pub fn subscribe(
        &self,
        code: &RoomCode,
        player: &PlayerId,
        sender: EventSender,
    ) {
        let mut inner =
            self.inner.lock().expect("registry lock poisoned");
        inner
            .entry(code.clone())
            .or_default()
            .insert(player.clone(), sender);
    }

    /// Removes one player's subscription from every room. Called when
    /// their connection goes away for good.
    pub fn unsubscribe_all(&self, player: &PlayerId) {
        let mut inner =
            self.inner.lock().expect("registry lock poisoned");
        inner.retain(|_, subs| {
            subs.remove(player);
            !subs.is_empty()
        });
    }

    /// Delivers an event to every live subscriber of a room, pruning
    /// subscribers whose connection task has exited.
    pub fn broadcast(&self, code: &RoomCode, event: &GameEvent) {
        let mut inner =
            self.inner.lock().expect("registry lock poisoned");
        let Some(subs) = inner.get_mut(code) else {
            return;
        };
        subs.retain(|player, sender| {
            let delivered = sender.send(event.clone()).is_ok();
            if !delivered {
                tracing::debug!(
                    %code,
                    player = %player,
                    "pruning dead event subscriber"
                );
            }
            delivered
        });
    }

    /// Number of live subscribers for a room.
    pub fn subscriber_count(&self, code: &RoomCode) -> usize {
        self.inner
            .lock()
            .expect("registry lock poisoned")
            .get(code)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(code: &RoomCode) -> GameEvent {
        GameEvent::NumberCalled {
            room: code.clone(),
            number: 7,
            called_count: 1,
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_subscribers() {
        let registry = RoomRegistry::new();
        let code = RoomCode::from("AB12CD");
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry.subscribe(&code, &PlayerId::from("p1"), tx1);
        registry.subscribe(&code, &PlayerId::from("p2"), tx2);

        registry.broadcast(&code, &event(&code));
        assert!(rx1.recv().await.is_some());
        assert!(rx2.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_broadcast_prunes_dead_subscribers() {
        let registry = RoomRegistry::new();
        let code = RoomCode::from("AB12CD");
        let (tx, rx) = mpsc::unbounded_channel();
        registry.subscribe(&code, &PlayerId::from("p1"), tx);
        drop(rx);

        registry.broadcast(&code, &event(&code));
        assert_eq!(registry.subscriber_count(&code), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_all_removes_from_every_room() {
        let registry = RoomRegistry::new();
        let a = RoomCode::from("AAAAAA");
        let b = RoomCode::from("BBBBBB");
        let player = PlayerId::from("p1");
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.subscribe(&a, &player, tx.clone());
        registry.subscribe(&b, &player, tx);

        registry.unsubscribe_all(&player);
        assert_eq!(registry.subscriber_count(&a), 0);
        assert_eq!(registry.subscriber_count(&b), 0);
    }
}
