//! Publish/subscribe hub keyed by group name.
//!
//! Each group owns one `tokio::sync::broadcast` channel.  A session
//! subscribes once and receives every frame published to its group,
//! including its own; the session filters those out by comparing
//! [`Published::from`] with its own id.  Frames are shared as `Arc<[u8]>`,
//! so fan-out to N subscribers never copies the payload.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;
use uuid::Uuid;

/// One frame as seen by subscribers.
#[derive(Debug, Clone)]
pub struct Published {
    /// Session that published the frame.
    pub from: Uuid,
    pub bytes: Arc<[u8]>,
}

/// Group registry.  Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct Hub {
    groups: RwLock<HashMap<String, broadcast::Sender<Published>>>,
    capacity: usize,
}

impl Hub {
    /// Creates an empty hub whose group channels buffer `capacity` frames.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0 (see `tokio::sync::broadcast::channel`).
    /// `ServerConfig::validate` rejects that value before a hub is built.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "hub capacity must be at least 1");
        Self {
            groups: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Subscribes to `group`, creating it on first use.
    pub fn subscribe(&self, group: &str) -> broadcast::Receiver<Published> {
        if let Some(sender) = self.read_groups().get(group) {
            return sender.subscribe();
        }
        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        groups
            .entry(group.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publishes `bytes` to `group` and returns how many receivers got it.
    ///
    /// The count includes the publisher's own receiver.  Publishing to a
    /// group nobody has joined is a no-op that returns 0.
    pub fn publish(&self, group: &str, from: Uuid, bytes: Arc<[u8]>) -> usize {
        match self.read_groups().get(group) {
            Some(sender) => sender.send(Published { from, bytes }).unwrap_or(0),
            None => 0,
        }
    }

    /// Number of live receivers in `group`.
    pub fn subscriber_count(&self, group: &str) -> usize {
        self.read_groups()
            .get(group)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Drops every group that no longer has subscribers.  Returns how many
    /// groups were removed.
    pub fn prune_idle(&self) -> usize {
        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        let before = groups.len();
        groups.retain(|_, sender| sender.receiver_count() > 0);
        before - groups.len()
    }

    /// Number of groups currently known.
    pub fn group_count(&self) -> usize {
        self.read_groups().len()
    }

    fn read_groups(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<String, broadcast::Sender<Published>>> {
        self.groups.read().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(bytes: &[u8]) -> Arc<[u8]> {
        Arc::from(bytes)
    }

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        // Arrange
        let hub = Hub::new(8);
        let mut a = hub.subscribe("main");
        let mut b = hub.subscribe("main");
        let sender = Uuid::new_v4();

        // Act
        let delivered = hub.publish("main", sender, frame(&[1, 2, 3]));

        // Assert
        assert_eq!(delivered, 2);
        for rx in [&mut a, &mut b] {
            let got = rx.recv().await.unwrap();
            assert_eq!(got.from, sender);
            assert_eq!(&*got.bytes, &[1, 2, 3]);
        }
    }

    #[tokio::test]
    async fn test_groups_are_isolated() {
        let hub = Hub::new(8);
        let mut main = hub.subscribe("main");
        let _other = hub.subscribe("other");

        hub.publish("other", Uuid::new_v4(), frame(&[9]));

        assert!(matches!(
            main.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn test_publish_to_unknown_group_is_noop() {
        let hub = Hub::new(8);
        assert_eq!(hub.publish("nobody", Uuid::new_v4(), frame(&[0])), 0);
        assert_eq!(hub.group_count(), 0);
    }

    #[test]
    fn test_subscriber_count_tracks_drops() {
        let hub = Hub::new(8);
        let a = hub.subscribe("main");
        let b = hub.subscribe("main");
        assert_eq!(hub.subscriber_count("main"), 2);

        drop(a);
        assert_eq!(hub.subscriber_count("main"), 1);
        drop(b);
        assert_eq!(hub.subscriber_count("main"), 0);
    }

    #[test]
    fn test_prune_idle_removes_empty_groups_only() {
        // Arrange
        let hub = Hub::new(8);
        let _keep = hub.subscribe("busy");
        drop(hub.subscribe("idle"));

        // Act
        let removed = hub.prune_idle();

        // Assert
        assert_eq!(removed, 1);
        assert_eq!(hub.group_count(), 1);
        assert_eq!(hub.subscriber_count("busy"), 1);
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags_instead_of_blocking() {
        let hub = Hub::new(2);
        let mut rx = hub.subscribe("main");
        let from = Uuid::new_v4();

        for i in 0..5u8 {
            hub.publish("main", from, frame(&[i]));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
        assert_eq!(&*rx.recv().await.unwrap().bytes, &[3]);
    }
}
