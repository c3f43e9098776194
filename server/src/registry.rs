//! Lazy room registry.
//!
//! Rooms are keyed by instance id and exist only while connections do:
//! the first joiner for an id creates the room, the gateway asks for
//! [`RoomRegistry::cleanup`] after every disconnect, and an empty room
//! is dropped from the map. Pending cases staged by the slash command
//! are parked here, keyed by channel, until a connection for that
//! channel arrives and consumes them.
//!
//! Lock order is always registry before room; the registry lock is
//! never held across an await on a room.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info};
use tokio::sync::Mutex;

use shared::PendingCase;

use crate::filter::ContentFilter;
use crate::notifier::Notifier;
use crate::room::{ConnId, Room, SharedRoom};

#[derive(Default)]
struct RegistryInner {
    rooms: HashMap<String, SharedRoom>,
    pending: HashMap<String, PendingCase>,
}

pub struct RoomRegistry {
    inner: Mutex<RegistryInner>,
    next_conn_id: AtomicU64,
    filter: Arc<ContentFilter>,
    notifier: Arc<dyn Notifier>,
}

impl RoomRegistry {
    pub fn new(filter: Arc<ContentFilter>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            next_conn_id: AtomicU64::new(1),
            filter,
            notifier,
        }
    }

    /// Allocates a process-unique connection id.
    pub fn next_conn_id(&self) -> ConnId {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the room for `instance_id`, creating it on first use.
    pub async fn get_or_create(&self, instance_id: &str) -> SharedRoom {
        let mut inner = self.inner.lock().await;
        if let Some(room) = inner.rooms.get(instance_id) {
            return Arc::clone(room);
        }
        info!("Creating room for instance {}", instance_id);
        let room = Room::shared(Arc::clone(&self.filter), Arc::clone(&self.notifier));
        inner.rooms.insert(instance_id.to_string(), Arc::clone(&room));
        room
    }

    /// Drops the room for `instance_id` if it has no connections left.
    /// Safe to call on every disconnect; a repopulated or missing room
    /// is left alone.
    pub async fn cleanup(&self, instance_id: &str) {
        let mut inner = self.inner.lock().await;
        let Some(room) = inner.rooms.get(instance_id).map(Arc::clone) else {
            return;
        };
        if room.lock().await.connection_count() == 0 {
            inner.rooms.remove(instance_id);
            info!("Room {} is empty; destroyed", instance_id);
        }
    }

    /// Parks a case for `channel_id`. A later staging for the same
    /// channel replaces the earlier one.
    pub async fn stage_case(&self, channel_id: &str, case: PendingCase) {
        debug!(
            "Staging case for channel {}: accused {}",
            channel_id, case.accused.username
        );
        let mut inner = self.inner.lock().await;
        inner.pending.insert(channel_id.to_string(), case);
    }

    /// Consumes the staged case for `channel_id`, if any. Each staged
    /// case is handed out exactly once.
    pub async fn take_pending(&self, channel_id: &str) -> Option<PendingCase> {
        let mut inner = self.inner.lock().await;
        inner.pending.remove(channel_id)
    }

    #[cfg(test)]
    async fn room_count(&self) -> usize {
        self.inner.lock().await.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::NullNotifier;
    use shared::Accused;
    use tokio::sync::mpsc;

    fn test_registry() -> RoomRegistry {
        RoomRegistry::new(Arc::new(ContentFilter::new()), Arc::new(NullNotifier))
    }

    #[tokio::test]
    async fn rooms_are_created_lazily_and_shared() {
        let registry = test_registry();
        assert_eq!(registry.room_count().await, 0);

        let a = registry.get_or_create("alpha").await;
        let b = registry.get_or_create("alpha").await;
        let other = registry.get_or_create("beta").await;

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));
        assert_eq!(registry.room_count().await, 2);
    }

    #[tokio::test]
    async fn cleanup_only_destroys_empty_rooms() {
        let registry = test_registry();
        let room = registry.get_or_create("alpha").await;

        let conn = registry.next_conn_id();
        let (tx, _rx) = mpsc::unbounded_channel();
        Room::admit(&room, conn, "alice".to_string(), tx, None, None).await;

        registry.cleanup("alpha").await;
        assert_eq!(registry.room_count().await, 1);

        Room::remove(&room, conn).await;
        registry.cleanup("alpha").await;
        assert_eq!(registry.room_count().await, 0);

        // Cleanup of an unknown instance is a no-op.
        registry.cleanup("alpha").await;
    }

    #[tokio::test]
    async fn staged_cases_are_consumed_once_and_replaceable() {
        let registry = test_registry();
        let case = |crime: &str| PendingCase {
            accused: Accused {
                id: Some("u-1".to_string()),
                username: "Bob".to_string(),
                avatar: None,
            },
            crime: crime.to_string(),
        };

        registry.stage_case("chan-1", case("first draft")).await;
        registry.stage_case("chan-1", case("final charge")).await;

        let taken = registry.take_pending("chan-1").await.unwrap();
        assert_eq!(taken.crime, "final charge");
        assert!(registry.take_pending("chan-1").await.is_none());
        assert!(registry.take_pending("chan-2").await.is_none());
    }

    #[tokio::test]
    async fn connection_ids_are_unique() {
        let registry = test_registry();
        let a = registry.next_conn_id();
        let b = registry.next_conn_id();
        assert_ne!(a, b);
    }
}
