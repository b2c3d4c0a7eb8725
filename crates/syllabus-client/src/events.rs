//! Sync progress events.
//!
//! An [`EditSession`](crate::EditSession) publishes a [`SyncEvent`] whenever
//! a container changes [`SyncStatus`] or a sync starts, succeeds or fails.
//! Subscribers (a UI showing "changes not saved", a CLI progress line) get
//! their own receiver; events are not replayed to late subscribers.
//!
//! Events serialize as `{"event": "...", "payload": {...}}`:
//!
//! ```
//! use syllabus_client::{SyncEvent, SyncStatus};
//! use syllabus_tree::{ContainerKey, EntityId};
//!
//! let event = SyncEvent::status_changed(
//!     ContainerKey::CourseModules(EntityId::local()),
//!     SyncStatus::Dirty,
//! );
//! let json = serde_json::to_value(&event).unwrap();
//! assert_eq!(json["event"], "status_changed");
//! assert_eq!(json["payload"]["status"], "dirty");
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use syllabus_tree::ContainerKey;
use tokio::sync::broadcast;

// ============================================================================
// Sync Status
// ============================================================================

/// Sync state of one container.
///
/// `Clean -> Dirty -> Syncing -> Clean` on success; `Syncing -> Dirty` on
/// failure, after the local order was rolled back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Local order matches the last synced order.
    #[default]
    Clean,
    /// Local edits have not been synced yet.
    Dirty,
    /// A sync call is in flight.
    Syncing,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clean => write!(f, "clean"),
            Self::Dirty => write!(f, "dirty"),
            Self::Syncing => write!(f, "syncing"),
        }
    }
}

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `status_changed` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangedPayload {
    /// The container whose status changed.
    pub container: ContainerKey,
    /// The new status.
    pub status: SyncStatus,
}

/// Payload for the `sync_started` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStartedPayload {
    /// The container being synced.
    pub container: ContainerKey,
    /// Number of items sent.
    pub items: usize,
    /// When the call was issued.
    pub timestamp: DateTime<Utc>,
}

/// Payload for the `sync_succeeded` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSucceededPayload {
    /// The container that was synced.
    pub container: ContainerKey,
    /// Number of items the backend accepted.
    pub items: usize,
}

/// Payload for the `sync_failed` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFailedPayload {
    /// The container that failed to sync.
    pub container: ContainerKey,
    /// Human-readable failure message.
    pub message: String,
    /// Whether the local order was reverted to the last synced order.
    pub rolled_back: bool,
}

// ============================================================================
// Event Enum
// ============================================================================

/// Sync progress events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A container moved to a new status.
    StatusChanged(StatusChangedPayload),
    /// A remote call for a container was issued.
    SyncStarted(SyncStartedPayload),
    /// A remote call for a container succeeded.
    SyncSucceeded(SyncSucceededPayload),
    /// A remote call for a container failed.
    SyncFailed(SyncFailedPayload),
}

impl SyncEvent {
    /// Creates a `StatusChanged` event.
    #[must_use]
    pub const fn status_changed(container: ContainerKey, status: SyncStatus) -> Self {
        Self::StatusChanged(StatusChangedPayload { container, status })
    }

    /// Creates a `SyncStarted` event stamped now.
    #[must_use]
    pub fn sync_started(container: ContainerKey, items: usize) -> Self {
        Self::SyncStarted(SyncStartedPayload {
            container,
            items,
            timestamp: Utc::now(),
        })
    }

    /// Creates a `SyncSucceeded` event.
    #[must_use]
    pub const fn sync_succeeded(container: ContainerKey, items: usize) -> Self {
        Self::SyncSucceeded(SyncSucceededPayload { container, items })
    }

    /// Creates a `SyncFailed` event.
    #[must_use]
    pub fn sync_failed(container: ContainerKey, message: impl Into<String>, rolled_back: bool) -> Self {
        Self::SyncFailed(SyncFailedPayload {
            container,
            message: message.into(),
            rolled_back,
        })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::StatusChanged(_) => "status_changed",
            Self::SyncStarted(_) => "sync_started",
            Self::SyncSucceeded(_) => "sync_succeeded",
            Self::SyncFailed(_) => "sync_failed",
        }
    }

    /// The container the event is about.
    #[must_use]
    pub const fn container(&self) -> &ContainerKey {
        match self {
            Self::StatusChanged(p) => &p.container,
            Self::SyncStarted(p) => &p.container,
            Self::SyncSucceeded(p) => &p.container,
            Self::SyncFailed(p) => &p.container,
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts sync events to every subscriber.
///
/// Each subscriber has its own buffer of `capacity` events; one that falls
/// behind receives `Lagged` and misses the overwritten events.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBroadcaster {
    /// Creates a broadcaster with the given per-subscriber buffer.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Creates a new subscriber.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event; returns how many subscribers will see it.
    pub fn send(&self, event: SyncEvent) -> usize {
        // No subscribers is not an error.
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use syllabus_tree::EntityId;

    use super::*;

    fn container() -> ContainerKey {
        ContainerKey::ModuleLessons(EntityId::local())
    }

    #[test]
    fn test_sync_failed_serialization() {
        let event = SyncEvent::sync_failed(container(), "backend down", true);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event"], "sync_failed");
        assert_eq!(json["payload"]["message"], "backend down");
        assert_eq!(json["payload"]["rolledBack"], true);
        assert_eq!(json["payload"]["container"]["kind"], "module_lessons");
    }

    #[test]
    fn test_event_roundtrip_and_name() {
        let event = SyncEvent::sync_started(container(), 3);
        let json = serde_json::to_string(&event).unwrap();
        let parsed: SyncEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, event);
        assert_eq!(parsed.event_name(), "sync_started");
    }

    #[test]
    fn test_send_without_subscribers() {
        let broadcaster = EventBroadcaster::new(4);
        assert_eq!(broadcaster.send(SyncEvent::sync_succeeded(container(), 0)), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let broadcaster = EventBroadcaster::default();
        let mut receiver = broadcaster.subscribe();
        let key = container();

        broadcaster.send(SyncEvent::status_changed(key, SyncStatus::Syncing));
        broadcaster.send(SyncEvent::status_changed(key, SyncStatus::Clean));

        assert_eq!(
            receiver.recv().await.unwrap(),
            SyncEvent::status_changed(key, SyncStatus::Syncing)
        );
        assert_eq!(receiver.recv().await.unwrap().container(), &key);
        assert_eq!(broadcaster.receiver_count(), 1);
    }
}
