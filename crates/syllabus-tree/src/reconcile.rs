//! Position reconciliation between the local tree and the last synced order.
//!
//! A [`PositionReconciler`] keeps one baseline [`OrderSnapshot`] per
//! container (the module list of a course, or the lesson list of a module).
//! Staging a sync diffs the current order against the baseline, emits every
//! server-known item whose position changed, and advances the baseline. If
//! the remote call then fails, [`PositionReconciler::rollback`] reinstates
//! the previous baseline so the caller can restore the visible order.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::id::EntityId;
use crate::ordering::{renumber, Positioned};

// ============================================================================
// ContainerKey
// ============================================================================

/// A sibling group that is reordered and synced as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ContainerKey {
    /// The module list of a course.
    CourseModules(EntityId),
    /// The lesson list of a module.
    ModuleLessons(EntityId),
}

impl ContainerKey {
    /// Identifier of the container's owner.
    #[must_use]
    pub const fn owner(&self) -> &EntityId {
        match self {
            Self::CourseModules(id) | Self::ModuleLessons(id) => id,
        }
    }
}

impl fmt::Display for ContainerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CourseModules(id) => write!(f, "course:{id}/modules"),
            Self::ModuleLessons(id) => write!(f, "module:{id}/lessons"),
        }
    }
}

// ============================================================================
// Snapshot and diff types
// ============================================================================

/// One `{id, position}` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdate {
    /// Node id.
    pub id: EntityId,
    /// 1-based position.
    pub position: u32,
}

/// The order of a container at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    /// Which container this describes.
    pub container: ContainerKey,
    /// Entries in position order.
    pub entries: Vec<PositionUpdate>,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
}

impl OrderSnapshot {
    /// Captures the current order of `items`.
    #[must_use]
    pub fn capture<T: Positioned>(container: ContainerKey, items: &[T]) -> Self {
        Self {
            container,
            entries: items
                .iter()
                .map(|item| PositionUpdate {
                    id: *item.id(),
                    position: item.position(),
                })
                .collect(),
            taken_at: Utc::now(),
        }
    }

    /// A snapshot with no entries; every server-known item differs from it.
    #[must_use]
    pub fn empty(container: ContainerKey) -> Self {
        Self {
            container,
            entries: Vec::new(),
            taken_at: Utc::now(),
        }
    }

    /// Position of `id` in this snapshot.
    #[must_use]
    pub fn position_of(&self, id: &EntityId) -> Option<u32> {
        self.entries
            .iter()
            .find(|entry| entry.id == *id)
            .map(|entry| entry.position)
    }

    /// Reorders `items` to follow this snapshot, then renumbers densely.
    ///
    /// Items unknown to the snapshot keep their relative order after the known ones.
    pub fn restore<T: Positioned>(&self, items: &mut [T]) {
        items.sort_by_key(|item| self.position_of(item.id()).unwrap_or(u32::MAX));
        renumber(items);
    }
}

/// The changed positions of one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionDiff {
    /// Which container changed.
    pub container: ContainerKey,
    /// Every server-known item whose position differs from the baseline.
    pub items: Vec<PositionUpdate>,
}

impl PositionDiff {
    /// Returns `true` if nothing needs to be sent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Diffs `current` against `prior`.
///
/// Includes every item with a server id whose position differs from `prior`
/// or that `prior` does not know. Items with local ids are skipped: the
/// backend learns their positions through the deep upsert.
pub fn reconcile<T: Positioned>(
    container: ContainerKey,
    current: &[T],
    prior: &OrderSnapshot,
) -> PositionDiff {
    let items = current
        .iter()
        .filter(|item| !item.id().is_local())
        .filter(|item| prior.position_of(item.id()) != Some(item.position()))
        .map(|item| PositionUpdate {
            id: *item.id(),
            position: item.position(),
        })
        .collect();
    PositionDiff { container, items }
}

// ============================================================================
// PositionReconciler
// ============================================================================

/// A staged sync: the diff to send and the baseline it replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedSync {
    /// What to send to the backend.
    pub diff: PositionDiff,
    /// The baseline before staging, needed for rollback.
    pub prior: OrderSnapshot,
}

/// Tracks the last synced order of every container.
#[derive(Debug, Clone, Default)]
pub struct PositionReconciler {
    baselines: HashMap<ContainerKey, OrderSnapshot>,
}

impl PositionReconciler {
    /// Creates a reconciler with no baselines.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current baseline of `container`.
    #[must_use]
    pub fn baseline(&self, container: &ContainerKey) -> Option<&OrderSnapshot> {
        self.baselines.get(container)
    }

    /// Records `items` as the synced order of `container`.
    pub fn record<T: Positioned>(&mut self, container: ContainerKey, items: &[T]) {
        self.baselines
            .insert(container, OrderSnapshot::capture(container, items));
    }

    /// Drops the baseline of a container that no longer exists.
    pub fn forget(&mut self, container: &ContainerKey) {
        self.baselines.remove(container);
    }

    /// Removes `id` from the baseline of `container` without touching other entries.
    ///
    /// Used after a remote delete: the remaining siblings keep their old
    /// baseline positions, so the shift the delete caused shows up in the
    /// next diff.
    pub fn forget_item(&mut self, container: &ContainerKey, id: &EntityId) {
        if let Some(snapshot) = self.baselines.get_mut(container) {
            snapshot.entries.retain(|entry| entry.id != *id);
        }
    }

    /// Replaces `from` by `to` in the baseline of `container`, keeping its position.
    ///
    /// Used when a deep upsert swaps a local id for the server-assigned one.
    pub fn rename(&mut self, container: &ContainerKey, from: &EntityId, to: EntityId) {
        if let Some(snapshot) = self.baselines.get_mut(container) {
            for entry in &mut snapshot.entries {
                if entry.id == *from {
                    entry.id = to;
                }
            }
        }
    }

    /// Computes the diff of `current` against the baseline without changing anything.
    #[must_use]
    pub fn preview<T: Positioned>(&self, container: ContainerKey, current: &[T]) -> PositionDiff {
        match self.baselines.get(&container) {
            Some(prior) => reconcile(container, current, prior),
            None => reconcile(container, current, &OrderSnapshot::empty(container)),
        }
    }

    /// Diffs `current` against the baseline and makes `current` the new baseline.
    ///
    /// Staging twice without an intervening mutation yields an empty diff.
    pub fn stage<T: Positioned>(&mut self, container: ContainerKey, current: &[T]) -> StagedSync {
        let prior = self
            .baselines
            .insert(container, OrderSnapshot::capture(container, current))
            .unwrap_or_else(|| OrderSnapshot::empty(container));
        let diff = reconcile(container, current, &prior);
        debug!(
            container = %container,
            changed = diff.items.len(),
            "Staged position sync"
        );
        StagedSync { diff, prior }
    }

    /// Reinstates the baseline replaced by `staged` and returns it.
    pub fn rollback(&mut self, staged: StagedSync) -> OrderSnapshot {
        let container = staged.diff.container;
        debug!(container = %container, "Rolled back position baseline");
        self.baselines.insert(container, staged.prior.clone());
        staged.prior
    }
}
