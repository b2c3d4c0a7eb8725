//! The editing session: a course tree kept in sync with a [`RemoteStore`].
//!
//! Local edits apply immediately and mark the affected containers
//! [`SyncStatus::Dirty`]. Syncs are explicit:
//!
//! - [`EditSession::sync_module_order`] / [`EditSession::sync_lesson_order`]
//!   send the minimal bulk position update for one container and roll the
//!   container back to its last synced order when the call fails;
//! - [`EditSession::save_module`] validates a module subtree, sends it as a
//!   deep upsert and merges the server's canonical copy, ids included;
//! - [`EditSession::delete_module`] / [`EditSession::delete_lesson`] delete
//!   remotely first, then locally, then sync the shifted siblings.
//!
//! Session state sits behind an async mutex that is only held for local
//! work, never across a remote call. Syncs of one container are serialized
//! by a [`SyncQueue`]; different containers sync concurrently.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use syllabus_tree::{
    validate_module, ContainerKey, CourseTree, EntityId, EntityKind, PositionDiff,
    PositionsRequest, TreeError,
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::events::{EventBroadcaster, SyncEvent, SyncStatus};
use crate::queue::SyncQueue;
use crate::store::RemoteStore;

fn saved(kind: EntityKind, id: &EntityId) -> Result<Uuid> {
    id.server_id().ok_or_else(|| {
        SyncError::Tree(TreeError::malformed(format!(
            "{kind} '{id}' has not been saved yet"
        )))
    })
}

#[derive(Debug)]
struct SessionState {
    tree: CourseTree,
    reconciler: syllabus_tree::PositionReconciler,
    statuses: HashMap<ContainerKey, SyncStatus>,
    /// Modules with edits that only a deep upsert can sync.
    unsaved: HashSet<EntityId>,
    /// Modules with a deep upsert in flight.
    saving: HashSet<EntityId>,
}

impl SessionState {
    fn new(tree: CourseTree) -> Self {
        let mut reconciler = syllabus_tree::PositionReconciler::new();
        tree.record_baselines(&mut reconciler);
        Self {
            tree,
            reconciler,
            statuses: HashMap::new(),
            unsaved: HashSet::new(),
            saving: HashSet::new(),
        }
    }

    fn course_key(&self) -> ContainerKey {
        ContainerKey::CourseModules(self.tree.id())
    }

    fn status(&self, container: &ContainerKey) -> SyncStatus {
        self.statuses.get(container).copied().unwrap_or_default()
    }

    fn set_status(&mut self, container: ContainerKey, status: SyncStatus, events: &EventBroadcaster) {
        if self.status(&container) == status {
            return;
        }
        self.statuses.insert(container, status);
        events.send(SyncEvent::status_changed(container, status));
    }

    /// Status a container settles in once its position sync is done.
    ///
    /// Stays dirty if the order moved again while the sync was in flight.
    fn settled(&self, container: &ContainerKey) -> SyncStatus {
        let unsaved = matches!(
            container,
            ContainerKey::ModuleLessons(module_id) if self.unsaved.contains(module_id)
        );
        let pending = self
            .tree
            .preview(&self.reconciler, *container)
            .is_ok_and(|diff| !diff.is_empty());
        if unsaved || pending {
            SyncStatus::Dirty
        } else {
            SyncStatus::Clean
        }
    }

    fn ensure_not_saving(&self, module_id: &EntityId) -> Result<()> {
        if self.saving.contains(module_id) {
            return Err(SyncError::SaveInFlight {
                module: module_id.to_string(),
            });
        }
        Ok(())
    }

    fn mark_unsaved(&mut self, module_id: EntityId, events: &EventBroadcaster) {
        self.unsaved.insert(module_id);
        self.set_status(ContainerKey::ModuleLessons(module_id), SyncStatus::Dirty, events);
    }

    fn drop_container(&mut self, container: &ContainerKey, queue: &SyncQueue) {
        self.reconciler.forget(container);
        self.statuses.remove(container);
        queue.remove(container);
    }
}

/// A course being edited against a remote store.
#[derive(Debug)]
pub struct EditSession<S> {
    store: Arc<S>,
    state: Arc<Mutex<SessionState>>,
    queue: Arc<SyncQueue>,
    events: EventBroadcaster,
}

impl<S> Clone for EditSession<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            state: Arc::clone(&self.state),
            queue: Arc::clone(&self.queue),
            events: self.events.clone(),
        }
    }
}

impl<S: RemoteStore> EditSession<S> {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Fetches a course and its deep module list and starts a session on it.
    pub async fn load(store: Arc<S>, course_id: Uuid, events: EventBroadcaster) -> Result<Self> {
        let (record, modules) = futures::try_join!(
            store.fetch_course(course_id),
            store.fetch_modules_deep(course_id),
        )?;
        let tree = CourseTree::from_server(record, modules)?;
        info!(
            course = %course_id,
            modules = tree.modules().len(),
            "Loaded course"
        );
        Ok(Self::with_tree(store, tree, events))
    }

    /// Starts a session on an existing tree, treating its current order as synced.
    #[must_use]
    pub fn with_tree(store: Arc<S>, tree: CourseTree, events: EventBroadcaster) -> Self {
        Self {
            store,
            state: Arc::new(Mutex::new(SessionState::new(tree))),
            queue: Arc::new(SyncQueue::new()),
            events,
        }
    }

    /// Replaces the local tree with a fresh copy from the backend.
    ///
    /// Unsynced local edits are discarded.
    pub async fn reload(&self) -> Result<()> {
        let course_id = {
            let state = self.state.lock().await;
            saved(EntityKind::Course, &state.tree.id())?
        };
        let (record, modules) = futures::try_join!(
            self.store.fetch_course(course_id),
            self.store.fetch_modules_deep(course_id),
        )?;
        let tree = CourseTree::from_server(record, modules)?;

        let mut state = self.state.lock().await;
        let containers: Vec<ContainerKey> = state
            .statuses
            .iter()
            .filter(|(_, status)| **status != SyncStatus::Clean)
            .map(|(container, _)| *container)
            .collect();
        *state = SessionState::new(tree);
        for container in containers {
            self.events
                .send(SyncEvent::status_changed(container, SyncStatus::Clean));
        }
        info!(course = %course_id, "Reloaded course");
        Ok(())
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// A copy of the current tree.
    pub async fn tree(&self) -> CourseTree {
        self.state.lock().await.tree.clone()
    }

    /// Sync status of a container.
    pub async fn status(&self, container: &ContainerKey) -> SyncStatus {
        self.state.lock().await.status(container)
    }

    /// Containers with local edits not yet synced.
    pub async fn dirty_containers(&self) -> Vec<ContainerKey> {
        let state = self.state.lock().await;
        state
            .tree
            .containers()
            .into_iter()
            .filter(|container| state.status(container) != SyncStatus::Clean)
            .collect()
    }

    /// The container holding the course's modules.
    pub async fn module_container(&self) -> ContainerKey {
        self.state.lock().await.course_key()
    }

    /// Subscribes to sync events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    // ========================================================================
    // Local edits
    // ========================================================================

    /// Inserts a module after `after` (or at the end). The module is unsaved.
    pub async fn insert_module(&self, after: Option<u32>, title: &str) -> Result<EntityId> {
        let mut state = self.state.lock().await;
        let module_id = state.tree.insert_module(after, title)?;
        let course_key = state.course_key();
        state.set_status(course_key, SyncStatus::Dirty, &self.events);
        state.mark_unsaved(module_id, &self.events);
        Ok(module_id)
    }

    /// Moves a module to `position` within the course.
    pub async fn move_module(&self, module_id: &EntityId, position: u32) -> Result<()> {
        let mut state = self.state.lock().await;
        state.tree.move_module(module_id, position)?;
        let course_key = state.course_key();
        state.set_status(course_key, SyncStatus::Dirty, &self.events);
        Ok(())
    }

    /// Inserts a lesson into a module. The module becomes unsaved.
    pub async fn insert_lesson(
        &self,
        module_id: &EntityId,
        after: Option<u32>,
        title: &str,
    ) -> Result<EntityId> {
        let mut state = self.state.lock().await;
        state.ensure_not_saving(module_id)?;
        let lesson_id = state.tree.insert_lesson(module_id, after, title)?;
        state.mark_unsaved(*module_id, &self.events);
        Ok(lesson_id)
    }

    /// Moves a lesson to `position` within its module.
    pub async fn move_lesson(&self, lesson_id: &EntityId, position: u32) -> Result<()> {
        let mut state = self.state.lock().await;
        let module_id = state.tree.module_of(lesson_id)?;
        state.ensure_not_saving(&module_id)?;
        state.tree.move_lesson(lesson_id, position)?;
        state.set_status(
            ContainerKey::ModuleLessons(module_id),
            SyncStatus::Dirty,
            &self.events,
        );
        Ok(())
    }

    /// Applies an edit to the subtree of one module; the module becomes unsaved.
    ///
    /// The closure gets the whole tree but should only touch `module_id`'s
    /// subtree: lesson fields, contents, quiz questions and assignments.
    /// Fails with [`SyncError::SaveInFlight`] while the module is being saved.
    pub async fn edit_module<R>(
        &self,
        module_id: &EntityId,
        edit: impl FnOnce(&mut CourseTree) -> syllabus_tree::Result<R> + Send,
    ) -> Result<R> {
        let mut state = self.state.lock().await;
        state.tree.module(module_id)?;
        state.ensure_not_saving(module_id)?;
        let output = edit(&mut state.tree)?;
        state.mark_unsaved(*module_id, &self.events);
        Ok(output)
    }

    // ========================================================================
    // Position sync
    // ========================================================================

    /// Sends the module order of the course.
    pub async fn sync_module_order(&self) -> Result<PositionDiff> {
        let container = self.module_container().await;
        self.sync_container(container).await
    }

    /// Sends the lesson order of a module.
    pub async fn sync_lesson_order(&self, module_id: &EntityId) -> Result<PositionDiff> {
        self.sync_container(ContainerKey::ModuleLessons(*module_id))
            .await
    }

    /// Sends the minimal position update for `container`.
    ///
    /// Returns the diff that was sent; an empty diff sends nothing. On
    /// failure the container's order and baseline revert to the last synced
    /// state and [`SyncError::RolledBack`] is returned.
    pub async fn sync_container(&self, container: ContainerKey) -> Result<PositionDiff> {
        let ticket = self.queue.acquire(container).await;

        let (staged, request) = {
            let mut state = self.state.lock().await;
            if container.owner().is_local() {
                debug!(container = %container, "Owner not saved; order travels with its deep upsert");
                return Ok(PositionDiff {
                    container,
                    items: Vec::new(),
                });
            }
            let state = &mut *state;
            let staged = state.tree.stage(&mut state.reconciler, container)?;
            if staged.diff.is_empty() {
                let settled = state.settled(&container);
                state.set_status(container, settled, &self.events);
                return Ok(staged.diff);
            }
            let request = match PositionsRequest::from_diff(&staged.diff) {
                Ok(request) => request,
                Err(e) => {
                    state.reconciler.rollback(staged);
                    return Err(e.into());
                }
            };
            state.set_status(container, SyncStatus::Syncing, &self.events);
            self.events
                .send(SyncEvent::sync_started(container, staged.diff.items.len()));
            (staged, request)
        };

        debug!(
            container = %container,
            sequence = ticket.sequence(),
            items = staged.diff.items.len(),
            "Sending position update"
        );
        let outcome = self.store.update_positions(&request).await;

        let mut state = self.state.lock().await;
        match outcome {
            Ok(()) => {
                let settled = state.settled(&container);
                state.set_status(container, settled, &self.events);
                self.events
                    .send(SyncEvent::sync_succeeded(container, staged.diff.items.len()));
                info!(container = %container, items = staged.diff.items.len(), "Positions synced");
                Ok(staged.diff)
            }
            Err(failure) => {
                let state = &mut *state;
                let prior = state.reconciler.rollback(staged);
                let rolled_back = match state.tree.restore_order(&prior) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(container = %container, error = %e, "Could not restore container order");
                        false
                    }
                };
                state.set_status(container, SyncStatus::Dirty, &self.events);
                self.events.send(SyncEvent::sync_failed(
                    container,
                    failure.message.clone(),
                    rolled_back,
                ));
                warn!(container = %container, error = %failure, "Position sync failed");
                Err(SyncError::rolled_back(container, failure))
            }
        }
    }

    // ========================================================================
    // Deep upsert
    // ========================================================================

    /// Validates a module subtree and sends it as one create-or-update call.
    ///
    /// On success the server's copy replaces the local module, local ids are
    /// swapped for server ids and the lesson order becomes the synced
    /// baseline. Returns the module's server id. Nothing local changes on
    /// failure.
    ///
    /// Edits to the module's subtree are refused until the call returns, so
    /// the merge cannot overwrite them.
    pub async fn save_module(&self, module_id: &EntityId) -> Result<EntityId> {
        let container = ContainerKey::ModuleLessons(*module_id);
        let _ticket = self.queue.acquire(container).await;

        let (course_id, payload) = {
            let mut state = self.state.lock().await;
            let course_id = saved(EntityKind::Course, &state.tree.id())?;
            let payload = state.tree.to_deep_payload(module_id)?;
            validate_module(&payload)?;
            state.saving.insert(*module_id);
            state.set_status(container, SyncStatus::Syncing, &self.events);
            self.events
                .send(SyncEvent::sync_started(container, payload.lessons.len()));
            (course_id, payload)
        };

        let outcome = self
            .store
            .create_or_update_module_deep(course_id, &payload)
            .await;

        let mut state = self.state.lock().await;
        let state = &mut *state;
        state.saving.remove(module_id);
        let deep = match outcome {
            Ok(deep) => deep,
            Err(failure) => {
                state.set_status(container, SyncStatus::Dirty, &self.events);
                self.events
                    .send(SyncEvent::sync_failed(container, failure.message.clone(), false));
                warn!(module = %module_id, error = %failure, "Deep upsert failed");
                return Err(failure.into());
            }
        };

        let module = deep.into_module(course_id)?;
        let server_id = module.id;
        state.tree.merge_server_module(module_id, module)?;

        let course_key = state.course_key();
        if server_id != *module_id {
            state.reconciler.rename(&course_key, module_id, server_id);
            state.drop_container(&container, &self.queue);
            state.unsaved.remove(module_id);
        }
        let lessons_key = ContainerKey::ModuleLessons(server_id);
        let lessons = state.tree.module(&server_id)?.lessons.clone();
        state.reconciler.record(lessons_key, &lessons);
        state.unsaved.remove(&server_id);
        state.set_status(lessons_key, SyncStatus::Clean, &self.events);
        self.events
            .send(SyncEvent::sync_succeeded(lessons_key, lessons.len()));
        info!(
            local = %module_id,
            module = %server_id,
            lessons = lessons.len(),
            "Module saved"
        );
        Ok(server_id)
    }

    // ========================================================================
    // Deletes
    // ========================================================================

    /// Deletes a module remotely, then locally, then syncs the shifted modules.
    ///
    /// Returns the position update sent for the remaining modules.
    pub async fn delete_module(&self, module_id: &EntityId) -> Result<PositionDiff> {
        let course_key = self.module_container().await;
        {
            let _ticket = self.queue.acquire(course_key).await;
            {
                let state = self.state.lock().await;
                state.tree.module(module_id)?;
                state.ensure_not_saving(module_id)?;
            }
            if let Some(id) = module_id.server_id() {
                self.store.delete_module(id).await?;
            }

            let mut state = self.state.lock().await;
            state.tree.remove_module(module_id)?;
            state.reconciler.forget_item(&course_key, module_id);
            state.drop_container(&ContainerKey::ModuleLessons(*module_id), &self.queue);
            state.unsaved.remove(module_id);
            state.set_status(course_key, SyncStatus::Dirty, &self.events);
            info!(module = %module_id, "Module deleted");
        }
        self.sync_container(course_key).await
    }

    /// Deletes a lesson remotely, then locally, then syncs the shifted lessons.
    pub async fn delete_lesson(&self, lesson_id: &EntityId) -> Result<PositionDiff> {
        let module_id = self.state.lock().await.tree.module_of(lesson_id)?;
        let container = ContainerKey::ModuleLessons(module_id);
        {
            let _ticket = self.queue.acquire(container).await;
            if let Some(id) = lesson_id.server_id() {
                self.store.delete_lesson(id).await?;
            }

            let mut state = self.state.lock().await;
            state.tree.remove_lesson(lesson_id)?;
            state.reconciler.forget_item(&container, lesson_id);
            state.set_status(container, SyncStatus::Dirty, &self.events);
            info!(lesson = %lesson_id, module = %module_id, "Lesson deleted");
        }
        self.sync_container(container).await
    }

    // ========================================================================
    // Lesson detail
    // ========================================================================

    /// Fetches contents, quiz and assignment of a lesson into the tree.
    ///
    /// Lessons that were never saved have nothing to fetch.
    pub async fn load_lesson_detail(&self, lesson_id: &EntityId) -> Result<()> {
        self.state.lock().await.tree.lesson(lesson_id)?;
        let Some(id) = lesson_id.server_id() else {
            debug!(lesson = %lesson_id, "Lesson not saved; no detail to load");
            return Ok(());
        };
        let detail = self.store.fetch_lesson_detail(id).await?;
        self.state
            .lock()
            .await
            .tree
            .replace_lesson_detail(lesson_id, detail)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use syllabus_tree::LessonPatch;

    use super::*;
    use crate::error::{FailureKind, RemoteFailure};
    use crate::memory::{network_failure, MemoryStore};

    async fn session(
        modules: &[(&str, &[&str])],
    ) -> (Arc<MemoryStore>, EditSession<MemoryStore>, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let course = store.seed_course("Rust 101", modules);
        let session = EditSession::load(Arc::clone(&store), course.id, EventBroadcaster::new(32))
            .await
            .unwrap();
        (store, session, course.id)
    }

    fn titles(tree: &CourseTree) -> Vec<String> {
        tree.modules().iter().map(|m| m.title.clone()).collect()
    }

    #[tokio::test]
    async fn test_move_and_sync_sends_shifted_modules() {
        let (store, session, course_id) = session(&[("A", &[]), ("B", &[]), ("C", &[])]).await;
        let tree = session.tree().await;
        let c = tree.modules()[2].id;

        session.move_module(&c, 1).await.unwrap();
        assert_eq!(session.status(&session.module_container().await).await, SyncStatus::Dirty);

        let diff = session.sync_module_order().await.unwrap();
        assert_eq!(diff.items.len(), 3);
        assert_eq!(titles(&session.tree().await), vec!["C", "A", "B"]);
        assert_eq!(store.module_ids(course_id)[0], c.server_id().unwrap());
        assert_eq!(session.status(&session.module_container().await).await, SyncStatus::Clean);

        let again = session.sync_module_order().await.unwrap();
        assert!(again.is_empty());
        assert_eq!(store.calls().iter().filter(|call| call.starts_with("PATCH")).count(), 1);
    }

    #[tokio::test]
    async fn test_failed_sync_rolls_back_order() {
        let (store, session, course_id) = session(&[("A", &[]), ("B", &[]), ("C", &[])]).await;
        let before = session.tree().await;
        let mut events = session.subscribe();

        session.move_module(&before.modules()[2].id, 1).await.unwrap();
        store.fail_next(network_failure());
        let err = session.sync_module_order().await.unwrap_err();

        assert!(matches!(err, SyncError::RolledBack { .. }));
        assert!(err.is_transient());
        assert_eq!(session.tree().await, before);
        assert_eq!(session.status(&session.module_container().await).await, SyncStatus::Dirty);
        assert_eq!(store.module_ids(course_id), before.modules().iter().map(|m| m.id.server_id().unwrap()).collect::<Vec<_>>());

        let mut saw_failure = false;
        while let Ok(event) = events.try_recv() {
            if let SyncEvent::SyncFailed(payload) = event {
                assert!(payload.rolled_back);
                saw_failure = true;
            }
        }
        assert!(saw_failure);

        // The rolled back baseline lets the same move be retried.
        session.move_module(&before.modules()[2].id, 1).await.unwrap();
        assert_eq!(session.sync_module_order().await.unwrap().items.len(), 3);
    }

    #[tokio::test]
    async fn test_save_new_module_swaps_ids() {
        let (store, session, course_id) = session(&[("A", &["a1"])]).await;

        let module_id = session.insert_module(None, "B").await.unwrap();
        let lesson_id = session.insert_lesson(&module_id, None, "b1").await.unwrap();
        session
            .edit_module(&module_id, |tree| {
                tree.update_lesson(
                    &lesson_id,
                    LessonPatch {
                        duration: Some("10m".to_string()),
                        ..LessonPatch::default()
                    },
                )
            })
            .await
            .unwrap();

        let server_id = session.save_module(&module_id).await.unwrap();

        assert!(!server_id.is_local());
        let tree = session.tree().await;
        let module = tree.module(&server_id).unwrap();
        assert_eq!(module.position, 2);
        assert!(!module.lessons[0].id.is_local());
        assert_eq!(module.lessons[0].duration, "10m");
        assert_eq!(store.module_ids(course_id).len(), 2);
        assert_eq!(
            session.status(&ContainerKey::ModuleLessons(server_id)).await,
            SyncStatus::Clean
        );
        assert!(session.sync_lesson_order(&server_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_module_is_not_sent() {
        let (store, session, _) = session(&[("A", &["a1"])]).await;
        let tree = session.tree().await;
        let module_id = tree.modules()[0].id;
        let lesson_id = tree.modules()[0].lessons[0].id;

        session
            .edit_module(&module_id, |tree| tree.insert_question(&lesson_id, None, " "))
            .await
            .unwrap();

        let calls_before = store.calls().len();
        let err = session.save_module(&module_id).await.unwrap_err();
        assert!(err.is_validation(), "expected validation error, got {err:?}");
        assert_eq!(store.calls().len(), calls_before);
    }

    #[tokio::test]
    async fn test_delete_middle_module_syncs_one_shift() {
        let (store, session, course_id) = session(&[("A", &[]), ("B", &[]), ("C", &[])]).await;
        let b = session.tree().await.modules()[1].id;

        let diff = session.delete_module(&b).await.unwrap();

        assert_eq!(diff.items.len(), 1);
        assert_eq!(diff.items[0].position, 2);
        assert_eq!(titles(&session.tree().await), vec!["A", "C"]);
        assert_eq!(store.module_positions(course_id), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_delete_failure_keeps_local_module() {
        let (store, session, _) = session(&[("A", &["a1", "a2"])]).await;
        let lesson = session.tree().await.modules()[0].lessons[0].id;
        store.fail_next(RemoteFailure::from_status(403, "forbidden"));

        let err = session.delete_lesson(&lesson).await.unwrap_err();

        assert_eq!(err.remote().unwrap().kind, FailureKind::Unauthorized);
        assert!(session.tree().await.lesson(&lesson).is_ok());
    }

    #[tokio::test]
    async fn test_load_lesson_detail_fills_quiz() {
        let (store, session, course_id) = session(&[("A", &["a1"])]).await;
        let lesson_uuid = store.lesson_ids(course_id)[0];
        store.seed_quiz(lesson_uuid, "2 + 2?", &["3", "4"], 1);
        let lesson_id = EntityId::Server(lesson_uuid);

        session.load_lesson_detail(&lesson_id).await.unwrap();

        let tree = session.tree().await;
        let lesson = tree.lesson(&lesson_id).unwrap();
        assert_eq!(lesson.questions.len(), 1);
        assert_eq!(lesson.questions[0].correct_count(), 1);
        assert_eq!(lesson.questions[0].options[1].position, 2);
    }

    #[tokio::test]
    async fn test_concurrent_syncs_of_one_container_are_serialized() {
        let (store, session, course_id) = session(&[("A", &[]), ("B", &[]), ("C", &[])]).await;
        let tree = session.tree().await;
        let (a, c) = (tree.modules()[0].id, tree.modules()[2].id);
        store.set_delay(Some(Duration::from_millis(30)));

        session.move_module(&c, 1).await.unwrap();
        let first = {
            let session = session.clone();
            tokio::spawn(async move { session.sync_module_order().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        session.move_module(&a, 3).await.unwrap();
        let second = session.sync_module_order().await.unwrap();

        first.await.unwrap().unwrap();
        assert!(!second.is_empty());
        assert_eq!(titles(&session.tree().await), vec!["C", "B", "A"]);
        let stored: Vec<EntityId> = store
            .module_ids(course_id)
            .into_iter()
            .map(EntityId::Server)
            .collect();
        assert_eq!(stored, session.tree().await.modules().iter().map(|m| m.id).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_reload_discards_local_edits() {
        let (_, session, _) = session(&[("A", &[]), ("B", &[])]).await;
        let before = session.tree().await;
        session.move_module(&before.modules()[1].id, 1).await.unwrap();

        session.reload().await.unwrap();

        assert_eq!(session.tree().await, before);
        assert!(session.dirty_containers().await.is_empty());
    }

    #[tokio::test]
    async fn test_move_during_sync_leaves_container_dirty() {
        let (store, session, _) = session(&[("A", &[]), ("B", &[]), ("C", &[])]).await;
        let tree = session.tree().await;
        let (a, c) = (tree.modules()[0].id, tree.modules()[2].id);
        let course_key = session.module_container().await;
        store.set_delay(Some(Duration::from_millis(50)));

        session.move_module(&c, 1).await.unwrap();
        let first = {
            let session = session.clone();
            tokio::spawn(async move { session.sync_module_order().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(session.status(&course_key).await, SyncStatus::Syncing);
        session.move_module(&a, 3).await.unwrap();
        first.await.unwrap().unwrap();

        assert_eq!(session.status(&course_key).await, SyncStatus::Dirty);
        assert!(session.dirty_containers().await.contains(&course_key));

        store.set_delay(None);
        assert!(!session.sync_module_order().await.unwrap().is_empty());
        assert_eq!(session.status(&course_key).await, SyncStatus::Clean);
        assert!(session.dirty_containers().await.is_empty());
    }

    #[tokio::test]
    async fn test_edits_are_refused_while_module_saves() {
        let (store, session, _) = session(&[("A", &["a1", "a2"])]).await;
        let tree = session.tree().await;
        let module_id = tree.modules()[0].id;
        let lesson_id = tree.modules()[0].lessons[0].id;
        store.set_delay(Some(Duration::from_millis(50)));

        let save = {
            let session = session.clone();
            tokio::spawn(async move { session.save_module(&module_id).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        let rename = |title: &str| syllabus_tree::ModulePatch {
            title: Some(title.to_string()),
            ..syllabus_tree::ModulePatch::default()
        };
        let patch = rename("Renamed");
        let err = session
            .edit_module(&module_id, move |tree| tree.update_module(&module_id, patch))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::SaveInFlight { .. }));
        assert!(matches!(
            session.move_lesson(&lesson_id, 2).await.unwrap_err(),
            SyncError::SaveInFlight { .. }
        ));
        assert!(matches!(
            session.insert_lesson(&module_id, None, "a3").await.unwrap_err(),
            SyncError::SaveInFlight { .. }
        ));

        assert_eq!(save.await.unwrap().unwrap(), module_id);
        let container = ContainerKey::ModuleLessons(module_id);
        let tree = session.tree().await;
        assert_eq!(tree.module(&module_id).unwrap().title, "A");
        assert_eq!(tree.module(&module_id).unwrap().lessons.len(), 2);
        assert_eq!(session.status(&container).await, SyncStatus::Clean);

        store.set_delay(None);
        let patch = rename("Renamed");
        session
            .edit_module(&module_id, move |tree| tree.update_module(&module_id, patch))
            .await
            .unwrap();
        assert_eq!(session.status(&container).await, SyncStatus::Dirty);
    }

    #[tokio::test]
    async fn test_save_requires_loaded_lesson_detail() {
        let store = Arc::new(MemoryStore::new());
        let seeded = store.seed_course("Rust 101", &[("A", &["a1"])]);
        let loaded = EditSession::load(Arc::clone(&store), seeded.id, EventBroadcaster::new(32))
            .await
            .unwrap();
        let mut course = loaded.tree().await.into_course();
        course.modules[0].lessons[0].detail_loaded = false;
        let module_id = course.modules[0].id;
        let lesson_id = course.modules[0].lessons[0].id;
        let session = EditSession::with_tree(
            Arc::clone(&store),
            CourseTree::new(course).unwrap(),
            EventBroadcaster::new(32),
        );

        let calls_before = store.calls().len();
        let err = session.save_module(&module_id).await.unwrap_err();
        assert!(err.is_validation(), "expected validation error, got {err:?}");
        assert!(matches!(
            err,
            SyncError::Tree(TreeError::DetailNotLoaded { lesson }) if lesson == lesson_id
        ));
        assert_eq!(store.calls().len(), calls_before);

        session.load_lesson_detail(&lesson_id).await.unwrap();
        assert_eq!(session.save_module(&module_id).await.unwrap(), module_id);
    }
}
