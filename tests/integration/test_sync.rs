//! End-to-end sync tests.
//!
//! Each test starts an in-process course backend on an ephemeral port and
//! drives an `EditSession` against it through the real HTTP adapter.

mod mock_backend;

use std::time::Duration;

use mock_backend::{MockBackend, Shape};
use syllabus_client::{
    EditSession, EventBroadcaster, FailureKind, HttpStore, RemoteFailure, SyncError, SyncEvent,
    SyncStatus,
};
use syllabus_tree::{
    ContainerKey, ContentType, CourseTree, EntityId, LessonPatch, Module, ModuleDeepPayload,
    NewContent,
};
use uuid::Uuid;

const SHAPES: [Shape; 3] = [Shape::SuccessFlag, Shape::StatusCode, Shape::Bare];

/// Seeds the standard three-module course and opens a session on it.
async fn open(backend: &MockBackend) -> (EditSession<HttpStore>, Uuid) {
    let course = backend.store.seed_course(
        "Rust 101",
        &[
            ("Getting Started", &["Install", "Hello World"]),
            ("Ownership", &["Moves", "Borrowing", "Lifetimes"]),
            ("Traits", &[]),
        ],
    );
    let session = EditSession::load(backend.http_store(None), course.id, EventBroadcaster::new(64))
        .await
        .expect("Failed to load course");
    (session, course.id)
}

fn module_titles(tree: &CourseTree) -> Vec<String> {
    tree.modules().iter().map(|m| m.title.clone()).collect()
}

fn server_ids(tree: &CourseTree) -> Vec<Uuid> {
    tree.modules()
        .iter()
        .map(|m| m.id.server_id().expect("module should be saved"))
        .collect()
}

/// The deep payload of a module with every id removed.
fn without_ids(module: &Module) -> ModuleDeepPayload {
    ModuleDeepPayload::from_module(module).without_ids()
}

/// Tests that a course loads through every envelope shape.
#[tokio::test]
async fn test_load_course_through_every_envelope() {
    for shape in SHAPES {
        let backend = MockBackend::spawn(shape).await;
        let (session, course_id) = open(&backend).await;
        let tree = session.tree().await;

        assert_eq!(tree.course().title, "Rust 101", "shape {shape:?}");
        assert_eq!(
            module_titles(&tree),
            vec!["Getting Started", "Ownership", "Traits"]
        );
        assert_eq!(tree.modules()[1].lessons.len(), 3);
        assert_eq!(server_ids(&tree), backend.store.module_ids(course_id));
        tree.check_invariants().expect("loaded tree should be dense");
    }
}

/// Tests that moving the last module first sends all three shifted positions.
#[tokio::test]
async fn test_move_module_syncs_shifted_siblings() {
    let backend = MockBackend::spawn(Shape::SuccessFlag).await;
    let (session, course_id) = open(&backend).await;
    let traits = session.tree().await.modules()[2].id;

    session.move_module(&traits, 1).await.expect("move failed");
    let diff = session.sync_module_order().await.expect("sync failed");

    assert_eq!(diff.items.len(), 3);
    let tree = session.tree().await;
    assert_eq!(
        module_titles(&tree),
        vec!["Traits", "Getting Started", "Ownership"]
    );
    assert_eq!(backend.store.module_ids(course_id), server_ids(&tree));
    assert_eq!(backend.store.module_positions(course_id), vec![1, 2, 3]);

    let again = session.sync_module_order().await.expect("second sync failed");
    assert!(again.is_empty(), "reconcile should be idempotent");
}

/// Tests that a lesson move within a module reaches the backend.
#[tokio::test]
async fn test_move_lesson_syncs_module_lessons() {
    let backend = MockBackend::spawn(Shape::StatusCode).await;
    let (session, course_id) = open(&backend).await;
    let tree = session.tree().await;
    let ownership = tree.modules()[1].id;
    let lifetimes = tree.modules()[1].lessons[2].id;

    session.move_lesson(&lifetimes, 1).await.expect("move failed");
    let diff = session
        .sync_lesson_order(&ownership)
        .await
        .expect("sync failed");

    assert_eq!(diff.items.len(), 3);
    let lessons = backend.store.lesson_ids(course_id);
    assert_eq!(lessons[2], lifetimes.server_id().expect("saved lesson"));
}

/// Tests that a failed bulk position update restores the pre-sync order.
#[tokio::test]
async fn test_failed_sync_rolls_back_through_every_envelope() {
    for shape in SHAPES {
        let backend = MockBackend::spawn(shape).await;
        let (session, course_id) = open(&backend).await;
        let before = session.tree().await;
        let mut events = session.subscribe();

        session
            .move_module(&before.modules()[2].id, 1)
            .await
            .expect("move failed");
        backend
            .store
            .fail_next(RemoteFailure::from_status(500, "database unavailable"));
        let err = session
            .sync_module_order()
            .await
            .expect_err("sync should fail");

        let SyncError::RolledBack { source, .. } = &err else {
            panic!("expected RolledBack, got {err:?}");
        };
        assert!(source.message.contains("database unavailable"), "shape {shape:?}");
        if shape == Shape::SuccessFlag {
            assert_eq!(source.kind, FailureKind::Rejected);
            assert_eq!(source.status, Some(200));
        } else {
            assert_eq!(source.kind, FailureKind::Server);
            assert_eq!(source.status, Some(500));
        }

        assert_eq!(session.tree().await, before);
        assert_eq!(backend.store.module_ids(course_id), server_ids(&before));

        let container = ContainerKey::CourseModules(before.id());
        assert_eq!(session.status(&container).await, SyncStatus::Dirty);
        let mut failed = None;
        while let Ok(event) = events.try_recv() {
            if let SyncEvent::SyncFailed(payload) = event {
                failed = Some(payload);
            }
        }
        let failed = failed.expect("a sync_failed event");
        assert!(failed.rolled_back);
        assert_eq!(failed.container, container);
    }
}

/// Tests that a saved module re-fetches equal to what was sent, ids aside.
#[tokio::test]
async fn test_deep_upsert_round_trip() {
    let backend = MockBackend::spawn(Shape::StatusCode).await;
    let (session, course_id) = open(&backend).await;

    let module_id = session
        .insert_module(Some(1), "Error Handling")
        .await
        .expect("insert failed");
    let lesson_id = session
        .insert_lesson(&module_id, None, "Result and ?")
        .await
        .expect("insert failed");
    session
        .edit_module(&module_id, |tree| {
            tree.update_lesson(
                &lesson_id,
                LessonPatch {
                    duration: Some("12m".to_string()),
                    video_url: Some("https://videos.example.com/result.mp4".to_string()),
                    is_free: Some(true),
                    ..LessonPatch::default()
                },
            )?;
            tree.insert_content(
                &lesson_id,
                None,
                NewContent {
                    title: "Slides".to_string(),
                    content_type: ContentType::Pdf,
                    url: "https://files.example.com/result.pdf".to_string(),
                    size: Some(2048),
                    filename: Some("result.pdf".to_string()),
                },
            )?;
            let question = tree.insert_question(&lesson_id, None, "What does ? do on Err?")?;
            tree.insert_option(&lesson_id, &question, None, "Panics")?;
            tree.enable_assignment(&lesson_id, "Convert unwraps to ?")?;
            Ok(())
        })
        .await
        .expect("edit failed");
    let local = session
        .tree()
        .await
        .module(&module_id)
        .expect("local module")
        .clone();

    let server_id = session.save_module(&module_id).await.expect("save failed");
    assert!(!server_id.is_local());
    let merged = session.tree().await.module(&server_id).expect("merged").clone();
    assert_eq!(merged.position, 2);
    assert_eq!(without_ids(&merged), without_ids(&local));

    let module_order = session.sync_module_order().await.expect("module sync failed");
    assert!(!module_order.is_empty(), "siblings after the insert shifted");

    let reloaded = EditSession::load(backend.http_store(None), course_id, EventBroadcaster::default())
        .await
        .expect("reload failed")
        .tree()
        .await;
    let fetched = reloaded.module(&server_id).expect("saved module");
    assert_eq!(fetched, &merged);
    assert_eq!(
        module_titles(&reloaded),
        vec!["Getting Started", "Error Handling", "Ownership", "Traits"]
    );
}

/// Tests that an invalid quiz never reaches the backend.
#[tokio::test]
async fn test_validation_blocks_request() {
    let backend = MockBackend::spawn(Shape::Bare).await;
    let (session, _) = open(&backend).await;
    let tree = session.tree().await;
    let module_id = tree.modules()[0].id;
    let lesson_id = tree.modules()[0].lessons[0].id;

    session
        .edit_module(&module_id, |tree| {
            tree.insert_question(&lesson_id, None, "")?;
            tree.update_lesson(
                &lesson_id,
                LessonPatch {
                    duration: Some("soon".to_string()),
                    ..LessonPatch::default()
                },
            )
        })
        .await
        .expect("edit failed");

    let calls = backend.store.calls().len();
    let err = session
        .save_module(&module_id)
        .await
        .expect_err("save should fail");

    assert!(err.is_validation());
    let message = err.to_string();
    assert!(message.contains("lessons[0].questions[0]"), "{message}");
    assert!(message.contains("duration"), "{message}");
    assert_eq!(backend.store.calls().len(), calls);
}

/// Tests that deleting the middle module sends one position update.
#[tokio::test]
async fn test_delete_closes_gap() {
    let backend = MockBackend::spawn(Shape::SuccessFlag).await;
    let (session, course_id) = open(&backend).await;
    let ownership = session.tree().await.modules()[1].id;

    let diff = session.delete_module(&ownership).await.expect("delete failed");

    assert_eq!(diff.items.len(), 1);
    assert_eq!(diff.items[0].position, 2);
    assert_eq!(backend.store.module_positions(course_id), vec![1, 2]);
    assert_eq!(
        module_titles(&session.tree().await),
        vec!["Getting Started", "Traits"]
    );

    let lesson = session.tree().await.modules()[0].lessons[0].id;
    let diff = session.delete_lesson(&lesson).await.expect("delete failed");
    assert_eq!(diff.items.len(), 1);
    assert_eq!(session.tree().await.modules()[0].lessons[0].position, 1);
}

/// Tests that lesson detail combines contents, quiz and a missing assignment.
#[tokio::test]
async fn test_lesson_detail_with_missing_assignment() {
    let backend = MockBackend::spawn(Shape::Bare).await;
    let (session, course_id) = open(&backend).await;
    let lesson_uuid = backend.store.lesson_ids(course_id)[0];
    backend
        .store
        .seed_quiz(lesson_uuid, "Which tool installs Rust?", &["rustup", "npm", "pip"], 0);
    backend
        .store
        .seed_quiz(lesson_uuid, "Which command builds?", &["cargo run", "cargo build"], 1);

    let lesson_id = EntityId::Server(lesson_uuid);
    session
        .load_lesson_detail(&lesson_id)
        .await
        .expect("detail failed");

    let tree = session.tree().await;
    let lesson = tree.lesson(&lesson_id).expect("lesson");
    assert!(lesson.detail_loaded);
    assert_eq!(lesson.questions.len(), 2);
    assert_eq!(lesson.questions[0].options.len(), 3);
    assert!(lesson.questions[1].options[1].is_correct);
    assert!(lesson.assignment.is_none());
}

/// Tests that syncs of different containers run side by side and both land.
#[tokio::test]
async fn test_concurrent_syncs_of_different_containers() {
    let backend = MockBackend::spawn(Shape::StatusCode).await;
    let (session, course_id) = open(&backend).await;
    backend.store.set_delay(Some(Duration::from_millis(20)));
    let tree = session.tree().await;
    let (first, second) = (tree.modules()[0].id, tree.modules()[1].id);

    session
        .move_lesson(&tree.modules()[0].lessons[1].id, 1)
        .await
        .expect("move failed");
    session
        .move_lesson(&tree.modules()[1].lessons[0].id, 3)
        .await
        .expect("move failed");

    let (a, b) = tokio::join!(
        session.sync_lesson_order(&first),
        session.sync_lesson_order(&second)
    );
    assert_eq!(a.expect("first sync").items.len(), 2);
    assert_eq!(b.expect("second sync").items.len(), 3);

    let stored: Vec<EntityId> = backend
        .store
        .lesson_ids(course_id)
        .into_iter()
        .map(EntityId::Server)
        .collect();
    let local: Vec<EntityId> = session
        .tree()
        .await
        .modules()
        .iter()
        .flat_map(|m| m.lessons.iter().map(|l| l.id))
        .collect();
    assert_eq!(stored, local);
}

/// Tests that reorders of one container issued back to back apply in order.
#[tokio::test]
async fn test_back_to_back_reorders_apply_in_order() {
    let backend = MockBackend::spawn(Shape::SuccessFlag).await;
    let (session, course_id) = open(&backend).await;
    backend.store.set_delay(Some(Duration::from_millis(20)));
    let tree = session.tree().await;
    let (start, traits) = (tree.modules()[0].id, tree.modules()[2].id);

    session.move_module(&traits, 1).await.expect("move failed");
    let early = {
        let session = session.clone();
        tokio::spawn(async move { session.sync_module_order().await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    session.move_module(&start, 3).await.expect("move failed");
    session.sync_module_order().await.expect("late sync failed");
    early.await.expect("task panicked").expect("early sync failed");

    let tree = session.tree().await;
    assert_eq!(
        module_titles(&tree),
        vec!["Traits", "Ownership", "Getting Started"]
    );
    assert_eq!(backend.store.module_ids(course_id), server_ids(&tree));
    assert!(session.dirty_containers().await.is_empty());
}

/// Tests that a missing bearer token surfaces as an unauthorized failure.
#[tokio::test]
async fn test_bearer_token_is_sent() {
    let backend = MockBackend::spawn_with_token(Shape::Bare, Some("s3cret")).await;
    let course = backend.store.seed_course("Private", &[("Only", &[])]);

    let err = EditSession::load(backend.http_store(None), course.id, EventBroadcaster::default())
        .await
        .expect_err("load without token should fail");
    assert_eq!(
        err.remote().expect("remote failure").kind,
        FailureKind::Unauthorized
    );

    let session = EditSession::load(
        backend.http_store(Some("s3cret")),
        course.id,
        EventBroadcaster::default(),
    )
    .await
    .expect("load with token failed");
    assert_eq!(module_titles(&session.tree().await), vec!["Only"]);
}

/// Tests that an unknown course maps to a not-found failure with its code.
#[tokio::test]
async fn test_unknown_course_is_not_found() {
    let backend = MockBackend::spawn(Shape::StatusCode).await;
    let err = EditSession::load(backend.http_store(None), Uuid::new_v4(), EventBroadcaster::default())
        .await
        .expect_err("unknown course should fail");

    let failure = err.remote().expect("remote failure");
    assert_eq!(failure.kind, FailureKind::NotFound);
    assert!(failure.message.starts_with("NOT_FOUND: "), "{}", failure.message);
    assert!(!err.is_transient());
}
