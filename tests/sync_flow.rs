//! End-to-end sync flows against an in-memory document service.
//!
//! The controller, bridge and registry run for real; only the worker is
//! replaced by `FakeDocs`, which answers every request immediately.

mod common;

use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;

use gdocs_sync::config::Config;
use gdocs_sync::models::{DocumentId, RevisionToken, SyncStatus};
use gdocs_sync::sync::{NotifyLevel, SurfaceId, SyncController, SyncError, SyncOutcome};

use common::{FakeDocs, RecordingHost};

const INTERVAL: Duration = Duration::from_secs(30);

fn setup() -> (SyncController<RecordingHost>, Arc<FakeDocs>) {
    let docs = Arc::new(
        FakeDocs::default()
            .with_doc("doc1", "Meeting notes", "# Notes\n\n- one")
            .with_doc("doc2", "Plan", "plan body"),
    );
    let config = Config {
        sync_interval: INTERVAL,
        ..Config::default()
    };
    let controller = SyncController::new(docs.clone(), RecordingHost::default(), config);
    (controller, docs)
}

fn open(controller: &mut SyncController<RecordingHost>, id: &str) -> SurfaceId {
    controller.open_document(DocumentId::new(id));
    match controller.poll_events().as_slice() {
        [SyncOutcome::Opened { surface, .. }] => *surface,
        other => panic!("Expected Opened, got {:?}", other),
    }
}

fn remote_changed(controller: &mut SyncController<RecordingHost>, surface: SurfaceId) -> bool {
    let (tx, rx) = mpsc::channel();
    controller.check_remote_changes(surface, move |changed| {
        let _ = tx.send(changed);
    });
    controller.poll_events();
    rx.recv_timeout(Duration::from_secs(1))
        .expect("remote check answered")
}

#[test]
fn test_edit_push_round_trip() {
    let (mut controller, docs) = setup();
    let surface = open(&mut controller, "doc1");

    assert_eq!(controller.host().buffer(surface).content, "# Notes\n\n- one");
    assert_eq!(controller.host().buffer(surface).title, "Meeting notes");
    assert_eq!(controller.handle(surface).unwrap().revision, RevisionToken::new("r1"));

    controller.host_mut().type_text(surface, "# Notes\n\n- one\n- two");
    assert!(controller.on_local_edit(surface));
    assert!(controller.host().buffer(surface).modified);

    controller.push(surface).unwrap();
    let outcomes = controller.poll_events();

    assert!(matches!(outcomes.as_slice(), [SyncOutcome::Pushed { .. }]));
    assert_eq!(docs.doc("doc1").content, "# Notes\n\n- one\n- two");

    let state = controller.state(surface).unwrap();
    assert!(!state.dirty);
    assert!(!state.in_flight);
    assert_eq!(state.status, SyncStatus::Synced);
    assert!(!controller.host().buffer(surface).modified);

    // Our own push moved the remote revision and the refresh picked it up.
    assert_eq!(controller.handle(surface).unwrap().revision, RevisionToken::new("r2"));
    assert!(!remote_changed(&mut controller, surface));
    assert!(controller
        .host()
        .has_note(NotifyLevel::Info, "Pushed 'Meeting notes'"));
}

#[test]
fn test_remote_edit_detected_then_pulled() {
    let (mut controller, docs) = setup();
    let surface = open(&mut controller, "doc1");

    docs.edit_remotely("doc1", "changed elsewhere");
    assert!(remote_changed(&mut controller, surface));

    controller.pull(surface).unwrap();
    let outcomes = controller.poll_events();

    assert!(matches!(outcomes.as_slice(), [SyncOutcome::Pulled { .. }]));
    assert_eq!(controller.host().buffer(surface).content, "changed elsewhere");
    assert_eq!(controller.handle(surface).unwrap().revision, RevisionToken::new("r2"));
    assert!(!remote_changed(&mut controller, surface));
}

#[test]
fn test_pull_discards_local_edits() {
    let (mut controller, docs) = setup();
    let surface = open(&mut controller, "doc2");

    controller.host_mut().type_text(surface, "local draft");
    controller.on_local_edit(surface);

    controller.pull(surface).unwrap();
    controller.poll_events();

    assert_eq!(controller.host().buffer(surface).content, "plan body");
    assert!(!controller.state(surface).unwrap().dirty);
    assert_eq!(docs.calls("update"), 0);
}

#[test]
fn test_activation_warns_about_remote_change() {
    let (mut controller, docs) = setup();
    let surface = open(&mut controller, "doc1");
    controller.deactivate(surface);

    docs.edit_remotely("doc1", "newer");
    controller.activate(surface);
    let outcomes = controller.poll_events();

    assert!(matches!(
        outcomes.as_slice(),
        [SyncOutcome::RemoteChanged { surface: s }] if *s == surface
    ));
    assert!(controller
        .host()
        .has_note(NotifyLevel::Warn, "changed remotely"));
    // Local content is left alone until the user pulls.
    assert_eq!(controller.host().buffer(surface).content, "# Notes\n\n- one");
}

#[test]
fn test_auto_sync_pushes_only_dirty_surfaces() {
    let (mut controller, docs) = setup();
    let first = open(&mut controller, "doc1");
    let second = open(&mut controller, "doc2");
    let start = Instant::now();

    controller.host_mut().type_text(first, "auto-saved");
    controller.on_local_edit(first);

    assert_eq!(controller.tick_at(start + INTERVAL + Duration::from_secs(1)), 1);
    controller.poll_events();

    assert_eq!(docs.doc("doc1").content, "auto-saved");
    assert_eq!(docs.doc("doc2").content, "plan body");
    assert_eq!(docs.calls("update"), 1);
    assert!(!controller.state(first).unwrap().dirty);
    assert!(!controller.state(second).unwrap().dirty);
    // Auto pushes are silent.
    assert!(!controller.host().has_note(NotifyLevel::Info, "Pushed"));

    // Nothing left to push on the next round.
    assert_eq!(controller.tick_at(start + 2 * INTERVAL + Duration::from_secs(2)), 0);
    assert_eq!(docs.calls("update"), 1);
}

#[test]
fn test_rejected_push_keeps_edits() {
    let (mut controller, docs) = setup();
    let surface = open(&mut controller, "doc1");
    docs.fail_updates("Quota exceeded");

    controller.host_mut().type_text(surface, "unsaved");
    controller.on_local_edit(surface);
    controller.push(surface).unwrap();
    let outcomes = controller.poll_events();

    assert!(matches!(
        outcomes.as_slice(),
        [SyncOutcome::Failed { surface: Some(_), .. }]
    ));
    let state = controller.state(surface).unwrap();
    assert!(state.dirty);
    assert_eq!(state.status, SyncStatus::Error);
    assert_eq!(controller.host().buffer(surface).status, Some(SyncStatus::Error));
    assert!(controller
        .host()
        .has_note(NotifyLevel::Error, "Push failed: Quota exceeded"));
    assert_eq!(docs.doc("doc1").content, "# Notes\n\n- one");
}

#[test]
fn test_create_opens_new_document_and_lists_it() {
    let (mut controller, _docs) = setup();

    controller.create_document("  Fresh doc ").unwrap();
    let outcomes = controller.poll_events();
    let surface = match outcomes.as_slice() {
        [SyncOutcome::Opened { surface, doc_id, reused: false }] => {
            assert_eq!(doc_id.as_str(), "new1");
            *surface
        }
        other => panic!("Expected Opened, got {:?}", other),
    };
    assert_eq!(controller.host().buffer(surface).title, "Fresh doc");

    controller.list_documents();
    match controller.poll_events().as_slice() {
        [SyncOutcome::Listed(docs)] => {
            let names: Vec<&str> = docs.iter().map(|d| d.name.as_str()).collect();
            assert_eq!(names, vec!["Meeting notes", "Plan", "Fresh doc"]);
        }
        other => panic!("Expected Listed, got {:?}", other),
    }
}

#[test]
fn test_reopening_focuses_existing_surface() {
    let (mut controller, docs) = setup();
    let first = open(&mut controller, "doc1");
    let _second = open(&mut controller, "doc2");

    let again = open(&mut controller, "doc1");

    assert_eq!(again, first);
    assert_eq!(controller.host().focused, Some(first));
    assert_eq!(controller.registry().len(), 2);
    assert_eq!(docs.calls("get"), 2);
}

#[test]
fn test_closed_surface_is_unbound() {
    let (mut controller, docs) = setup();
    let surface = open(&mut controller, "doc1");

    controller.host_mut().type_text(surface, "draft");
    controller.on_local_edit(surface);
    let handle = controller.close(surface).unwrap();

    assert_eq!(handle.doc_id, DocumentId::new("doc1"));
    assert!(controller
        .host()
        .has_note(NotifyLevel::Warn, "unpushed changes"));
    assert!(matches!(controller.push(surface), Err(SyncError::NotBound)));
    assert!(matches!(controller.pull(surface), Err(SyncError::NotBound)));
    assert!(!remote_changed(&mut controller, surface));
    assert_eq!(docs.calls("update"), 0);
}

#[test]
fn test_push_then_pull_is_idempotent() {
    let (mut controller, docs) = setup();
    let surface = open(&mut controller, "doc1");
    let text = "# Notes\n\n- one\n- two\n";

    controller.host_mut().type_text(surface, text);
    controller.on_local_edit(surface);
    controller.push(surface).unwrap();
    controller.poll_events();

    controller.pull(surface).unwrap();
    let outcomes = controller.poll_events();

    assert!(matches!(outcomes.as_slice(), [SyncOutcome::Pulled { .. }]));
    assert_eq!(controller.host().buffer(surface).content, text);
    assert_eq!(docs.doc("doc1").content, text);
    let state = controller.state(surface).unwrap();
    assert!(!state.dirty);
    assert_eq!(state.status, SyncStatus::Synced);
    assert_eq!(controller.host().buffer(surface).status, Some(SyncStatus::Synced));
    assert!(!controller.host().buffer(surface).modified);
}
