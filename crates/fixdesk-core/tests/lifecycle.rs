//! End-to-end behaviour of the tracker through the public API

use fixdesk_core::store::{JsonlStore, MemoryStore, SqliteStore};
use fixdesk_core::{
    Error, IssueId, Location, NewIssue, Profile, ProfileBook, RecordStore, Status, StorageBackend,
    Tracker, Transition, Visibility, Workspace,
};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

fn profiles() -> ProfileBook {
    let book = ProfileBook::in_memory();
    for (name, room) in [("alice", "11"), ("carol", "12"), ("dave", "13"), ("erin", "14")] {
        let location = Location {
            hostel: Some("Boys Hostel".into()),
            block: Some("B".into()),
            room: Some(room.into()),
        };
        book.upsert(Profile::student(name, location)).unwrap();
    }
    book.upsert(Profile::management("admin")).unwrap();
    book
}

fn tracker_with(store: Box<dyn RecordStore>) -> Tracker {
    Tracker::new(store, Box::new(profiles()))
}

fn tracker() -> Tracker {
    tracker_with(Box::new(MemoryStore::new()))
}

fn report(tracker: &Tracker, reporter: &str, visibility: Visibility, text: &str) -> IssueId {
    tracker
        .report(NewIssue {
            reporter: reporter.into(),
            category: "Plumbing".into(),
            priority: "High".into(),
            description: text.into(),
            visibility: Some(visibility),
            image_path: None,
        })
        .unwrap()
        .id
}

#[test]
fn assign_then_resolve_keeps_assignee() {
    let tracker = tracker();
    let id = report(&tracker, "alice", Visibility::Public, "Tap leaking");
    assert_eq!(id, IssueId(1));

    let assigned = tracker
        .transition(id, Transition::to(Status::Assigned).assign("bob"), Some("admin"))
        .unwrap();
    assert_eq!(assigned.status, Status::Assigned);
    assert_eq!(assigned.assignee.as_deref(), Some("bob"));
    assert!(assigned.assigned_at.is_some());
    assert!(assigned.updated_at >= assigned.created_at);

    let resolved = tracker
        .transition(id, Transition::to(Status::Resolved), Some("admin"))
        .unwrap();
    assert_eq!(resolved.status, Status::Resolved);
    assert!(resolved.resolved_at.is_some());
    assert_eq!(resolved.assignee.as_deref(), Some("bob"));
    assert_eq!(resolved.assigned_at, assigned.assigned_at);
}

#[test]
fn resolving_twice_keeps_first_timestamp() {
    let tracker = tracker();
    let id = report(&tracker, "alice", Visibility::Public, "Broken window");

    let first = tracker
        .transition(id, Transition::to(Status::Resolved), None)
        .unwrap();
    sleep(Duration::from_millis(1100));
    let second = tracker
        .transition(id, Transition::to(Status::Resolved), None)
        .unwrap();

    assert_eq!(first.resolved_at, second.resolved_at);
    assert!(second.updated_at > first.updated_at);
}

#[test]
fn transition_unknown_issue_is_not_found() {
    let tracker = tracker();
    let err = tracker
        .transition(IssueId(999), Transition::to(Status::Resolved), None)
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(IssueId(999))));
    assert_eq!(err.to_string(), "Issue not found: #999");
}

#[test]
fn merge_marks_child_and_leaves_parent() {
    let tracker = tracker();
    report(&tracker, "alice", Visibility::Public, "Unrelated");
    let parent = report(&tracker, "carol", Visibility::Public, "Leak near stairs");
    let child = report(&tracker, "dave", Visibility::Public, "Water on the stairs");
    assert_eq!((parent, child), (IssueId(2), IssueId(3)));

    let parent_before = tracker.get(parent).unwrap();
    let merged = tracker.merge(parent, child, Some("admin")).unwrap();

    assert_eq!(merged.status, Status::Duplicate);
    assert_eq!(merged.parent_id, Some(parent));
    assert_eq!(merged.remarks.as_deref(), Some("Merged into Issue #2"));
    assert_eq!(tracker.get(parent).unwrap(), parent_before);
    assert_eq!(tracker.duplicates_of(parent).unwrap(), vec!["dave"]);
}

#[test]
fn self_merge_is_invalid() {
    let tracker = tracker();
    let id = report(&tracker, "alice", Visibility::Public, "Flickering light");
    let err = tracker.merge(id, id, None).unwrap_err();
    assert!(matches!(err, Error::InvalidOperation(_)));
    assert_eq!(tracker.get(id).unwrap().status, Status::Reported);
}

#[test]
fn duplicates_lists_exactly_merged_reporters() {
    let tracker = tracker();
    let parent = report(&tracker, "alice", Visibility::Public, "No water");
    let a = report(&tracker, "carol", Visibility::Public, "No water in B");
    let b = report(&tracker, "dave", Visibility::Private, "Dry taps");
    report(&tracker, "erin", Visibility::Public, "Something else");

    assert!(tracker.duplicates_of(parent).unwrap().is_empty());
    tracker.merge(parent, a, None).unwrap();
    tracker.merge(parent, b, None).unwrap();
    assert_eq!(tracker.duplicates_of(parent).unwrap(), vec!["carol", "dave"]);
    assert!(tracker.duplicates_of(IssueId(404)).unwrap().is_empty());
}

#[test]
fn visibility_filter() {
    let tracker = tracker();
    let public_alice = report(&tracker, "alice", Visibility::Public, "A");
    let private_alice = report(&tracker, "alice", Visibility::Private, "B");
    let private_carol = report(&tracker, "carol", Visibility::Private, "C");
    let public_dave = report(&tracker, "dave", Visibility::Public, "D");

    let seen: Vec<IssueId> = tracker
        .visible_to("alice")
        .unwrap()
        .iter()
        .map(|i| i.id)
        .collect();
    assert!(seen.contains(&public_alice));
    assert!(seen.contains(&private_alice));
    assert!(seen.contains(&public_dave));
    assert!(!seen.contains(&private_carol));
    // newest first
    assert_eq!(seen.first(), Some(&public_dave));
}

#[test]
fn location_is_a_snapshot() {
    let book = Arc::new(profiles());
    let tracker = Tracker::new(Box::new(MemoryStore::new()), Box::new(Arc::clone(&book)));
    let id = report(&tracker, "alice", Visibility::Public, "Heater broken");

    // alice moves rooms after reporting
    let moved = Location {
        hostel: Some("Boys Hostel".into()),
        block: Some("D".into()),
        room: Some("40".into()),
    };
    book.upsert(Profile::student("alice", moved)).unwrap();

    assert_eq!(tracker.get(id).unwrap().location.room.as_deref(), Some("11"));
    let later = report(&tracker, "alice", Visibility::Public, "Heater still broken");
    assert_eq!(tracker.get(later).unwrap().location.room.as_deref(), Some("40"));
}

#[test]
fn persisted_backends_survive_reopen() {
    for backend in [StorageBackend::Jsonl, StorageBackend::Sqlite] {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::init(dir.path(), backend).unwrap();
        let book = workspace.profiles().unwrap();
        book.upsert(Profile::student("carol", Location::default()))
            .unwrap();
        book.upsert(Profile::student("dave", Location::default()))
            .unwrap();
        book.upsert(Profile::management("admin")).unwrap();

        {
            let tracker = Tracker::open(&workspace).unwrap();
            let parent = report(&tracker, "carol", Visibility::Public, "Leak");
            let child = report(&tracker, "dave", Visibility::Public, "Leak again");
            tracker.merge(parent, child, Some("admin")).unwrap();
            tracker.close().unwrap();
        }

        let tracker = Tracker::open(&workspace).unwrap();
        assert_eq!(tracker.get(IssueId(2)).unwrap().status, Status::Duplicate);
        assert_eq!(tracker.duplicates_of(IssueId(1)).unwrap(), vec!["dave"]);
        assert_eq!(tracker.history(IssueId(2)).unwrap().len(), 1);
    }
}

#[test]
fn backends_share_semantics() {
    let dir = tempfile::tempdir().unwrap();
    let stores: Vec<Box<dyn RecordStore>> = vec![
        Box::new(JsonlStore::open(dir.path()).unwrap()),
        Box::new(SqliteStore::in_memory().unwrap()),
    ];
    for store in stores {
        let tracker = tracker_with(store);
        let id = report(&tracker, "alice", Visibility::Private, "Mold in bathroom");
        tracker
            .transition(id, Transition::to(Status::InProgress).assign("maintenance"), None)
            .unwrap();
        let issue = tracker.get(id).unwrap();
        assert!(issue.in_progress_at.is_some());
        assert!(issue.assigned_at.is_none());
        assert!(tracker.visible_to("carol").unwrap().is_empty());
    }
}

/// Opposite merges race each other while other threads move a third issue
/// back and forth between Resolved and Closed.
fn concurrent_merges_and_transitions(tracker: &Tracker) {
    let a = report(tracker, "alice", Visibility::Public, "Broken window");
    let b = report(tracker, "carol", Visibility::Public, "Window broken");
    let target = report(tracker, "dave", Visibility::Public, "No power");
    let resolved_at = tracker
        .transition(target, Transition::to(Status::Resolved), Some("admin"))
        .unwrap()
        .resolved_at;

    let (into_a, into_b) = std::thread::scope(|s| {
        let into_a = s.spawn(|| tracker.merge(a, b, Some("admin")));
        let into_b = s.spawn(|| tracker.merge(b, a, Some("admin")));
        for n in 0..4 {
            let status = if n % 2 == 0 { Status::Closed } else { Status::Resolved };
            s.spawn(move || {
                tracker
                    .transition(target, Transition::to(status), Some("admin"))
                    .unwrap();
            });
        }
        (into_a.join().unwrap(), into_b.join().unwrap())
    });

    let outcomes = [&into_a, &into_b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        outcomes
            .iter()
            .any(|r| matches!(r, Err(Error::InvalidOperation(_))))
    );

    let links = tracker.check_links().unwrap();
    assert!(links.cycles.is_empty());
    assert!(links.is_clean());

    let target = tracker.get(target).unwrap();
    assert_eq!(target.resolved_at, resolved_at);
    assert!(target.closed_at.is_some());
    assert_eq!(tracker.history(target.id).unwrap().len(), 5);
}

#[test]
fn concurrent_merges_never_cycle() {
    concurrent_merges_and_transitions(&tracker());

    let sqlite = tracker_with(Box::new(SqliteStore::in_memory().unwrap()));
    concurrent_merges_and_transitions(&sqlite);

    let dir = tempfile::tempdir().unwrap();
    let jsonl = tracker_with(Box::new(JsonlStore::open(dir.path()).unwrap()));
    concurrent_merges_and_transitions(&jsonl);
}
