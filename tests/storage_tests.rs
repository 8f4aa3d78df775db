use std::fs;
use std::sync::Arc;
use std::thread;

use aptrack::clock::FixedClock;
use aptrack::error::PersistError;
use aptrack::models::{SubjectBuilder, TaskBuilder};
use aptrack::registry::Registry;
use aptrack::snapshot::Snapshot;
use aptrack::state::StateName;
use aptrack::storage::{escape, shared_store, unescape, SnapshotStore, VERSION_TAG};
use chrono::{TimeZone, Utc};
use rstest::rstest;

const LEGACY_FILE: &str = "AcademicProgressTracker_SaveFile_v1
1
2024-05-01_10-30-00
legacy save
1
Physics
PH100

1
Lab Report
2
Lab Report
Measured g
1714557600
0
0
55.5
In Progress
PH100
Loose End

1714557600
1
70
100
Completed

";

fn one_snapshot() -> SnapshotStore {
    let mut registry = Registry::new();
    registry
        .add_subject(SubjectBuilder::new("Statistics", "ST210").build().unwrap())
        .unwrap();
    let due = Utc.with_ymd_and_hms(2025, 4, 1, 12, 0, 0).unwrap();
    let id = registry.insert(TaskBuilder::new("Survey", due).build().unwrap());
    registry.assign("ST210", id).unwrap();

    let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 3, 20, 8, 0, 0).unwrap());
    let mut store = SnapshotStore::new();
    store.push(Snapshot::capture(&registry, "baseline", &clock));
    store
}

#[test]
fn test_empty_store_encoding() {
    assert_eq!(
        SnapshotStore::new().encode(),
        format!("{VERSION_TAG}\n0\n")
    );
    let mut store = one_snapshot();
    store.decode(&format!("{VERSION_TAG}\n0\n")).unwrap();
    assert!(store.is_empty());
}

#[test]
fn test_legacy_file_is_readable() {
    let mut store = SnapshotStore::new();
    store.decode(LEGACY_FILE).unwrap();
    let snapshot = store.latest().unwrap();

    assert_eq!(
        snapshot.timestamp(),
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap()
    );
    assert_eq!(snapshot.description(), "legacy save");
    assert_eq!(snapshot.subjects()[0].description, "");

    let report = &snapshot.tasks()[0];
    assert_eq!(report.progress, 55.5);
    assert_eq!(report.state, StateName::InProgress);
    assert_eq!(report.subject_code.as_deref(), Some("PH100"));

    let loose = &snapshot.tasks()[1];
    assert!(loose.completed);
    assert_eq!(loose.subject_code, None);

    let registry = snapshot.rebuild();
    assert!(registry.find_task("PH100", "Lab Report").is_some());
    let detached = registry
        .tasks()
        .find(|(_, task)| task.title() == "Loose End")
        .map(|(_, task)| task)
        .unwrap();
    assert_eq!(detached.subject(), None);
    assert_eq!(detached.marks(), 70);
}

#[test]
fn test_bad_version_leaves_history_intact() {
    let mut store = one_snapshot();
    let before = store.get(0).cloned();

    let err = store
        .decode("AcademicProgressTracker_SaveFile_v2\n0\n")
        .unwrap_err();
    assert!(matches!(err, PersistError::BadVersion(ref v) if v.ends_with("v2")));
    assert_eq!(store.len(), 1);
    assert_eq!(store.get(0).cloned(), before);
}

#[test]
fn test_failed_file_load_leaves_history_intact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.save");
    fs::write(&path, "not a save file\n").unwrap();

    let mut store = one_snapshot();
    assert!(matches!(
        store.load_from(&path).unwrap_err(),
        PersistError::BadVersion(_)
    ));
    assert_eq!(store.latest().unwrap().description(), "baseline");
}

#[test]
fn test_missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = SnapshotStore::open(&dir.path().join("absent.save")).unwrap_err();
    assert!(matches!(err, PersistError::Io(_)));
}

#[test]
fn test_truncated_file() {
    let text = one_snapshot().encode();
    let cut: Vec<&str> = text.lines().take(12).collect();
    let mut store = SnapshotStore::new();
    assert!(matches!(
        store.decode(&cut.join("\n")).unwrap_err(),
        PersistError::UnexpectedEof { .. }
    ));
    assert!(store.is_empty());
}

#[test]
fn test_unknown_state_name() {
    let text = one_snapshot().encode().replace("Not Started", "Paused");
    let err = SnapshotStore::new().decode(&text).unwrap_err();
    match err {
        PersistError::UnknownState { source, .. } => assert_eq!(source.0, "Paused"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_completed_flag_must_match_state() {
    let text = LEGACY_FILE.replacen("1714557600\n0\n0\n55.5", "1714557600\n1\n0\n55.5", 1);
    assert!(matches!(
        SnapshotStore::new().decode(&text).unwrap_err(),
        PersistError::Malformed { .. }
    ));
}

#[test]
fn test_trailing_data_is_rejected() {
    let mut text = one_snapshot().encode();
    text.push_str("\n\nleftover\n");
    let err = SnapshotStore::new().decode(&text).unwrap_err();
    match err {
        PersistError::Malformed { reason, .. } => assert!(reason.contains("trailing")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_bad_number_reports_line() {
    let text = format!("{VERSION_TAG}\nmany\n");
    match SnapshotStore::new().decode(&text).unwrap_err() {
        PersistError::Malformed { line, .. } => assert_eq!(line, 2),
        other => panic!("unexpected error: {other}"),
    }
}

#[rstest]
#[case("plain", "plain")]
#[case("two\nlines", "two\\nlines")]
#[case("C:\\temp", "C:\\\\temp")]
#[case("crlf\r\n", "crlf\\r\\n")]
#[case("", "")]
fn test_escaping(#[case] raw: &str, #[case] escaped: &str) {
    assert_eq!(escape(raw), escaped);
    assert_eq!(unescape(escaped).as_deref(), Some(raw));
}

#[rstest]
#[case("dangling\\")]
#[case("unknown\\t")]
fn test_bad_escapes(#[case] field: &str) {
    assert_eq!(unescape(field), None);
}

#[test]
fn test_shared_store_accepts_concurrent_pushes() {
    let snapshot = Arc::new(one_snapshot().latest().cloned().unwrap());
    let before = shared_store().lock().unwrap().len();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let snapshot = Arc::clone(&snapshot);
            thread::spawn(move || {
                for _ in 0..5 {
                    shared_store().lock().unwrap().push((*snapshot).clone());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(shared_store().lock().unwrap().len() >= before + 20);
}

#[test]
fn test_crlf_header_is_not_the_version_tag() {
    let mut store = one_snapshot();
    let err = store
        .decode("AcademicProgressTracker_SaveFile_v1\r\n0\r\n")
        .unwrap_err();
    assert!(matches!(err, PersistError::BadVersion(ref v) if v.ends_with('\r')));
    assert_eq!(store.len(), 1);
}

#[rstest]
#[case(Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap())]
#[case(Utc.with_ymd_and_hms(12345, 6, 7, 8, 9, 10).unwrap() + chrono::Duration::milliseconds(250))]
fn test_far_future_timestamp_reloads(#[case] at: chrono::DateTime<Utc>) {
    let mut store = SnapshotStore::new();
    store.push(Snapshot::capture(&Registry::new(), "far future", &FixedClock::new(at)));
    let text = store.encode();
    assert!(text.contains("\n+1"), "{text}");

    let mut loaded = SnapshotStore::new();
    loaded.decode(&text).unwrap();
    assert_eq!(loaded.latest().unwrap().timestamp(), at);
}
