//! # aptrack
//!
//! Tracks academic work: tasks grouped under subjects, each moving through a
//! small lifecycle, optionally nested under composite tasks whose status is
//! rolled up from their children. The whole tracked state can be captured as
//! a snapshot, kept in an ordered history, and saved to or loaded from a
//! versioned text file.
//!
//! ## Lifecycle
//!
//! | From        | `start`     | `make_progress(p)` | `complete(m)` | `check_deadline(now)`  |
//! |-------------|-------------|--------------------|---------------|------------------------|
//! | Not Started | In Progress | In Progress(p)     | Completed(m)  | Overdue if `now > due` |
//! | In Progress | no-op       | In Progress(p)     | Completed(m)  | Overdue if `now > due` |
//! | Completed   | refused     | refused            | marks updated | no-op                  |
//! | Overdue     | In Progress | In Progress(p)     | Completed(m)  | no-op                  |
//!
//! Progress is clamped to `0..=100`; reaching 100 completes the task with
//! the marks it currently holds.
//!
//! A completed task goes back with `reopen` or `reset` (to Not Started), or
//! with `resume` (to In Progress). Refused operations return a
//! [`error::TransitionError`] and leave the task untouched.
//!
//! ## Example
//!
//! ```
//! use aptrack::clock::FixedClock;
//! use aptrack::models::{SubjectBuilder, TaskBuilder, TaskKind};
//! use aptrack::registry::Registry;
//! use aptrack::snapshot::Snapshot;
//! use aptrack::storage::SnapshotStore;
//! use chrono::{TimeZone, Utc};
//!
//! let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap());
//! let due = Utc.with_ymd_and_hms(2025, 3, 14, 17, 0, 0).unwrap();
//!
//! let mut registry = Registry::new();
//! registry.add_subject(SubjectBuilder::new("Algorithms", "CS201").build().unwrap()).unwrap();
//! let lab = registry.insert(TaskBuilder::new("Lab 1", due).kind(TaskKind::Lab).build().unwrap());
//! registry.assign("CS201", lab).unwrap();
//! registry.task_mut(lab).unwrap().complete(18).unwrap();
//!
//! let mut store = SnapshotStore::new();
//! store.push(Snapshot::capture(&registry, "after lab 1", &clock));
//! let text = store.encode();
//! assert!(text.starts_with("AcademicProgressTracker_SaveFile_v1"));
//! ```
//!
//! ## Data Storage
//!
//! The CLI reads and writes one save file:
//! *   Linux: `~/.local/share/aptrack/progress.save`
//! *   macOS: `~/Library/Application Support/aptrack/progress.save`
//! *   Windows: `%APPDATA%\aptrack\progress.save`
//!
//! You can override this by setting the `APTRACK_SAVE` environment variable
//! or passing `--file`.

pub mod clock;
pub mod commands;
pub mod composite;
pub mod error;
pub mod models;
pub mod registry;
pub mod snapshot;
pub mod state;
pub mod storage;
