use aptrack::clock::FixedClock;
use aptrack::error::{TransitionError, ValidationError};
use aptrack::models::{SubjectBuilder, Task, TaskBuilder, TaskKind};
use aptrack::state::{StateName, TaskState, Transition};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rstest::rstest;

fn due() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, 17, 0, 0).unwrap()
}

fn new_task() -> Task {
    TaskBuilder::new("Essay", due()).build().unwrap()
}

fn assert_consistent(task: &Task) {
    assert_eq!(
        task.is_completed(),
        task.state_name() == StateName::Completed,
        "completion flag out of step with state {:?}",
        task.state()
    );
}

#[test]
fn test_new_task_is_not_started() {
    let task = new_task();
    assert_eq!(task.state(), &TaskState::NotStarted);
    assert!(!task.is_completed());
    assert_eq!(task.marks(), 0);
    assert_eq!(task.progress(), 0.0);
}

#[test]
fn test_builders_reject_empty_fields() {
    assert_eq!(
        TaskBuilder::new("  ", due()).build().unwrap_err(),
        ValidationError::EmptyTitle
    );
    assert_eq!(
        SubjectBuilder::new("", "CS101").build().unwrap_err(),
        ValidationError::EmptySubjectName
    );
    assert_eq!(
        SubjectBuilder::new("Algorithms", " ").build().unwrap_err(),
        ValidationError::EmptySubjectCode
    );
}

#[test]
fn test_start_and_restart() {
    let mut task = new_task();
    assert_eq!(
        task.start().unwrap(),
        Transition::Moved {
            from: StateName::NotStarted,
            to: StateName::InProgress
        }
    );
    assert_eq!(task.state(), &TaskState::InProgress { progress: 0.0 });

    // already running
    assert_eq!(task.start().unwrap(), Transition::Unchanged(StateName::InProgress));
}

#[test]
fn test_start_completed_task_is_refused() {
    let mut task = new_task();
    task.complete(70).unwrap();
    let err = task.start().unwrap_err();
    assert!(matches!(err, TransitionError::AlreadyCompleted { .. }));
    assert_eq!(task.state(), &TaskState::Completed { marks: 70 });
}

#[test]
fn test_progress_from_not_started_keeps_value() {
    let mut task = new_task();
    task.make_progress(40.0).unwrap();
    assert_eq!(task.state(), &TaskState::InProgress { progress: 40.0 });
    assert_eq!(task.progress(), 40.0);
}

#[test]
fn test_progress_is_clamped() {
    let mut task = new_task();
    task.make_progress(-12.0).unwrap();
    assert_eq!(task.state(), &TaskState::InProgress { progress: 0.0 });
}

#[test]
fn test_progress_over_100_matches_100() {
    let mut over = new_task();
    let mut exact = new_task();
    over.start().unwrap();
    exact.start().unwrap();

    let a = over.make_progress(150.0).unwrap();
    let b = exact.make_progress(100.0).unwrap();
    let completed = Transition::Moved {
        from: StateName::InProgress,
        to: StateName::Completed,
    };
    assert_eq!(a, completed);
    assert_eq!(b, completed);
    assert_eq!(over.state(), exact.state());
    assert_eq!(over.progress(), 100.0);

    // one auto-completion only; further progress is refused
    assert!(over.make_progress(150.0).is_err());
    assert_eq!(over.state(), exact.state());
}

#[test]
fn test_auto_completion_uses_pending_marks() {
    let mut task = new_task();
    task.start().unwrap();
    task.set_marks(88);
    task.make_progress(100.0).unwrap();
    assert_eq!(task.state(), &TaskState::Completed { marks: 88 });
    assert_eq!(task.marks(), 88);
}

#[test]
fn test_complete_directly_and_update_marks() {
    let mut task = new_task();
    assert_eq!(
        task.complete(75).unwrap(),
        Transition::Moved {
            from: StateName::NotStarted,
            to: StateName::Completed
        }
    );
    assert_eq!(task.marks(), 75);

    assert_eq!(
        task.complete(75).unwrap_err(),
        TransitionError::SameMarks {
            title: "Essay".into(),
            marks: 75
        }
    );

    assert_eq!(task.complete(80).unwrap(), Transition::Updated(StateName::Completed));
    assert_eq!(task.state(), &TaskState::Completed { marks: 80 });
    assert_eq!(task.marks(), 80);
}

#[test]
fn test_deadline_is_strict() {
    let mut task = new_task();
    assert_eq!(
        task.check_deadline(due()),
        Transition::Unchanged(StateName::NotStarted)
    );

    let later = due() + Duration::nanoseconds(1);
    assert!(task.check_deadline(later).changed());
    assert_eq!(task.state(), &TaskState::Overdue { since: later });

    // idempotent once overdue
    assert_eq!(
        task.check_deadline(later + Duration::days(1)),
        Transition::Unchanged(StateName::Overdue)
    );
}

#[test]
fn test_deadline_check_with_clock() {
    let mut task = new_task();
    task.start().unwrap();
    let mut clock = FixedClock::new(due());
    assert!(!task.check_deadline_with(&clock).changed());
    clock.advance(Duration::seconds(1));
    assert!(task.check_deadline_with(&clock).changed());
    assert_eq!(task.state_name(), StateName::Overdue);
}

#[test]
fn test_completed_task_ignores_deadline() {
    let mut task = new_task();
    task.complete(90).unwrap();
    task.check_deadline(due() + Duration::days(30));
    assert_eq!(task.state(), &TaskState::Completed { marks: 90 });
}

#[test]
fn test_overdue_task_can_be_restarted_or_completed() {
    let late = due() + Duration::hours(2);

    let mut restarted = new_task();
    restarted.check_deadline(late);
    restarted.start().unwrap();
    assert_eq!(restarted.state(), &TaskState::InProgress { progress: 0.0 });

    let mut progressed = new_task();
    progressed.check_deadline(late);
    progressed.make_progress(30.0).unwrap();
    assert_eq!(progressed.state(), &TaskState::InProgress { progress: 30.0 });

    let mut finished = new_task();
    finished.check_deadline(late);
    finished.complete(55).unwrap();
    assert_eq!(finished.state(), &TaskState::Completed { marks: 55 });
}

#[test]
fn test_reopen_and_resume() {
    let mut task = new_task();
    task.complete(60).unwrap();
    task.reopen().unwrap();
    assert_eq!(task.state(), &TaskState::NotStarted);
    assert_eq!(task.marks(), 0);

    task.complete(60).unwrap();
    task.resume().unwrap();
    assert_eq!(task.state(), &TaskState::InProgress { progress: 0.0 });
    assert_eq!(task.marks(), 0);

    assert!(matches!(
        task.reopen().unwrap_err(),
        TransitionError::NotCompleted { .. }
    ));

    task.complete(45).unwrap();
    assert_eq!(
        task.reset().unwrap(),
        Transition::Moved {
            from: StateName::Completed,
            to: StateName::NotStarted
        }
    );
}

#[test]
fn test_set_completed_keeps_state_in_step() {
    let mut task = new_task();
    task.set_marks(64);
    task.set_completed(true);
    assert_eq!(task.state(), &TaskState::Completed { marks: 64 });

    task.set_marks(70);
    assert_eq!(task.state(), &TaskState::Completed { marks: 70 });

    task.set_completed(false);
    assert_eq!(task.state(), &TaskState::NotStarted);
    assert!(!task.is_completed());
}

#[test]
fn test_completion_flag_tracks_state_through_a_lifecycle() {
    let mut task = new_task();
    let late = due() + Duration::minutes(5);

    let _ = task.make_progress(20.0);
    assert_consistent(&task);
    task.check_deadline(late);
    assert_consistent(&task);
    let _ = task.start();
    assert_consistent(&task);
    let _ = task.make_progress(100.0);
    assert_consistent(&task);
    let _ = task.complete(95);
    assert_consistent(&task);
    let _ = task.start();
    assert_consistent(&task);
    let _ = task.resume();
    assert_consistent(&task);
    task.set_completed(true);
    assert_consistent(&task);
    let _ = task.reopen();
    assert_consistent(&task);
}

#[rstest]
#[case(StateName::NotStarted, "Not Started")]
#[case(StateName::InProgress, "In Progress")]
#[case(StateName::Completed, "Completed")]
#[case(StateName::Overdue, "Overdue")]
fn test_state_names_are_stable(#[case] name: StateName, #[case] text: &str) {
    assert_eq!(name.as_str(), text);
    assert_eq!(StateName::try_from(text).unwrap(), name);
    assert!(name.description().starts_with("Task "));
}

#[rstest]
#[case(TaskKind::Homework, "Homework")]
#[case(TaskKind::Lab, "Lab")]
#[case(TaskKind::Composite, "Composite")]
fn test_kind_display_names(#[case] kind: TaskKind, #[case] text: &str) {
    assert_eq!(kind.to_string(), text);
    let task = TaskBuilder::new("Report", due()).kind(kind).build().unwrap();
    assert_eq!(task.kind(), kind);
    assert_eq!(task.is_composite(), kind == TaskKind::Composite);
}

#[rstest]
#[case("Not Started", TaskState::NotStarted)]
#[case("In Progress", TaskState::InProgress { progress: 42.5 })]
#[case("Completed", TaskState::Completed { marks: 77 })]
#[case("Overdue", TaskState::Overdue { since: due() })]
fn test_state_restored_from_snapshot_fields(#[case] name: &str, #[case] expected: TaskState) {
    let state = TaskState::from_snapshot(name, 42.5, 77, due()).unwrap();
    assert_eq!(state, expected);
}

#[test]
fn test_unknown_state_name_is_rejected() {
    let err = TaskState::from_snapshot("Paused", 0.0, 0, due()).unwrap_err();
    assert_eq!(err.0, "Paused");
}

#[test]
fn test_overdue_reminder_reports_lateness() {
    let mut task = new_task();
    let now = due() + Duration::hours(51);
    task.check_deadline(now);
    let text = task.reminder(now);
    assert!(text.contains("overdue by 2 days and 3 hours"), "{text}");
}
