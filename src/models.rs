use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{TransitionError, ValidationError};
use crate::state::{clamp_progress, StateName, Step, TaskState, Transition};

/// Key of a task inside a [`crate::registry::Registry`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of academic work a task represents.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TaskKind {
    #[default]
    Homework,
    Project,
    Exam,
    Lab,
    /// A task whose status is rolled up from child tasks.
    Composite,
}

impl TaskKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Homework => "Homework",
            Self::Project => "Project",
            Self::Exam => "Exam",
            Self::Lab => "Lab",
            Self::Composite => "Composite",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reminder attached to a task. The tracker only stores and forwards these.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Notification {
    /// Text shown to the user.
    pub message: String,
    /// Instant from which the notification is due.
    pub trigger_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(message: impl Into<String>, trigger_at: DateTime<Utc>) -> Self {
        Self {
            message: message.into(),
            trigger_at,
        }
    }

    /// A reminder due `days` days before the task's deadline. `None` when
    /// that instant is out of range.
    pub fn before_deadline(task: &Task, days: i64) -> Option<Self> {
        let trigger_at = task
            .deadline()
            .checked_sub_signed(TimeDelta::try_days(days)?)?;
        Some(Self {
            message: format!("'{}' is due in {} day(s)", task.title(), days),
            trigger_at,
        })
    }

    pub fn should_trigger(&self, now: DateTime<Utc>) -> bool {
        now >= self.trigger_at
    }
}

/// A single unit of academic work.
///
/// The completion flag is never stored on its own: a task is completed
/// exactly when its state is [`TaskState::Completed`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Task {
    /// Title, unique within the owning subject or composite.
    title: String,
    /// Free-text description.
    description: String,
    /// What kind of work this is.
    kind: TaskKind,
    /// Instant after which the task counts as overdue.
    deadline: DateTime<Utc>,
    /// Achieved marks, or the marks pending for completion.
    marks: i32,
    /// Progress percentage in `0.0..=100.0`.
    progress: f32,
    /// Current lifecycle state.
    state: TaskState,
    /// Code of the owning subject, if any.
    subject: Option<String>,
    /// Reminders attached to this task.
    #[serde(default)]
    notifications: Vec<Notification>,
    #[serde(skip)]
    pub(crate) parent: Option<TaskId>,
    #[serde(skip)]
    pub(crate) children: Vec<TaskId>,
}

impl Task {
    pub(crate) fn new(
        title: String,
        description: String,
        kind: TaskKind,
        deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            title,
            description,
            kind,
            deadline,
            marks: 0,
            progress: 0.0,
            state: TaskState::NotStarted,
            subject: None,
            notifications: Vec::new(),
            parent: None,
            children: Vec::new(),
        }
    }

    /// Rebuilds a detached task from persisted fields.
    pub(crate) fn restored(
        title: String,
        description: String,
        deadline: DateTime<Utc>,
        marks: i32,
        progress: f32,
        state: TaskState,
    ) -> Self {
        Self {
            marks,
            progress,
            state,
            ..Self::new(title, description, TaskKind::default(), deadline)
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn is_composite(&self) -> bool {
        self.kind == TaskKind::Composite
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    pub fn set_deadline(&mut self, deadline: DateTime<Utc>) {
        self.deadline = deadline;
    }

    /// Marks stored on this task. Composites with children report derived
    /// marks through [`crate::composite::TaskNode::marks`] instead.
    pub fn marks(&self) -> i32 {
        self.marks
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn state(&self) -> &TaskState {
        &self.state
    }

    pub fn state_name(&self) -> StateName {
        self.state.name()
    }

    pub fn is_completed(&self) -> bool {
        self.state.is_completed()
    }

    /// Code of the subject this task belongs to.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub(crate) fn set_subject(&mut self, code: Option<String>) {
        self.subject = code;
    }

    pub fn parent(&self) -> Option<TaskId> {
        self.parent
    }

    pub fn children(&self) -> &[TaskId] {
        &self.children
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn add_notification(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    /// Removes the notification at `index`. Out-of-range indices are ignored.
    pub fn remove_notification(&mut self, index: usize) -> Option<Notification> {
        if index < self.notifications.len() {
            Some(self.notifications.remove(index))
        } else {
            warn!(task = %self.title, index, "Invalid notification index for removal");
            None
        }
    }

    /// Starts work on the task.
    pub fn start(&mut self) -> Result<Transition, TransitionError> {
        let step = self.guard().and_then(|()| self.state.start(&self.title));
        self.apply("start", step)
    }

    /// Records progress, clamped to `0..=100`. Reaching 100 completes the task
    /// with its current marks.
    pub fn make_progress(&mut self, pct: f32) -> Result<Transition, TransitionError> {
        let step = self
            .guard()
            .and_then(|()| self.state.make_progress(&self.title, pct, self.marks));
        self.apply("make_progress", step)
    }

    /// Completes the task with `marks`, or updates the marks of a task that
    /// is already completed.
    pub fn complete(&mut self, marks: i32) -> Result<Transition, TransitionError> {
        let step = self
            .guard()
            .and_then(|()| self.state.complete(&self.title, marks));
        self.apply("complete", step)
    }

    /// Moves the task to Overdue if `now` is past the deadline.
    pub fn check_deadline(&mut self, now: DateTime<Utc>) -> Transition {
        if !self.children.is_empty() {
            return Transition::Unchanged(self.state.name());
        }
        let step = self.state.check_deadline(self.deadline, now);
        // check_deadline never refuses
        self.apply("check_deadline", step)
            .unwrap_or(Transition::Unchanged(self.state.name()))
    }

    /// [`Task::check_deadline`] against the clock's current instant.
    pub fn check_deadline_with(&mut self, clock: &impl Clock) -> Transition {
        self.check_deadline(clock.utc())
    }

    /// Returns a completed task to Not Started, clearing its marks.
    pub fn reopen(&mut self) -> Result<Transition, TransitionError> {
        let step = self.guard().and_then(|()| self.state.reopen(&self.title));
        self.apply("reopen", step)
    }

    /// Same as [`Task::reopen`].
    pub fn reset(&mut self) -> Result<Transition, TransitionError> {
        self.reopen()
    }

    /// Returns a completed task to In Progress at 0%, clearing its marks.
    pub fn resume(&mut self) -> Result<Transition, TransitionError> {
        let step = self.guard().and_then(|()| self.state.resume(&self.title));
        self.apply("resume", step)
    }

    /// Sets the completion flag directly, moving the state to match.
    pub fn set_completed(&mut self, completed: bool) {
        match (completed, self.is_completed()) {
            (true, false) => self.set_state(TaskState::Completed { marks: self.marks }),
            (false, true) => self.set_state(TaskState::NotStarted),
            _ => {}
        }
    }

    /// Sets marks directly. A completed task's state payload follows.
    pub fn set_marks(&mut self, marks: i32) {
        self.marks = marks;
        if let TaskState::Completed { marks: stored } = &mut self.state {
            *stored = marks;
        }
    }

    /// Reminder text for this task at `now`.
    pub fn reminder(&self, now: DateTime<Utc>) -> String {
        self.state.reminder(&self.title, self.deadline, now)
    }

    fn guard(&self) -> Result<(), TransitionError> {
        if self.children.is_empty() {
            Ok(())
        } else {
            Err(TransitionError::DerivedFromChildren {
                title: self.title.clone(),
            })
        }
    }

    fn apply(&mut self, op: &'static str, step: Step) -> Result<Transition, TransitionError> {
        let from = self.state.name();
        match step {
            Ok(Some(next)) => {
                self.set_state(next);
                let to = next.name();
                debug!(task = %self.title, op, %from, %to, "State changed");
                Ok(if from == to {
                    Transition::Updated(to)
                } else {
                    Transition::Moved { from, to }
                })
            }
            Ok(None) => {
                debug!(task = %self.title, op, state = %from, "No state change");
                Ok(Transition::Unchanged(from))
            }
            Err(e) => {
                warn!(task = %self.title, op, "{}", e);
                Err(e)
            }
        }
    }

    /// Installs `next`, keeping `marks` and `progress` consistent with it.
    fn set_state(&mut self, next: TaskState) {
        match next {
            TaskState::NotStarted => {
                self.marks = 0;
                self.progress = 0.0;
            }
            TaskState::InProgress { progress } => {
                if self.state.is_completed() {
                    self.marks = 0;
                }
                self.progress = clamp_progress(progress);
            }
            TaskState::Completed { marks } => {
                self.marks = marks;
                self.progress = 100.0;
            }
            TaskState::Overdue { .. } => {}
        }
        self.state = next;
    }
}

/// Builds a [`Task`], rejecting an empty title.
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    title: String,
    description: String,
    kind: TaskKind,
    deadline: DateTime<Utc>,
}

impl TaskBuilder {
    pub fn new(title: impl Into<String>, deadline: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            kind: TaskKind::default(),
            deadline,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn kind(mut self, kind: TaskKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn build(self) -> Result<Task, ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        Ok(Task::new(self.title, self.description, self.kind, self.deadline))
    }
}

/// A course or module grouping uniquely titled tasks.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    /// Display name.
    name: String,
    /// Unique code, the subject's identity.
    code: String,
    /// Free-text description.
    description: String,
    /// Top-level tasks in insertion order.
    #[serde(skip)]
    pub(crate) tasks: Vec<TaskId>,
}

impl Subject {
    pub(crate) fn new(name: String, code: String, description: String) -> Self {
        Self {
            name,
            code,
            description,
            tasks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn tasks(&self) -> &[TaskId] {
        &self.tasks
    }
}

/// Builds a [`Subject`], rejecting an empty name or code.
#[derive(Debug, Clone, Default)]
pub struct SubjectBuilder {
    name: String,
    code: String,
    description: String,
}

impl SubjectBuilder {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            description: String::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn build(self) -> Result<Subject, ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptySubjectName);
        }
        if self.code.trim().is_empty() {
            return Err(ValidationError::EmptySubjectCode);
        }
        Ok(Subject::new(self.name, self.code, self.description))
    }
}
