//! Lifecycle states of a task and the transitions between them.
//!
//! Each operation is evaluated against the current [`TaskState`] and yields
//! either the state the task should move to, `None` when the task stays as it
//! is, or a [`TransitionError`] when the request is refused. Applying the
//! result to a task is the job of [`crate::models::Task`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ParseStateNameError, TransitionError};

/// The four lifecycle states. Payloads are owned by the task holding them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state")]
pub enum TaskState {
    /// Idle marker, carries no data.
    #[default]
    #[serde(rename = "Not Started")]
    NotStarted,
    /// Work has begun; payload is the live progress percentage.
    #[serde(rename = "In Progress")]
    InProgress { progress: f32 },
    /// Work is done; payload is the achieved marks.
    Completed { marks: i32 },
    /// The deadline passed before completion.
    Overdue { since: DateTime<Utc> },
}

/// Tag of a [`TaskState`], used in snapshots and for restore dispatch.
/// Serialized with the same names the save file uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateName {
    #[serde(rename = "Not Started")]
    NotStarted,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    Overdue,
}

impl StateName {
    pub const ALL: [StateName; 4] = [
        StateName::NotStarted,
        StateName::InProgress,
        StateName::Completed,
        StateName::Overdue,
    ];

    /// Returns the name written to save files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "Not Started",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::Overdue => "Overdue",
        }
    }

    /// Short human description of the state.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::NotStarted => "Task has not been started yet.",
            Self::InProgress => "Task is currently being worked on.",
            Self::Completed => "Task has been completed.",
            Self::Overdue => "Task is past its deadline.",
        }
    }
}

impl fmt::Display for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for StateName {
    type Error = ParseStateNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == value)
            .ok_or_else(|| ParseStateNameError(value.to_owned()))
    }
}

/// What an applied operation did to the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The task moved to a different state.
    Moved { from: StateName, to: StateName },
    /// Same state, new payload (progress or marks changed in place).
    Updated(StateName),
    /// Nothing changed; the request was benign.
    Unchanged(StateName),
}

impl Transition {
    #[must_use]
    pub const fn changed(self) -> bool {
        !matches!(self, Self::Unchanged(_))
    }
}

/// Outcome of evaluating an operation against a state.
pub type Step = Result<Option<TaskState>, TransitionError>;

/// Clamps a progress percentage into `0.0..=100.0`. NaN counts as zero.
#[must_use]
pub fn clamp_progress(pct: f32) -> f32 {
    if pct.is_nan() {
        0.0
    } else {
        pct.clamp(0.0, 100.0)
    }
}

impl TaskState {
    #[must_use]
    pub const fn name(&self) -> StateName {
        match self {
            Self::NotStarted => StateName::NotStarted,
            Self::InProgress { .. } => StateName::InProgress,
            Self::Completed { .. } => StateName::Completed,
            Self::Overdue { .. } => StateName::Overdue,
        }
    }

    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Rebuilds a live state from the fields stored in a snapshot.
    ///
    /// The instant a task became overdue is not stored, so the deadline
    /// stands in for it.
    #[must_use]
    pub fn restore(name: StateName, progress: f32, marks: i32, deadline: DateTime<Utc>) -> Self {
        match name {
            StateName::NotStarted => Self::NotStarted,
            StateName::InProgress => Self::InProgress { progress },
            StateName::Completed => Self::Completed { marks },
            StateName::Overdue => Self::Overdue { since: deadline },
        }
    }

    /// [`TaskState::restore`] from a state name as written in a save file.
    pub fn from_snapshot(
        name: &str,
        progress: f32,
        marks: i32,
        deadline: DateTime<Utc>,
    ) -> Result<Self, ParseStateNameError> {
        Ok(Self::restore(StateName::try_from(name)?, progress, marks, deadline))
    }

    pub(crate) fn start(&self, title: &str) -> Step {
        match self {
            Self::NotStarted | Self::Overdue { .. } => Ok(Some(Self::InProgress { progress: 0.0 })),
            Self::InProgress { .. } => Ok(None),
            Self::Completed { .. } => Err(TransitionError::AlreadyCompleted {
                title: title.to_owned(),
                action: "start",
            }),
        }
    }

    /// `marks` is what the task would complete with if progress reaches 100.
    pub(crate) fn make_progress(&self, title: &str, pct: f32, marks: i32) -> Step {
        let pct = clamp_progress(pct);
        match self {
            Self::InProgress { progress } => {
                if pct >= 100.0 {
                    Ok(Some(Self::Completed { marks }))
                } else if (*progress - pct).abs() > f32::EPSILON {
                    Ok(Some(Self::InProgress { progress: pct }))
                } else {
                    Ok(None)
                }
            }
            // Progress is never dropped when promoting an idle or late task.
            Self::NotStarted | Self::Overdue { .. } if pct >= 100.0 => {
                Ok(Some(Self::Completed { marks }))
            }
            Self::NotStarted | Self::Overdue { .. } => Ok(Some(Self::InProgress { progress: pct })),
            Self::Completed { .. } => Err(TransitionError::AlreadyCompleted {
                title: title.to_owned(),
                action: "update progress on",
            }),
        }
    }

    pub(crate) fn complete(&self, title: &str, marks: i32) -> Step {
        match self {
            Self::Completed { marks: current } if *current == marks => {
                Err(TransitionError::SameMarks {
                    title: title.to_owned(),
                    marks,
                })
            }
            _ => Ok(Some(Self::Completed { marks })),
        }
    }

    /// Deadline comparison is strict: a task due exactly `now` is not late.
    pub(crate) fn check_deadline(&self, deadline: DateTime<Utc>, now: DateTime<Utc>) -> Step {
        match self {
            Self::NotStarted | Self::InProgress { .. } if now > deadline => {
                Ok(Some(Self::Overdue { since: now }))
            }
            _ => Ok(None),
        }
    }

    pub(crate) fn reopen(&self, title: &str) -> Step {
        match self {
            Self::Completed { .. } => Ok(Some(Self::NotStarted)),
            _ => Err(TransitionError::NotCompleted {
                title: title.to_owned(),
            }),
        }
    }

    pub(crate) fn resume(&self, title: &str) -> Step {
        match self {
            Self::Completed { .. } => Ok(Some(Self::InProgress { progress: 0.0 })),
            _ => Err(TransitionError::NotCompleted {
                title: title.to_owned(),
            }),
        }
    }

    /// Reminder text for a notification about this task.
    #[must_use]
    pub fn reminder(&self, title: &str, deadline: DateTime<Utc>, now: DateTime<Utc>) -> String {
        match self {
            Self::NotStarted => {
                format!("Task '{title}' hasn't been started yet! Due date is approaching.")
            }
            Self::InProgress { progress } => format!(
                "Task '{title}' is {progress}% complete. Keep working to finish before the deadline!"
            ),
            Self::Completed { marks } => {
                format!("Task '{title}' has been completed with {marks} marks.")
            }
            Self::Overdue { .. } => {
                let hours = (now - deadline).num_hours().max(0);
                let late = if hours < 24 {
                    format!("{hours} hours")
                } else {
                    format!("{} days and {} hours", hours / 24, hours % 24)
                };
                format!("URGENT: Task '{title}' is overdue by {late}. Please complete it as soon as possible!")
            }
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name().as_str())
    }
}
