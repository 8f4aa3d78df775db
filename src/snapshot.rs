//! Point-in-time captures of the tracked subjects and tasks.
//!
//! A [`Snapshot`] holds plain summaries, never live references: subjects keep
//! the ordered titles of their top-level tasks, and each task keeps the code
//! of its subject. Those two fields are the join key used by
//! [`Snapshot::rebuild`].

use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::composite::TaskNode;
use crate::models::{Subject, Task};
use crate::registry::Registry;
use crate::state::{StateName, TaskState};

/// Summary of a subject at capture time.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SubjectSummary {
    pub name: String,
    pub code: String,
    pub description: String,
    /// Titles of the subject's top-level tasks, in order.
    pub task_titles: Vec<String>,
}

impl SubjectSummary {
    fn of(registry: &Registry, subject: &Subject) -> Self {
        Self {
            name: subject.name().to_owned(),
            code: subject.code().to_owned(),
            description: subject.description().to_owned(),
            task_titles: subject
                .tasks()
                .iter()
                .filter_map(|id| registry.task(*id))
                .map(|task| task.title().to_owned())
                .collect(),
        }
    }

    /// A subject with the summary's fields and no tasks.
    pub fn restore(&self) -> Subject {
        Subject::new(
            self.name.clone(),
            self.code.clone(),
            self.description.clone(),
        )
    }
}

/// Summary of a task at capture time, with composite status already rolled up.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TaskSummary {
    pub title: String,
    pub description: String,
    /// Whole seconds only; the save format stores epoch seconds.
    pub deadline: DateTime<Utc>,
    pub completed: bool,
    pub marks: i32,
    pub progress: f32,
    pub state: StateName,
    pub subject_code: Option<String>,
}

impl TaskSummary {
    fn of(node: &TaskNode<'_>) -> Self {
        let task = node.task();
        let deadline = task.deadline();
        Self {
            title: task.title().to_owned(),
            description: task.description().to_owned(),
            deadline: DateTime::from_timestamp(deadline.timestamp(), 0).unwrap_or(deadline),
            completed: node.is_completed(),
            marks: node.marks(),
            progress: node.progress(),
            state: node.state().name(),
            subject_code: task.subject().map(str::to_owned),
        }
    }

    /// The live state this summary stands for.
    pub fn live_state(&self) -> TaskState {
        TaskState::restore(self.state, self.progress, self.marks, self.deadline)
    }

    /// A detached task with the summary's fields. The caller decides where
    /// to attach it.
    pub fn restore(&self) -> Task {
        Task::restored(
            self.title.clone(),
            self.description.clone(),
            self.deadline,
            self.marks,
            self.progress,
            self.live_state(),
        )
    }
}

/// Immutable capture of all subjects and their tasks.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Snapshot {
    timestamp: DateTime<Utc>,
    description: String,
    subjects: Vec<SubjectSummary>,
    tasks: Vec<TaskSummary>,
}

impl Snapshot {
    pub(crate) fn from_parts(
        timestamp: DateTime<Utc>,
        description: String,
        subjects: Vec<SubjectSummary>,
        tasks: Vec<TaskSummary>,
    ) -> Self {
        Self {
            timestamp,
            description,
            subjects,
            tasks,
        }
    }

    /// Captures every subject and each subject's top-level tasks.
    pub fn capture(registry: &Registry, description: impl Into<String>, clock: &impl Clock) -> Self {
        let subjects: Vec<SubjectSummary> = registry
            .subjects()
            .map(|subject| SubjectSummary::of(registry, subject))
            .collect();
        let tasks: Vec<TaskSummary> = registry
            .subjects()
            .flat_map(|subject| subject.tasks().iter())
            .filter_map(|id| registry.node(*id))
            .map(|node| TaskSummary::of(&node))
            .collect();
        let snapshot = Self {
            timestamp: clock.utc(),
            description: description.into(),
            subjects,
            tasks,
        };
        info!(
            description = %snapshot.description,
            subjects = snapshot.subjects.len(),
            tasks = snapshot.tasks.len(),
            "Snapshot captured"
        );
        snapshot
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn subjects(&self) -> &[SubjectSummary] {
        &self.subjects
    }

    pub fn tasks(&self) -> &[TaskSummary] {
        &self.tasks
    }

    /// Rebuilds a registry: subjects first, then tasks attached in each
    /// subject's title order. Tasks matching no subject are kept detached.
    pub fn rebuild(&self) -> Registry {
        let mut registry = Registry::new();
        for summary in &self.subjects {
            if let Err(e) = registry.add_subject(summary.restore()) {
                warn!("Skipping subject while rebuilding: {}", e);
            }
        }

        let mut used = vec![false; self.tasks.len()];
        for subject in &self.subjects {
            for title in &subject.task_titles {
                let found = self.tasks.iter().enumerate().position(|(i, task)| {
                    !used[i]
                        && task.title == *title
                        && task.subject_code.as_deref() == Some(subject.code.as_str())
                });
                let Some(i) = found else {
                    warn!(code = %subject.code, %title, "No task recorded for subject entry");
                    continue;
                };
                used[i] = true;
                let id = registry.insert(self.tasks[i].restore());
                if let Err(e) = registry.assign(&subject.code, id) {
                    warn!("Task left detached while rebuilding: {}", e);
                }
            }
        }

        for (task, _) in self.tasks.iter().zip(&used).filter(|(_, used)| !**used) {
            registry.insert(task.restore());
        }
        registry
    }
}
