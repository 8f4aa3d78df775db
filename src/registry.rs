//! Arena holding subjects by code and tasks by [`TaskId`].
//!
//! Tasks refer to their subject by code and to their parent and children by
//! id, so the whole graph lives here and nothing holds a pointer into it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use mockable::Clock;
use tracing::{debug, info, warn};

use crate::error::StructureError;
use crate::models::{Notification, Subject, Task, TaskId};
use crate::state::Transition;

#[derive(Debug, Clone, Default)]
pub struct Registry {
    subjects: BTreeMap<String, Subject>,
    tasks: BTreeMap<TaskId, Task>,
    next_id: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subject. Its code must be unused.
    pub fn add_subject(&mut self, subject: Subject) -> Result<(), StructureError> {
        if self.subjects.contains_key(subject.code()) {
            warn!(code = subject.code(), "Subject already exists");
            return Err(StructureError::DuplicateSubject(subject.code().to_owned()));
        }
        debug!(code = subject.code(), "Subject added");
        self.subjects.insert(subject.code().to_owned(), subject);
        Ok(())
    }

    /// Unregisters a subject. Its tasks stay in the registry, detached.
    pub fn remove_subject(&mut self, code: &str) -> Result<Subject, StructureError> {
        let mut subject = self
            .subjects
            .remove(code)
            .ok_or_else(|| StructureError::UnknownSubject(code.to_owned()))?;
        for id in std::mem::take(&mut subject.tasks) {
            self.stamp_subject(id, None);
        }
        info!(code, "Subject removed");
        Ok(subject)
    }

    pub fn subject(&self, code: &str) -> Option<&Subject> {
        self.subjects.get(code)
    }

    pub fn subject_mut(&mut self, code: &str) -> Option<&mut Subject> {
        self.subjects.get_mut(code)
    }

    /// Subjects ordered by code.
    pub fn subjects(&self) -> impl Iterator<Item = &Subject> {
        self.subjects.values()
    }

    /// Adds a detached task and returns its id.
    pub fn insert(&mut self, mut task: Task) -> TaskId {
        self.next_id += 1;
        let id = TaskId(self.next_id);
        task.parent = None;
        task.children.clear();
        task.set_subject(None);
        debug!(%id, title = task.title(), kind = %task.kind(), "Task inserted");
        self.tasks.insert(id, task);
        id
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(&id)
    }

    pub(crate) fn get(&self, id: TaskId) -> Result<&Task, StructureError> {
        self.tasks.get(&id).ok_or(StructureError::UnknownTask(id))
    }

    pub(crate) fn get_mut(&mut self, id: TaskId) -> Result<&mut Task, StructureError> {
        self.tasks.get_mut(&id).ok_or(StructureError::UnknownTask(id))
    }

    /// Every task in the registry, including children and detached tasks.
    pub fn tasks(&self) -> impl Iterator<Item = (TaskId, &Task)> {
        self.tasks.iter().map(|(id, task)| (*id, task))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Makes a detached task a top-level member of a subject.
    ///
    /// The subject code is stamped on the task and all its descendants.
    pub fn assign(&mut self, code: &str, id: TaskId) -> Result<(), StructureError> {
        let subject = self
            .subjects
            .get(code)
            .ok_or_else(|| StructureError::UnknownSubject(code.to_owned()))?;
        let task = self.get(id)?;
        if task.parent.is_some() || task.subject().is_some() {
            return Err(StructureError::AlreadyAttached(task.title().to_owned()));
        }
        let title = task.title();
        if subject
            .tasks
            .iter()
            .filter_map(|sibling| self.tasks.get(sibling))
            .any(|sibling| sibling.title() == title)
        {
            warn!(code, title, "Task already exists in this subject");
            return Err(StructureError::DuplicateTitle {
                title: title.to_owned(),
                owner: format!("subject '{code}'"),
            });
        }

        debug!(code, title, "Task assigned to subject");
        if let Some(subject) = self.subjects.get_mut(code) {
            subject.tasks.push(id);
        }
        self.stamp_subject(id, Some(code.to_owned()));
        Ok(())
    }

    /// Looks up a top-level task of a subject by title.
    pub fn find_task(&self, code: &str, title: &str) -> Option<TaskId> {
        self.subjects
            .get(code)?
            .tasks
            .iter()
            .copied()
            .find(|id| self.tasks.get(id).is_some_and(|t| t.title() == title))
    }

    /// Removes a top-level task from a subject, dropping it and its
    /// descendants from the registry.
    pub fn remove_task(&mut self, code: &str, title: &str) -> Result<Task, StructureError> {
        if !self.subjects.contains_key(code) {
            return Err(StructureError::UnknownSubject(code.to_owned()));
        }
        let Some(id) = self.find_task(code, title) else {
            warn!(code, title, "Task not found in this subject");
            return Err(StructureError::MissingTitle {
                title: title.to_owned(),
                owner: format!("subject '{code}'"),
            });
        };
        if let Some(subject) = self.subjects.get_mut(code) {
            subject.tasks.retain(|member| *member != id);
        }
        debug!(code, title, "Task removed from subject");
        self.drop_subtree(id)
    }

    /// Runs the deadline check on every task, returning those that became
    /// overdue.
    pub fn sweep_deadlines(&mut self, now: DateTime<Utc>) -> Vec<TaskId> {
        let overdue: Vec<TaskId> = self
            .tasks
            .iter_mut()
            .filter_map(|(id, task)| match task.check_deadline(now) {
                Transition::Moved { .. } => Some(*id),
                _ => None,
            })
            .collect();
        info!(count = overdue.len(), %now, "Deadline sweep finished");
        overdue
    }

    pub fn sweep_deadlines_with(&mut self, clock: &impl Clock) -> Vec<TaskId> {
        self.sweep_deadlines(clock.utc())
    }

    /// Notifications due at `now`, across all tasks.
    pub fn due_notifications(&self, now: DateTime<Utc>) -> Vec<(TaskId, &Notification)> {
        self.tasks
            .iter()
            .flat_map(|(id, task)| {
                task.notifications()
                    .iter()
                    .filter(move |n| n.should_trigger(now))
                    .map(move |n| (*id, n))
            })
            .collect()
    }

    /// Ids of `id` and all its descendants, parents before children.
    pub(crate) fn subtree(&self, id: TaskId) -> Vec<TaskId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(task) = self.tasks.get(&next) {
                out.push(next);
                stack.extend(task.children.iter().rev().copied());
            }
        }
        out
    }

    pub(crate) fn stamp_subject(&mut self, id: TaskId, code: Option<String>) {
        for member in self.subtree(id) {
            if let Some(task) = self.tasks.get_mut(&member) {
                task.set_subject(code.clone());
            }
        }
    }

    /// Removes `id` and its descendants from the arena, returning `id`.
    pub(crate) fn drop_subtree(&mut self, id: TaskId) -> Result<Task, StructureError> {
        let ids = self.subtree(id);
        let mut root = None;
        for member in ids {
            let task = self.tasks.remove(&member);
            if member == id {
                root = task;
            }
        }
        let mut root = root.ok_or(StructureError::UnknownTask(id))?;
        root.parent = None;
        root.children.clear();
        root.set_subject(None);
        Ok(root)
    }
}
