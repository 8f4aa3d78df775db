//! Composite tasks: child membership and status rolled up from children.
//!
//! A composite with no children behaves exactly like a plain task. Once it
//! has children its completion, marks, progress and state are derived from
//! them and never read from its own fields.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::StructureError;
use crate::models::{Task, TaskId};
use crate::registry::Registry;
use crate::state::TaskState;

/// Read-only view of a task that can see its children.
#[derive(Debug, Clone, Copy)]
pub struct TaskNode<'a> {
    registry: &'a Registry,
    id: TaskId,
    task: &'a Task,
}

impl<'a> TaskNode<'a> {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn task(&self) -> &'a Task {
        self.task
    }

    pub fn children(&self) -> impl Iterator<Item = TaskNode<'a>> + 'a {
        let registry = self.registry;
        self.task
            .children
            .iter()
            .filter_map(move |id| registry.node(*id))
    }

    fn is_leaf(&self) -> bool {
        self.task.children.is_empty()
    }

    /// True when every child is completed, recursively.
    pub fn is_completed(&self) -> bool {
        if self.is_leaf() {
            return self.task.is_completed();
        }
        self.children().all(|child| child.is_completed())
    }

    /// Mean marks of completed children, truncated toward zero. Zero when no
    /// child is completed.
    pub fn marks(&self) -> i32 {
        if self.is_leaf() {
            return self.task.marks();
        }
        let (sum, count) = self
            .children()
            .filter(|child| child.is_completed())
            .fold((0i64, 0i64), |(sum, count), child| {
                (sum + i64::from(child.marks()), count + 1)
            });
        if count == 0 {
            0
        } else {
            // the mean of i32 values always fits in i32
            (sum / count) as i32
        }
    }

    /// Mean progress of all children.
    pub fn progress(&self) -> f32 {
        if self.is_leaf() {
            return self.task.progress();
        }
        let (sum, count) = self
            .children()
            .fold((0.0f32, 0u32), |(sum, count), child| {
                (sum + child.progress(), count + 1)
            });
        if count == 0 {
            0.0
        } else {
            sum / count as f32
        }
    }

    /// Effective state. For a composite with children: Completed when all
    /// children are, else Overdue if any child is, else In Progress if any
    /// child has started, else Not Started.
    pub fn state(&self) -> TaskState {
        if self.is_leaf() {
            return *self.task.state();
        }
        if self.is_completed() {
            return TaskState::Completed {
                marks: self.marks(),
            };
        }
        let states: Vec<TaskState> = self.children().map(|child| child.state()).collect();
        let earliest_overdue: Option<DateTime<Utc>> = states
            .iter()
            .filter_map(|state| match state {
                TaskState::Overdue { since } => Some(*since),
                _ => None,
            })
            .min();
        if let Some(since) = earliest_overdue {
            return TaskState::Overdue { since };
        }
        if states
            .iter()
            .any(|state| !matches!(state, TaskState::NotStarted))
        {
            return TaskState::InProgress {
                progress: self.progress(),
            };
        }
        TaskState::NotStarted
    }

    /// Number of descendants: direct children plus their own descendants.
    pub fn total_descendant_count(&self) -> usize {
        self.children()
            .map(|child| 1 + child.total_descendant_count())
            .sum()
    }
}

impl Registry {
    /// A view of `id` able to compute rolled-up status.
    pub fn node(&self, id: TaskId) -> Option<TaskNode<'_>> {
        self.task(id).map(|task| TaskNode {
            registry: self,
            id,
            task,
        })
    }

    /// True when `ancestor` is `id` or one of its parents, transitively.
    pub fn is_ancestor(&self, ancestor: TaskId, id: TaskId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.task(current).and_then(Task::parent);
        }
        false
    }

    /// Appends `child` to the composite `parent`.
    ///
    /// The child must be detached and titled uniquely among its new siblings,
    /// and must not be `parent` itself or one of its ancestors. It inherits
    /// the parent's subject.
    pub fn add_child(&mut self, parent: TaskId, child: TaskId) -> Result<(), StructureError> {
        let parent_task = self.get(parent)?;
        let child_task = self.get(child)?;
        if !parent_task.is_composite() {
            return Err(StructureError::NotComposite(parent_task.title().to_owned()));
        }
        if self.is_ancestor(child, parent) {
            warn!(
                parent = parent_task.title(),
                child = child_task.title(),
                "Rejected child that is an ancestor of its parent"
            );
            return Err(StructureError::Cycle {
                parent: parent_task.title().to_owned(),
                child: child_task.title().to_owned(),
            });
        }
        if child_task.parent.is_some() || child_task.subject().is_some() {
            return Err(StructureError::AlreadyAttached(child_task.title().to_owned()));
        }
        let duplicate = parent_task
            .children
            .iter()
            .filter_map(|id| self.task(*id))
            .any(|sibling| sibling.title() == child_task.title());
        if duplicate {
            warn!(
                parent = parent_task.title(),
                child = child_task.title(),
                "Child task already exists in this composite"
            );
            return Err(StructureError::DuplicateTitle {
                title: child_task.title().to_owned(),
                owner: format!("composite '{}'", parent_task.title()),
            });
        }

        let subject = parent_task.subject().map(str::to_owned);
        debug!(
            parent = parent_task.title(),
            child = child_task.title(),
            "Child task added"
        );
        self.get_mut(parent)?.children.push(child);
        self.get_mut(child)?.parent = Some(parent);
        if subject.is_some() {
            self.stamp_subject(child, subject);
        }
        Ok(())
    }

    /// Removes the child at `index`, dropping it and its descendants.
    pub fn remove_child_at(&mut self, parent: TaskId, index: usize) -> Result<Task, StructureError> {
        let parent_task = self.get(parent)?;
        let len = parent_task.children.len();
        if index >= len {
            warn!(parent = parent_task.title(), index, "Invalid child task index");
            return Err(StructureError::IndexOutOfRange {
                owner: parent_task.title().to_owned(),
                index,
                len,
            });
        }
        let child = self.get_mut(parent)?.children.remove(index);
        self.drop_subtree(child)
    }

    /// Removes the child titled `title`, dropping it and its descendants.
    pub fn remove_child(&mut self, parent: TaskId, title: &str) -> Result<Task, StructureError> {
        let parent_task = self.get(parent)?;
        let index = parent_task
            .children
            .iter()
            .position(|id| self.task(*id).is_some_and(|t| t.title() == title));
        match index {
            Some(index) => self.remove_child_at(parent, index),
            None => {
                warn!(parent = parent_task.title(), title, "Child task not found");
                Err(StructureError::MissingTitle {
                    title: title.to_owned(),
                    owner: format!("composite '{}'", parent_task.title()),
                })
            }
        }
    }

    /// Sets the completion flag on `id`, then on every descendant.
    pub fn set_completed(&mut self, id: TaskId, completed: bool) -> Result<(), StructureError> {
        self.get(id)?;
        for member in self.subtree(id) {
            self.get_mut(member)?.set_completed(completed);
        }
        Ok(())
    }

    /// Sets marks on `id`, then on every descendant.
    pub fn set_marks(&mut self, id: TaskId, marks: i32) -> Result<(), StructureError> {
        self.get(id)?;
        for member in self.subtree(id) {
            self.get_mut(member)?.set_marks(marks);
        }
        Ok(())
    }
}
