//! Error types for task construction, lifecycle transitions, graph structure
//! and snapshot persistence.

use std::io;

use thiserror::Error;

use crate::models::TaskId;

/// Raised by the builders when a required field is missing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The task title is empty after trimming.
    #[error("task title must not be empty")]
    EmptyTitle,

    /// The subject name is empty after trimming.
    #[error("subject name must not be empty")]
    EmptySubjectName,

    /// The subject code is empty after trimming.
    #[error("subject code must not be empty")]
    EmptySubjectCode,
}

/// A lifecycle operation that was refused. The task is left untouched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    /// Start or progress was requested on a completed task.
    #[error("cannot {action} task '{title}' as it is already completed")]
    AlreadyCompleted { title: String, action: &'static str },

    /// The task is already completed with exactly these marks.
    #[error("task '{title}' is already completed with {marks} marks")]
    SameMarks { title: String, marks: i32 },

    /// Reopen or resume was requested on a task that is not completed.
    #[error("task '{title}' is not completed")]
    NotCompleted { title: String },

    /// The task is a composite whose state comes from its children.
    #[error("state of composite task '{title}' is derived from its children")]
    DerivedFromChildren { title: String },
}

/// A membership or hierarchy change that was refused. The graph is left
/// untouched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StructureError {
    #[error("unknown task id {0}")]
    UnknownTask(TaskId),

    #[error("unknown subject '{0}'")]
    UnknownSubject(String),

    #[error("subject '{0}' already exists")]
    DuplicateSubject(String),

    /// Titles are unique within a subject and within a composite.
    #[error("a task titled '{title}' already exists in {owner}")]
    DuplicateTitle { title: String, owner: String },

    #[error("no task titled '{title}' in {owner}")]
    MissingTitle { title: String, owner: String },

    #[error("child index {index} out of range for '{owner}' ({len} children)")]
    IndexOutOfRange {
        owner: String,
        index: usize,
        len: usize,
    },

    #[error("task '{0}' is not a composite and cannot hold children")]
    NotComposite(String),

    #[error("task '{0}' already belongs to a subject or composite")]
    AlreadyAttached(String),

    /// Adding the child would make a task its own ancestor.
    #[error("adding '{child}' under '{parent}' would create a cycle")]
    Cycle { parent: String, child: String },
}

/// Failure to read or write the snapshot history.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("unsupported save file version '{0}'")]
    BadVersion(String),

    #[error("line {line}: unexpected end of file")]
    UnexpectedEof { line: usize },

    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("line {line}: {source}")]
    UnknownState {
        line: usize,
        #[source]
        source: ParseStateNameError,
    },
}

/// Error returned while parsing a state name from a snapshot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task state: {0}")]
pub struct ParseStateNameError(pub String);
