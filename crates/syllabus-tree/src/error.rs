//! Error types for the Syllabus course tree.
//!
//! This module defines the errors raised by local tree operations:
//! structural edits, move targets and payload validation. None of these
//! involve the network.

use std::fmt;

use crate::id::EntityId;

/// A specialized `Result` type for course tree operations.
pub type Result<T> = std::result::Result<T, TreeError>;

/// Kind of node in the course hierarchy, used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// The course itself.
    Course,
    /// A course module.
    Module,
    /// A lesson inside a module.
    Lesson,
    /// A content attachment of a lesson.
    Content,
    /// A quiz question of a lesson.
    Question,
    /// An answer option of a question.
    Option,
    /// The assignment of a lesson.
    Assignment,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Course => write!(f, "course"),
            Self::Module => write!(f, "module"),
            Self::Lesson => write!(f, "lesson"),
            Self::Content => write!(f, "content"),
            Self::Question => write!(f, "question"),
            Self::Option => write!(f, "option"),
            Self::Assignment => write!(f, "assignment"),
        }
    }
}

/// A single problem found while validating a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Location of the offending field, e.g. `lessons[0].questions[1].options`.
    pub path: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationIssue {
    /// Creates a new issue at `path`.
    #[must_use]
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Errors that can occur while editing or validating a course tree.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    // ========================================================================
    // Structural Errors
    // ========================================================================
    /// A move or insert target lies outside `[1, sibling_count]`.
    #[error("Position {position} is out of range for {kind} list of {len} item(s)\n\nSuggestion: Use a position between 1 and {len}")]
    PositionOutOfRange {
        /// Kind of the sibling group.
        kind: EntityKind,
        /// The requested position.
        position: u32,
        /// Number of siblings in the group.
        len: usize,
    },

    /// The referenced node does not exist in the tree.
    #[error("{kind} not found: '{id}'\n\nSuggestion: Reload the course hierarchy; the node may have been deleted")]
    NotFound {
        /// Kind of the missing node.
        kind: EntityKind,
        /// Identifier that was looked up.
        id: EntityId,
    },

    /// A sibling group is not a dense `1..n` ordering.
    #[error("Positions of {kind} list under '{container}' are not dense: {positions:?}")]
    InvalidOrdering {
        /// Kind of the sibling group.
        kind: EntityKind,
        /// Owner of the sibling group.
        container: String,
        /// Positions as found, in storage order.
        positions: Vec<u32>,
    },

    /// A child's back-reference does not match its container.
    #[error("{kind} '{id}' points at '{found}' but lives under '{expected}'")]
    BrokenBackReference {
        /// Kind of the child.
        kind: EntityKind,
        /// Identifier of the child.
        id: EntityId,
        /// The container the child actually lives in.
        expected: String,
        /// The back-reference stored on the child.
        found: String,
    },

    // ========================================================================
    // Validation Errors
    // ========================================================================
    /// A payload failed local validation and was not sent.
    #[error("Validation failed: {}\n\nSuggestion: Fix the listed fields before saving", format_issues(.issues))]
    Validation {
        /// Every problem found, in traversal order.
        issues: Vec<ValidationIssue>,
    },

    /// A saved lesson's contents, quiz and assignment were never fetched, so
    /// a deep upsert would erase them on the server.
    #[error("Lesson '{lesson}' has no loaded detail\n\nSuggestion: Load the lesson detail before saving its module")]
    DetailNotLoaded {
        /// The lesson missing its detail.
        lesson: EntityId,
    },

    /// A server response could not be mapped onto the tree.
    #[error("Malformed server data: {message}")]
    MalformedServerData {
        /// Description of the mismatch.
        message: String,
    },
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl TreeError {
    /// Creates a new `PositionOutOfRange` error.
    #[must_use]
    pub const fn out_of_range(kind: EntityKind, position: u32, len: usize) -> Self {
        Self::PositionOutOfRange {
            kind,
            position,
            len,
        }
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub const fn not_found(kind: EntityKind, id: &EntityId) -> Self {
        Self::NotFound {
            kind,
            id: *id,
        }
    }

    /// Creates a new `Validation` error from collected issues.
    #[must_use]
    pub fn validation(issues: Vec<ValidationIssue>) -> Self {
        Self::Validation { issues }
    }

    /// Creates a new `MalformedServerData` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedServerData {
            message: message.into(),
        }
    }

    /// Returns `true` for errors that block a user action before any request is made.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::PositionOutOfRange { .. }
                | Self::Validation { .. }
                | Self::NotFound { .. }
                | Self::DetailNotLoaded { .. }
        )
    }

    /// Returns the validation issues carried by this error, if any.
    #[must_use]
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            Self::Validation { issues } => issues,
            _ => &[],
        }
    }
}
