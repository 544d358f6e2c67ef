//! Error types for the editor

use crate::actions::DisabledReason;
use crate::integrity::Violation;
use atlas_graph::{EntityId, GraphError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Raised by `apply` when a precondition `disabled` would have reported
    #[error("Action not applicable: {0}")]
    Disabled(DisabledReason),

    #[error("Index {index} out of range for {id}")]
    InvalidIndex { id: EntityId, index: usize },

    #[error("Need {needed} new ids, got {given}")]
    MissingIds { needed: usize, given: usize },
}

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    #[error("Action {action} is disabled: {reason}")]
    Disabled {
        action: &'static str,
        reason: DisabledReason,
    },

    #[error("Edit breaks graph integrity ({} violations): {}", .0.len(), summarize(.0))]
    Invariant(Vec<Violation>),

    #[error("Top edit is not transient")]
    NotTransient,

    #[error("Unknown checkpoint: {0}")]
    UnknownCheckpoint(String),

    #[error("Recovery error: {0}")]
    Recovery(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn summarize(violations: &[Violation]) -> String {
    let shown: Vec<String> = violations.iter().take(3).map(|v| v.to_string()).collect();
    if violations.len() > shown.len() {
        format!("{}, ...", shown.join(", "))
    } else {
        shown.join(", ")
    }
}
