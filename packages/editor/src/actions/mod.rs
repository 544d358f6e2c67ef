//! # Actions
//!
//! Pure graph transformations: `apply(&Graph) -> Graph` plus a `disabled`
//! query.
//!
//! ## Design Principles
//!
//! 1. **Pure**: an action never touches the graph it is given; it returns a
//!    new snapshot
//! 2. **Queryable**: `disabled` explains why an action cannot run before the
//!    user tries it; it is never an error
//! 3. **Composed**: every action is built from `replace` / `remove`, batched
//!    into one layer with `Graph::try_update`
//! 4. **Serializable**: [`Action`] round-trips through JSON, tagged by
//!    `"action"`
//!
//! ## Cascades
//!
//! Deleting an entity removes it from its parents first. A way left with
//! too few nodes and a relation left without members are deleted in turn;
//! child nodes and members that end up orphaned and untagged go with them.

mod create;
mod delete;
mod merge;
mod modify;
mod split;

pub use create::{AddEntity, AddMember, AddMidpoint, AddVertex};
pub use delete::{DeleteNode, DeleteRelation, DeleteWay};
pub use merge::MergeNodes;
pub use modify::{ChangeTags, DeleteMember, DiscardTags, MoveNode};
pub use split::Split;

use crate::errors::ActionError;
use atlas_graph::Graph;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an action cannot be applied to a particular graph.
///
/// Serialized as a stable snake_case code that UI layers translate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisabledReason {
    NotEligible,
    /// Conflicting relation roles
    Relation,
    /// Part of a larger multipolygon
    Part,
    Vertex,
    NotFound,
    IncompleteRelation,
    Degenerate,
    InvalidIndex,
    MissingIds,
}

impl DisabledReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisabledReason::NotEligible => "not_eligible",
            DisabledReason::Relation => "relation",
            DisabledReason::Part => "part",
            DisabledReason::Vertex => "vertex",
            DisabledReason::NotFound => "not_found",
            DisabledReason::IncompleteRelation => "incomplete_relation",
            DisabledReason::Degenerate => "degenerate",
            DisabledReason::InvalidIndex => "invalid_index",
            DisabledReason::MissingIds => "missing_ids",
        }
    }
}

impl fmt::Display for DisabledReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for graph operations
///
/// Each action type implements this trait to provide:
/// - Apply logic
/// - Availability query
pub trait ActionOp: Send + Sync + fmt::Debug {
    /// Produce the next graph
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError>;

    /// Reason this action cannot run on `graph`, if any
    fn disabled(&self, _graph: &Graph) -> Option<DisabledReason> {
        None
    }

    /// Get a debug name for this action
    fn name(&self) -> &'static str;
}

/// Every action in the library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    AddEntity(AddEntity),
    AddVertex(AddVertex),
    AddMidpoint(AddMidpoint),
    AddMember(AddMember),
    ChangeTags(ChangeTags),
    MoveNode(MoveNode),
    DeleteMember(DeleteMember),
    DiscardTags(DiscardTags),
    DeleteNode(DeleteNode),
    DeleteWay(DeleteWay),
    DeleteRelation(DeleteRelation),
    Split(Split),
    MergeNodes(MergeNodes),
    Noop,
}

#[derive(Debug)]
struct Noop;

impl ActionOp for Noop {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        Ok(graph.clone())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

impl Action {
    fn op(&self) -> &dyn ActionOp {
        match self {
            Action::AddEntity(a) => a,
            Action::AddVertex(a) => a,
            Action::AddMidpoint(a) => a,
            Action::AddMember(a) => a,
            Action::ChangeTags(a) => a,
            Action::MoveNode(a) => a,
            Action::DeleteMember(a) => a,
            Action::DiscardTags(a) => a,
            Action::DeleteNode(a) => a,
            Action::DeleteWay(a) => a,
            Action::DeleteRelation(a) => a,
            Action::Split(a) => a,
            Action::MergeNodes(a) => a,
            Action::Noop => &Noop,
        }
    }
}

impl ActionOp for Action {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        self.op().apply(graph)
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        self.op().disabled(graph)
    }

    fn name(&self) -> &'static str {
        self.op().name()
    }
}

macro_rules! impl_from_action {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Action {
                fn from(action: $variant) -> Self {
                    Action::$variant(action)
                }
            }
        )*
    };
}

impl_from_action!(
    AddEntity,
    AddVertex,
    AddMidpoint,
    AddMember,
    ChangeTags,
    MoveNode,
    DeleteMember,
    DiscardTags,
    DeleteNode,
    DeleteWay,
    DeleteRelation,
    Split,
    MergeNodes,
);
