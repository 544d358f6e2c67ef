//! # Atlas Editor
//!
//! Edit engine over [`atlas_graph`] snapshots.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ actions: Graph → Graph                      │
//! │  - disabled() query before apply            │
//! │  - cascading deletes, split, merge          │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ history: stack of snapshots + cursor        │
//! │  - integrity checks on every commit         │
//! │  - undo / redo / checkpoints / rebase       │
//! │  - change events                            │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ recovery: stack → JSON → stack              │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Graphs are values**: undo is moving a cursor, never an inverse edit
//! 2. **All or nothing**: a rejected edit leaves the history untouched
//! 3. **Explicit IDs**: new entity IDs come from the session's `IdAllocator`

pub mod actions;
mod config;
mod errors;
mod events;
mod history;
mod integrity;
mod recovery;

pub use actions::{
    Action, ActionOp, AddEntity, AddMember, AddMidpoint, AddVertex, ChangeTags, DeleteMember, DeleteNode,
    DeleteRelation, DeleteWay, DisabledReason, DiscardTags, MergeNodes, MoveNode, Split,
};
pub use config::{EditorConfig, DEFAULT_CONFIG_NAME};
pub use errors::{ActionError, EditorError};
pub use events::{EventEmitter, EventKind, HistoryEvent, SubscriptionId};
pub use history::{Edit, History};
pub use integrity::{
    IndexConsistency, IntegrityCheck, IntegrityEngine, Identity, MonotonicVersion, NoDanglingParents,
    ReferencesResolve, SessionIds, Violation,
};
pub use recovery::{entity_key, RecoveryEdit, RecoveryLog, RECOVERY_VERSION};
