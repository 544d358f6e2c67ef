//! # Atlas Graph
//!
//! Versioned, structurally shared graph of map entities.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ entity: Node / Way / Relation values        │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ graph: base + delta layers                  │
//! │  - O(1) replace / remove                    │
//! │  - parent-way / parent-relation indices     │
//! │  - rebase fetched entities under edits      │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ difference: snapshot A vs B → changeset     │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Snapshots never change**: every edit yields a new `Graph`
//! 2. **Share, don't copy**: untouched entities are the same `Arc` in every snapshot
//! 3. **Integrity is checked at commit**: the graph tolerates dangling
//!    references while an edit is being built
//!
//! ## Usage
//!
//! ```rust
//! use atlas_graph::{Difference, EntityId, Graph, Node, Way};
//!
//! let a = EntityId::node(1);
//! let b = EntityId::node(2);
//! let base = Graph::new(vec![
//!     Node::new(a, [0.0, 0.0]).into(),
//!     Node::new(b, [1.0, 0.0]).into(),
//!     Way::new(EntityId::way(1), vec![a, b]).into(),
//! ]);
//!
//! let moved = base.replace(base.node(a).unwrap().with_loc([0.0, 1.0]));
//! assert_eq!(Difference::new(&base, &moved).len(), 1);
//! assert_eq!(moved.parent_ways(a).len(), 1);
//! ```

mod difference;
mod entity;
mod error;
mod graph;
mod id;
mod rebase;

pub use difference::{Change, Counts, Difference, Summary};
pub use entity::{
    is_interesting_tag, tags, Affix, Entity, Geometry, Loc, Member, Node, Relation, Tags, Way,
};
pub use error::{GraphError, GraphResult};
pub use graph::{Graph, GraphUpdate, IdSet, DEFAULT_MAX_DEPTH};
pub use id::{EntityId, EntityKind, IdAllocator};
pub use rebase::{Rebase, RebaseConflict};
