//! # Rebase
//!
//! Merge freshly fetched entities into the base of a graph while keeping the
//! local edits on top.
//!
//! A [`Rebase`] computes the new base once and can then re-derive any number
//! of graphs that shared the old base (every edit of a history, every
//! checkpoint).

use crate::entity::Entity;
use crate::graph::{Graph, GraphUpdate, IdSet};
use crate::id::EntityId;
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Something a rebase had to decide about a locally edited entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RebaseConflict {
    /// Fetched value ignored, the local edit stays on top
    LocalKept(EntityId),
    /// Local edit dropped in favour of the fetched value
    RemoteForced(EntityId),
    /// Local deletion undone: a fetched way still uses the node
    Restored(EntityId),
}

impl RebaseConflict {
    pub fn id(&self) -> EntityId {
        match self {
            RebaseConflict::LocalKept(id)
            | RebaseConflict::RemoteForced(id)
            | RebaseConflict::Restored(id) => *id,
        }
    }
}

impl fmt::Display for RebaseConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebaseConflict::LocalKept(id) => write!(f, "{id}: local edit kept over fetched value"),
            RebaseConflict::RemoteForced(id) => write!(f, "{id}: local edit replaced by fetched value"),
            RebaseConflict::Restored(id) => write!(f, "{id}: deletion undone, node used by a fetched way"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rebase {
    base: Graph,
    fetched: IdSet,
    fetched_way_nodes: IdSet,
    force: bool,
}

impl Rebase {
    /// Build the new base from `graph`'s base plus `entities`
    ///
    /// Fetched values always replace the old base values. `force` only
    /// decides whether local edits to fetched IDs survive [`Rebase::apply`].
    pub fn new(graph: &Graph, entities: impl IntoIterator<Item = Entity>, force: bool) -> Self {
        let old_base = graph.base();
        let mut update = GraphUpdate::from_base(&old_base);
        let mut fetched = IdSet::new();
        let mut fetched_way_nodes = IdSet::new();
        let mut refreshed = 0usize;

        for entity in entities {
            let id = entity.id();
            if old_base.has_entity(id).is_some() {
                refreshed += 1;
            }
            if let Entity::Way(way) = &entity {
                fetched_way_nodes.extend(way.nodes().iter().copied());
            }
            update.replace(entity);
            fetched.insert(id);
        }

        debug!(fetched = fetched.len(), refreshed, force, "Computed rebased base graph");

        Self {
            base: update.finish(),
            fetched,
            fetched_way_nodes,
            force,
        }
    }

    pub fn base(&self) -> &Graph {
        &self.base
    }

    /// IDs that entered the base
    pub fn fetched(&self) -> &IdSet {
        &self.fetched
    }

    /// Re-derive `graph` over the new base. The result has depth ≤ 1.
    pub fn apply(&self, graph: &Graph) -> (Graph, Vec<RebaseConflict>) {
        if graph.is_base() {
            return (self.base.clone(), Vec::new());
        }

        let mut locals: Vec<(EntityId, Option<_>)> = graph.local_entries().into_iter().collect();
        locals.sort_by_key(|(id, _)| *id);

        let mut conflicts = Vec::new();
        let mut update = GraphUpdate::over(&self.base);

        for (id, value) in locals {
            if value.is_none()
                && self.fetched_way_nodes.contains(&id)
                && self.base.has_entity(id).is_some()
            {
                conflicts.push(RebaseConflict::Restored(id));
                continue;
            }

            if self.fetched.contains(&id) {
                if self.force {
                    conflicts.push(RebaseConflict::RemoteForced(id));
                    continue;
                }
                conflicts.push(RebaseConflict::LocalKept(id));
            }

            update.put(id, value);
        }

        (update.finish(), conflicts)
    }
}

impl Graph {
    /// Rebase a single graph. See [`Rebase`].
    pub fn rebase(
        &self,
        entities: impl IntoIterator<Item = Entity>,
        force: bool,
    ) -> (Graph, Vec<RebaseConflict>) {
        Rebase::new(self, entities, force).apply(self)
    }
}
