//! # Difference
//!
//! Reduce two snapshots that share a base to the entities that differ.
//!
//! Only the IDs touched above the base are inspected, so the cost is
//! proportional to the size of the edit, not of the graph.

use crate::entity::Entity;
use crate::graph::{Graph, IdSet};
use crate::id::{EntityId, EntityKind};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// An entity present on both sides with a different value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    pub from: Arc<Entity>,
    pub to: Arc<Entity>,
}

/// Created / modified / deleted entities, each list sorted by ID
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Difference {
    created: Vec<Arc<Entity>>,
    modified: Vec<Change>,
    deleted: Vec<Arc<Entity>>,
}

impl Difference {
    pub fn new(from: &Graph, to: &Graph) -> Self {
        if from.ptr_eq(to) {
            return Self::default();
        }

        let mut ids = from.local_ids();
        ids.extend(to.local_ids());

        if !from.base().ptr_eq(&to.base()) {
            debug!("Graphs do not share a base, comparing every entity");
            ids.extend(from.entity_ids());
            ids.extend(to.entity_ids());
        }

        let mut diff = Self::default();
        for id in ids {
            match (from.has_entity(id), to.has_entity(id)) {
                (None, Some(created)) => diff.created.push(Arc::clone(created)),
                (Some(deleted), None) => diff.deleted.push(Arc::clone(deleted)),
                (Some(a), Some(b)) if !Arc::ptr_eq(a, b) && a != b => diff.modified.push(Change {
                    from: Arc::clone(a),
                    to: Arc::clone(b),
                }),
                _ => {}
            }
        }
        diff
    }

    pub fn created(&self) -> &[Arc<Entity>] {
        &self.created
    }

    pub fn modified(&self) -> &[Change] {
        &self.modified
    }

    pub fn deleted(&self) -> &[Arc<Entity>] {
        &self.deleted
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.created.len() + self.modified.len() + self.deleted.len()
    }

    /// IDs that still exist on the `to` side (created or modified)
    pub fn extant_ids(&self) -> IdSet {
        self.created
            .iter()
            .map(|e| e.id())
            .chain(self.modified.iter().map(|c| c.to.id()))
            .collect()
    }

    /// Every changed ID
    pub fn ids(&self) -> IdSet {
        let mut ids = self.extant_ids();
        ids.extend(self.deleted.iter().map(|e| e.id()));
        ids
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for entity in &self.created {
            summary.counts_mut(entity.kind()).created += 1;
        }
        for change in &self.modified {
            summary.counts_mut(change.to.kind()).modified += 1;
        }
        for entity in &self.deleted {
            summary.counts_mut(entity.kind()).deleted += 1;
        }
        summary
    }

    /// Changed entities plus the neighbours a renderer must redraw.
    ///
    /// Adds the nodes that entered or left a changed way, the members of a
    /// changed multipolygon, and the parent ways and relations of every
    /// changed entity, all resolved in `head` (`None` = gone).
    pub fn complete(&self, head: &Graph) -> BTreeMap<EntityId, Option<Arc<Entity>>> {
        let mut result = BTreeMap::new();
        let lookup = |id: EntityId| head.has_entity(id).cloned();

        let pairs = self
            .created
            .iter()
            .map(|e| (None, Some(e)))
            .chain(self.modified.iter().map(|c| (Some(&c.from), Some(&c.to))))
            .chain(self.deleted.iter().map(|e| (Some(e), None)));

        for (base, current) in pairs {
            let Some(entity) = current.or(base) else {
                continue;
            };
            let id = entity.id();
            result.insert(id, current.cloned());

            if let Entity::Way(_) = entity.as_ref() {
                let nodes_of = |e: Option<&Arc<Entity>>| -> IdSet {
                    e.and_then(|e| e.as_way())
                        .map(|w| w.nodes().iter().copied().collect())
                        .unwrap_or_default()
                };
                let (before, after) = (nodes_of(base), nodes_of(current));
                for node in before.symmetric_difference(&after) {
                    result.insert(*node, lookup(*node));
                }
            }

            if let Some(relation) = entity.as_relation().filter(|r| r.is_multipolygon()) {
                for member in relation.members() {
                    result.insert(member.id, lookup(member.id));
                }
            }

            for parent in head.parent_way_ids(id).chain(head.parent_relation_ids(id)) {
                result.insert(parent, lookup(parent));
            }
        }

        result
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub created: usize,
    pub modified: usize,
    pub deleted: usize,
}

impl Counts {
    pub fn total(&self) -> usize {
        self.created + self.modified + self.deleted
    }
}

impl std::ops::Add for Counts {
    type Output = Counts;

    fn add(self, rhs: Counts) -> Counts {
        Counts {
            created: self.created + rhs.created,
            modified: self.modified + rhs.modified,
            deleted: self.deleted + rhs.deleted,
        }
    }
}

/// Per-kind change counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub nodes: Counts,
    pub ways: Counts,
    pub relations: Counts,
}

impl Summary {
    pub fn totals(&self) -> Counts {
        self.nodes + self.ways + self.relations
    }

    fn counts_mut(&mut self, kind: EntityKind) -> &mut Counts {
        match kind {
            EntityKind::Node => &mut self.nodes,
            EntityKind::Way => &mut self.ways,
            EntityKind::Relation => &mut self.relations,
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let totals = self.totals();
        write!(
            f,
            "{} created, {} modified, {} deleted",
            totals.created, totals.modified, totals.deleted
        )?;
        for (label, counts) in [("nodes", self.nodes), ("ways", self.ways), ("relations", self.relations)] {
            if counts.total() > 0 {
                write!(f, "; {label} {}/{}/{}", counts.created, counts.modified, counts.deleted)?;
            }
        }
        Ok(())
    }
}
