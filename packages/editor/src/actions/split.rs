//! # Split
//!
//! Divide ways at a shared vertex.
//!
//! - An open way `[.., node, ..]` becomes `[..=node]` (keeps its ID) and
//!   `[node..]` (new ID, same tags)
//! - A closed way is cut at the node and at the vertex half-way around the
//!   ring, counted by index
//! - The new way joins every relation the original belongs to, with the
//!   same role, placed next to the original so route order is preserved

use super::{ActionOp, DisabledReason};
use crate::errors::ActionError;
use atlas_graph::{EntityId, EntityKind, Graph, GraphUpdate, IdAllocator, Member, Relation, Way};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub node: EntityId,
    /// Restrict the split to these ways
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ways: Option<Vec<EntityId>>,
    /// IDs for the new ways, consumed in candidate order
    pub new_way_ids: Vec<EntityId>,
}

impl Split {
    pub fn new(node: EntityId, ways: Option<Vec<EntityId>>, new_way_ids: Vec<EntityId>) -> Self {
        Self {
            node,
            ways,
            new_way_ids,
        }
    }

    /// Build a split with exactly one fresh ID per candidate way
    pub fn prepare(
        graph: &Graph,
        node: EntityId,
        ways: Option<Vec<EntityId>>,
        ids: &mut IdAllocator,
    ) -> Self {
        let mut split = Self::new(node, ways, Vec::new());
        let needed = split.candidates(graph).len();
        split.new_way_ids = (0..needed).map(|_| ids.next(EntityKind::Way)).collect();
        split
    }

    /// Ways this split would divide, sorted by ID.
    ///
    /// Without an explicit way list, lines are preferred over areas when the
    /// node has both.
    pub fn candidates<'g>(&self, graph: &'g Graph) -> Vec<&'g Way> {
        let parents = graph.parent_ways(self.node);
        let has_lines = parents.iter().any(|way| !way.is_area());

        parents
            .into_iter()
            .filter(|way| match &self.ways {
                Some(only) => only.contains(&way.id()),
                None => !has_lines || !way.is_area(),
            })
            .filter(|way| {
                if way.is_closed() {
                    return true;
                }
                let nodes = way.nodes();
                nodes.len() > 2 && nodes[1..nodes.len() - 1].contains(&self.node)
            })
            .collect()
    }
}

impl ActionOp for Split {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        let candidates: Vec<EntityId> = self.candidates(graph).iter().map(|w| w.id()).collect();
        if candidates.is_empty() {
            return Err(ActionError::Disabled(DisabledReason::NotEligible));
        }
        if self.new_way_ids.len() < candidates.len() {
            return Err(ActionError::MissingIds {
                needed: candidates.len(),
                given: self.new_way_ids.len(),
            });
        }

        debug!(node = %self.node, ways = candidates.len(), "Splitting ways");

        graph.try_update(|u| -> Result<(), ActionError> {
            for (way_id, new_id) in candidates.iter().zip(&self.new_way_ids) {
                split_way(u, self.node, *way_id, *new_id)?;
            }
            Ok(())
        })
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        let candidates = self.candidates(graph);
        let restricted_miss = self
            .ways
            .as_ref()
            .is_some_and(|only| only.len() != candidates.len());

        if candidates.is_empty() || restricted_miss {
            return Some(DisabledReason::NotEligible);
        }
        if self.new_way_ids.len() < candidates.len() {
            return Some(DisabledReason::MissingIds);
        }
        None
    }

    fn name(&self) -> &'static str {
        "split"
    }
}

fn split_way(u: &mut GraphUpdate, node: EntityId, way_id: EntityId, new_id: EntityId) -> Result<(), ActionError> {
    let way_a = u.way(way_id)?.clone();
    let halves = if way_a.is_closed() {
        split_ring(&way_a.nodes()[..way_a.nodes().len() - 1], node)
    } else {
        split_line(way_a.nodes(), node)
    };
    let (nodes_a, nodes_b) = halves.ok_or(ActionError::Disabled(DisabledReason::NotEligible))?;

    let way_a = way_a.with_nodes(nodes_a);
    let way_b = Way::new(new_id, nodes_b).with_tags(way_a.tags().clone());

    u.replace(way_a.clone());
    u.replace(way_b.clone());

    for rel_id in u.parent_relation_ids(way_id) {
        let relation = u.relation(rel_id)?.clone();
        let updated = insert_after_original(&relation, &way_a, &way_b, u);
        u.replace(updated);
    }
    Ok(())
}

fn split_line(nodes: &[EntityId], node: EntityId) -> Option<(Vec<EntityId>, Vec<EntityId>)> {
    let idx = nodes.iter().skip(1).position(|n| *n == node)? + 1;
    Some((nodes[..=idx].to_vec(), nodes[idx..].to_vec()))
}

/// `ring` excludes the closing node
fn split_ring(ring: &[EntityId], node: EntityId) -> Option<(Vec<EntityId>, Vec<EntityId>)> {
    let len = ring.len();
    let idx_a = ring.iter().position(|n| *n == node)?;
    let idx_b = (idx_a + len / 2) % len;

    let (nodes_a, nodes_b) = if idx_b < idx_a {
        (
            [&ring[idx_a..], &ring[..=idx_b]].concat(),
            ring[idx_b..=idx_a].to_vec(),
        )
    } else {
        (
            ring[idx_a..=idx_b].to_vec(),
            [&ring[idx_b..], &ring[..=idx_a]].concat(),
        )
    };
    Some((nodes_a, nodes_b))
}

/// Add `way_b` next to each `way_a` membership, before it when the member
/// preceding `way_a` connects to `way_b` instead
fn insert_after_original(relation: &Relation, way_a: &Way, way_b: &Way, u: &GraphUpdate) -> Relation {
    let mut members: Vec<Member> = Vec::with_capacity(relation.members().len() + 1);

    for (i, member) in relation.members().iter().enumerate() {
        if member.id != way_a.id() {
            members.push(member.clone());
            continue;
        }

        let inserted = Member::new(way_b.id(), member.role.clone());
        let previous_connects_to_b = i
            .checked_sub(1)
            .and_then(|p| relation.members().get(p))
            .and_then(|prev| u.has_entity(prev.id))
            .and_then(|prev| prev.as_way().map(|w| shares_endpoint(w, way_b)))
            .unwrap_or(false);

        if previous_connects_to_b {
            members.push(inserted);
            members.push(member.clone());
        } else {
            members.push(member.clone());
            members.push(inserted);
        }
    }

    relation.with_members(members)
}

fn shares_endpoint(a: &Way, b: &Way) -> bool {
    let ends = [a.first(), a.last()];
    ends.contains(&b.first()) || ends.contains(&b.last())
}
