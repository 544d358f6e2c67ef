//! Collapse several nodes into one

use super::delete::{delete_node, delete_way};
use super::{ActionOp, DisabledReason};
use crate::errors::ActionError;
use atlas_graph::{Entity, EntityId, EntityKind, Graph, GraphResult, IdSet, Loc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Merge `nodes` into a single survivor at `loc`
///
/// The survivor is the oldest ID among the non-new nodes carrying
/// interesting tags, else the oldest ID overall. Without an explicit `loc`
/// the nodes meet at the single interesting node, or at their average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeNodes {
    pub nodes: Vec<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<Loc>,
}

impl MergeNodes {
    pub fn new(nodes: Vec<EntityId>, loc: Option<Loc>) -> Self {
        Self { nodes, loc }
    }

    pub fn survivor(&self, graph: &Graph) -> GraphResult<Option<EntityId>> {
        let mut interesting = Vec::new();
        for id in &self.nodes {
            let node = graph.entity(*id)?;
            if node.has_interesting_tags() && !id.is_new() {
                interesting.push(*id);
            }
        }
        if interesting.is_empty() {
            Ok(EntityId::oldest(&self.nodes))
        } else {
            Ok(EntityId::oldest(&interesting))
        }
    }

    fn target_loc(&self, graph: &Graph) -> GraphResult<Loc> {
        if let Some(loc) = self.loc {
            return Ok(loc);
        }

        let mut sum = Loc::new(0.0, 0.0);
        let mut interesting = Vec::new();
        for id in &self.nodes {
            let node = graph.node(*id)?;
            if graph.entity(*id)?.has_interesting_tags() {
                interesting.push(node.loc());
            }
            sum.lon += node.loc().lon;
            sum.lat += node.loc().lat;
        }

        match interesting.as_slice() {
            [only] => Ok(*only),
            _ => {
                let count = self.nodes.len() as f64;
                Ok(Loc::new(sum.lon / count, sum.lat / count))
            }
        }
    }
}

impl ActionOp for MergeNodes {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        if self.nodes.len() < 2 {
            return Err(ActionError::Disabled(DisabledReason::NotEligible));
        }
        let loc = self.target_loc(graph)?;
        let survivor_id = self
            .survivor(graph)?
            .ok_or(ActionError::Disabled(DisabledReason::NotEligible))?;

        graph.try_update(|u| -> Result<(), ActionError> {
            for id in &self.nodes {
                let node = u.node(*id)?;
                if node.loc() != loc {
                    let moved = node.with_loc(loc);
                    u.replace(moved);
                }
            }

            let mut survivor = Entity::Node(u.node(survivor_id)?.clone());

            for id in &self.nodes {
                let id = *id;
                if id == survivor_id {
                    continue;
                }
                for way_id in u.parent_way_ids(id) {
                    let way = u.way(way_id)?.replace_node(id, survivor_id);
                    u.replace(way);
                }
                for rel_id in u.parent_relation_ids(id) {
                    let relation = u.relation(rel_id)?.replace_member(id, survivor_id);
                    u.replace(relation);
                }
                let tags = u.node(id)?.tags().clone();
                survivor = survivor.merge_tags(&tags);
                delete_node(u, id)?;
            }

            u.replace(survivor);

            for way_id in u.parent_way_ids(survivor_id) {
                if u.way(way_id).is_ok_and(|way| way.is_degenerate()) {
                    delete_way(u, way_id)?;
                }
            }
            Ok(())
        })
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        if self.nodes.len() < 2 || self.nodes.iter().any(|id| id.kind() != EntityKind::Node) {
            return Some(DisabledReason::NotEligible);
        }
        if self.nodes.iter().any(|id| graph.has_entity(*id).is_none()) {
            return Some(DisabledReason::NotFound);
        }

        let mut roles: BTreeMap<EntityId, &str> = BTreeMap::new();
        for id in &self.nodes {
            for relation in graph.parent_relations(*id) {
                let role = relation
                    .member_by_id(*id)
                    .map(|(_, m)| m.role.as_str())
                    .unwrap_or("");
                match roles.get(&relation.id()) {
                    Some(seen) if *seen != role => return Some(DisabledReason::Relation),
                    _ => {
                        roles.insert(relation.id(), role);
                    }
                }
            }
        }

        let merging: IdSet = self.nodes.iter().copied().collect();
        let collapses_way = self.nodes.iter().any(|id| {
            graph
                .parent_ways(*id)
                .iter()
                .any(|way| way.nodes().iter().all(|n| merging.contains(n)))
        });
        if collapses_way {
            return Some(DisabledReason::Vertex);
        }
        None
    }

    fn name(&self) -> &'static str {
        "merge_nodes"
    }
}
