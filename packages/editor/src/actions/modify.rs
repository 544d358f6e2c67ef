//! Actions that change an existing entity in place

use super::delete::delete_relation;
use super::{ActionOp, DisabledReason};
use crate::errors::ActionError;
use atlas_graph::{Difference, EntityId, EntityKind, Graph, Loc, Tags};
use serde::{Deserialize, Serialize};

/// Replace the whole tag set of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeTags {
    pub entity: EntityId,
    pub tags: Tags,
}

impl ChangeTags {
    pub fn new(entity: EntityId, tags: Tags) -> Self {
        Self { entity, tags }
    }
}

impl ActionOp for ChangeTags {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        let entity = graph.entity(self.entity)?;
        Ok(graph.replace(entity.with_tags(self.tags.clone())))
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        graph
            .has_entity(self.entity)
            .is_none()
            .then_some(DisabledReason::NotFound)
    }

    fn name(&self) -> &'static str {
        "change_tags"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveNode {
    pub node: EntityId,
    pub loc: Loc,
}

impl MoveNode {
    pub fn new(node: EntityId, loc: impl Into<Loc>) -> Self {
        Self {
            node,
            loc: loc.into(),
        }
    }
}

impl ActionOp for MoveNode {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        let node = graph.node(self.node)?;
        Ok(graph.replace(node.with_loc(self.loc)))
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        if self.node.kind() != EntityKind::Node {
            return Some(DisabledReason::NotEligible);
        }
        graph
            .has_entity(self.node)
            .is_none()
            .then_some(DisabledReason::NotFound)
    }

    fn name(&self) -> &'static str {
        "move_node"
    }
}

/// Remove the member at `index`; a relation left empty is deleted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteMember {
    pub relation: EntityId,
    pub index: usize,
}

impl DeleteMember {
    pub fn new(relation: EntityId, index: usize) -> Self {
        Self { relation, index }
    }
}

impl ActionOp for DeleteMember {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        graph.try_update(|u| -> Result<(), ActionError> {
            let relation = u
                .relation(self.relation)?
                .remove_member(self.index)
                .map_err(|_| ActionError::InvalidIndex {
                    id: self.relation,
                    index: self.index,
                })?;
            let degenerate = relation.is_degenerate();
            u.replace(relation);
            if degenerate {
                delete_relation(u, self.relation)?;
            }
            Ok(())
        })
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        match graph.relation(self.relation) {
            Err(_) => Some(DisabledReason::NotFound),
            Ok(relation) if self.index >= relation.members().len() => Some(DisabledReason::InvalidIndex),
            Ok(_) => None,
        }
    }

    fn name(&self) -> &'static str {
        "delete_member"
    }
}

/// Strip `keys` from the given entities where present
///
/// Missing entities are skipped; entities without any of the keys are left
/// as they are (same version).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscardTags {
    pub ids: Vec<EntityId>,
    pub keys: Vec<String>,
}

impl DiscardTags {
    pub fn new(ids: Vec<EntityId>, keys: Vec<String>) -> Self {
        Self { ids, keys }
    }

    /// Target the created and modified entities of an upload
    pub fn for_difference(difference: &Difference, keys: &[String]) -> Self {
        Self {
            ids: difference.extant_ids().into_iter().collect(),
            keys: keys.to_vec(),
        }
    }
}

impl ActionOp for DiscardTags {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        Ok(graph.update(|u| {
            for id in &self.ids {
                let Some(entity) = u.has_entity(*id) else {
                    continue;
                };
                if !self.keys.iter().any(|k| entity.tags().contains_key(k)) {
                    continue;
                }
                let mut tags = entity.tags().clone();
                tags.retain(|k, _| !self.keys.contains(k));
                let stripped = entity.with_tags(tags);
                u.replace(stripped);
            }
        }))
    }

    fn name(&self) -> &'static str {
        "discard_tags"
    }
}
