//! Deletion with cascades
//!
//! The recursive helpers work on one [`GraphUpdate`] so a whole cascade lands
//! in a single layer. Each helper tolerates entities that an earlier step of
//! the same cascade already removed.

use super::{ActionOp, DisabledReason};
use crate::errors::ActionError;
use atlas_graph::{EntityId, EntityKind, Graph, GraphUpdate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteNode {
    pub node: EntityId,
}

impl DeleteNode {
    pub fn new(node: EntityId) -> Self {
        Self { node }
    }
}

impl ActionOp for DeleteNode {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        graph.try_update(|u| delete_node(u, self.node))
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        graph.node(self.node).is_err().then_some(DisabledReason::NotFound)
    }

    fn name(&self) -> &'static str {
        "delete_node"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteWay {
    pub way: EntityId,
}

impl DeleteWay {
    pub fn new(way: EntityId) -> Self {
        Self { way }
    }
}

impl ActionOp for DeleteWay {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        graph.try_update(|u| delete_way(u, self.way))
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        if graph.way(self.way).is_err() {
            return Some(DisabledReason::NotFound);
        }
        let breaks_area = graph
            .parent_relations(self.way)
            .iter()
            .any(|rel| rel.is_multipolygon() && rel.members().len() > 1);
        breaks_area.then_some(DisabledReason::Part)
    }

    fn name(&self) -> &'static str {
        "delete_way"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteRelation {
    pub relation: EntityId,
}

impl DeleteRelation {
    pub fn new(relation: EntityId) -> Self {
        Self { relation }
    }
}

impl ActionOp for DeleteRelation {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        graph.try_update(|u| delete_relation(u, self.relation))
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        match graph.relation(self.relation) {
            Err(_) => Some(DisabledReason::NotFound),
            Ok(relation) if !relation.is_complete(graph) => Some(DisabledReason::IncompleteRelation),
            Ok(_) => None,
        }
    }

    fn name(&self) -> &'static str {
        "delete_relation"
    }
}

pub(super) fn delete_node(u: &mut GraphUpdate, id: EntityId) -> Result<(), ActionError> {
    u.node(id)?;

    for way_id in u.parent_way_ids(id) {
        let Ok(way) = u.way(way_id) else {
            continue;
        };
        let way = way.remove_node(id);
        let degenerate = way.is_degenerate();
        u.replace(way);
        if degenerate {
            delete_way(u, way_id)?;
        }
    }

    for rel_id in u.parent_relation_ids(id) {
        remove_from_relation(u, rel_id, id)?;
    }

    u.remove(id);
    Ok(())
}

pub(super) fn delete_way(u: &mut GraphUpdate, id: EntityId) -> Result<(), ActionError> {
    let way = u.way(id)?.clone();

    for rel_id in u.parent_relation_ids(id) {
        remove_from_relation(u, rel_id, id)?;
    }
    u.remove(id);

    let mut seen = Vec::new();
    for node in way.nodes() {
        if seen.contains(node) {
            continue;
        }
        seen.push(*node);
        if is_orphaned(u, *node) {
            u.remove(*node);
        }
    }
    Ok(())
}

pub(super) fn delete_relation(u: &mut GraphUpdate, id: EntityId) -> Result<(), ActionError> {
    let relation = u.relation(id)?.clone();

    for parent in u.parent_relation_ids(id) {
        if parent != id {
            remove_from_relation(u, parent, id)?;
        }
    }
    u.remove(id);

    let mut seen = Vec::new();
    for member in relation.members() {
        if seen.contains(&member.id) {
            continue;
        }
        seen.push(member.id);
        if is_orphaned(u, member.id) {
            delete_entity(u, member.id)?;
        }
    }
    Ok(())
}

fn delete_entity(u: &mut GraphUpdate, id: EntityId) -> Result<(), ActionError> {
    match id.kind() {
        EntityKind::Node => delete_node(u, id),
        EntityKind::Way => delete_way(u, id),
        EntityKind::Relation => delete_relation(u, id),
    }
}

/// Drop `member` from `rel_id`, deleting the relation if nothing is left
fn remove_from_relation(u: &mut GraphUpdate, rel_id: EntityId, member: EntityId) -> Result<(), ActionError> {
    let Ok(relation) = u.relation(rel_id) else {
        return Ok(());
    };
    let relation = relation.remove_members_with_id(member);
    let degenerate = relation.is_degenerate();
    u.replace(relation);
    if degenerate {
        delete_relation(u, rel_id)?;
    }
    Ok(())
}

/// Present, without parents and without meaningful tags
fn is_orphaned(u: &GraphUpdate, id: EntityId) -> bool {
    let Some(entity) = u.has_entity(id) else {
        return false;
    };
    u.parent_way_ids(id).is_empty()
        && u.parent_relation_ids(id).is_empty()
        && !entity.has_interesting_tags()
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_graph::{tags, Member, Node, Relation, Way};

    fn n(num: i64) -> EntityId {
        EntityId::node(num)
    }

    fn w(num: i64) -> EntityId {
        EntityId::way(num)
    }

    fn r(num: i64) -> EntityId {
        EntityId::relation(num)
    }

    /// Two ways sharing n2; n4 is a tagged vertex of w2
    fn graph() -> Graph {
        Graph::new(vec![
            Node::new(n(1), [0.0, 0.0]).into(),
            Node::new(n(2), [1.0, 0.0]).into(),
            Node::new(n(3), [2.0, 0.0]).into(),
            Node::new(n(4), [1.0, 1.0]).with_tags(tags([("highway", "stop")])).into(),
            Way::new(w(1), vec![n(1), n(2)]).into(),
            Way::new(w(2), vec![n(2), n(3), n(4)]).into(),
            Relation::new(r(1), vec![Member::new(w(1), "route"), Member::new(n(3), "stop")]).into(),
        ])
    }

    #[test]
    fn test_delete_node_removes_references() {
        let graph = graph();
        let next = DeleteNode::new(n(3)).apply(&graph).unwrap();

        assert!(next.has_entity(n(3)).is_none());
        assert_eq!(next.way(w(2)).unwrap().nodes(), &[n(2), n(4)]);
        assert_eq!(next.relation(r(1)).unwrap().members(), &[Member::new(w(1), "route")]);
    }

    #[test]
    fn test_delete_node_deletes_degenerate_parent_way() {
        let graph = graph();
        let next = DeleteNode::new(n(1)).apply(&graph).unwrap();

        assert!(next.has_entity(w(1)).is_none());
        // n2 still belongs to w2
        assert!(next.has_entity(n(2)).is_some());
        assert_eq!(next.relation(r(1)).unwrap().members(), &[Member::new(n(3), "stop")]);
    }

    #[test]
    fn test_delete_way_removes_orphan_untagged_nodes() {
        let graph = graph();
        let next = DeleteWay::new(w(2)).apply(&graph).unwrap();

        assert!(next.has_entity(w(2)).is_none());
        // shared with w1
        assert!(next.has_entity(n(2)).is_some());
        // member of r1
        assert!(next.has_entity(n(3)).is_some());
        // interesting tags
        assert!(next.has_entity(n(4)).is_some());
    }

    #[test]
    fn test_delete_way_cascades_to_empty_relation() {
        let graph = graph().replace(Relation::new(r(2), vec![Member::new(w(2), "")]));
        let next = DeleteWay::new(w(2)).apply(&graph).unwrap();
        assert!(next.has_entity(r(2)).is_none());
    }

    #[test]
    fn test_delete_way_disabled_for_multipolygon_part() {
        let mp = Relation::new(r(5), vec![Member::new(w(1), "outer"), Member::new(w(2), "inner")])
            .with_tags(tags([("type", "multipolygon")]));
        let graph = graph().replace(mp);
        assert_eq!(DeleteWay::new(w(1)).disabled(&graph), Some(DisabledReason::Part));
        assert_eq!(DeleteWay::new(w(9)).disabled(&graph), Some(DisabledReason::NotFound));
    }

    #[test]
    fn test_delete_relation_deletes_orphaned_members() {
        let graph = graph();
        let next = DeleteRelation::new(r(1)).apply(&graph).unwrap();

        assert!(next.has_entity(r(1)).is_none());
        // w1 was only held by r1, and takes its own orphan n1 along
        assert!(next.has_entity(w(1)).is_none());
        assert!(next.has_entity(n(1)).is_none());
        // still vertices of w2
        assert!(next.has_entity(n(2)).is_some());
        assert!(next.has_entity(n(3)).is_some());

        let lonely = graph
            .replace(Node::new(n(9), [5.0, 5.0]))
            .replace(Relation::new(r(2), vec![Member::new(n(9), "label")]));
        let next = DeleteRelation::new(r(2)).apply(&lonely).unwrap();
        assert!(next.has_entity(n(9)).is_none());
    }

    #[test]
    fn test_delete_relation_disabled_when_incomplete() {
        let graph = graph().replace(Relation::new(r(3), vec![Member::new(w(99), "")]));
        assert_eq!(
            DeleteRelation::new(r(3)).disabled(&graph),
            Some(DisabledReason::IncompleteRelation)
        );
    }

    #[test]
    fn test_deleting_twice_fails() {
        let graph = graph();
        let once = DeleteNode::new(n(3)).apply(&graph).unwrap();
        assert!(matches!(
            DeleteNode::new(n(3)).apply(&once),
            Err(ActionError::Graph(_))
        ));
    }
}
