//! Actions that add entities or references

use super::{ActionOp, DisabledReason};
use crate::errors::ActionError;
use atlas_graph::{Entity, EntityId, EntityKind, Graph, GraphError, IdSet, Loc, Member, Node};
use serde::{Deserialize, Serialize};

/// Insert a new entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddEntity {
    pub entity: Entity,
}

impl AddEntity {
    pub fn new(entity: impl Into<Entity>) -> Self {
        Self {
            entity: entity.into(),
        }
    }
}

impl ActionOp for AddEntity {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        Ok(graph.replace(self.entity.clone()))
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        graph
            .has_entity(self.entity.id())
            .map(|_| DisabledReason::NotEligible)
    }

    fn name(&self) -> &'static str {
        "add_entity"
    }
}

/// Insert a node reference into a way (append when `index` is `None`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddVertex {
    pub way: EntityId,
    pub node: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl AddVertex {
    pub fn new(way: EntityId, node: EntityId, index: Option<usize>) -> Self {
        Self { way, node, index }
    }
}

impl ActionOp for AddVertex {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        let way = graph.way(self.way)?;
        let updated = way.add_node(self.node, self.index).map_err(|e| match e {
            GraphError::IndexOutOfRange { index, .. } => ActionError::InvalidIndex { id: self.way, index },
            other => ActionError::Graph(other),
        })?;
        Ok(graph.replace(updated))
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        let Ok(way) = graph.way(self.way) else {
            return Some(DisabledReason::NotFound);
        };
        if self.node.kind() != EntityKind::Node {
            return Some(DisabledReason::Vertex);
        }
        let max = if way.is_closed() {
            way.nodes().len() - 1
        } else {
            way.nodes().len()
        };
        match self.index {
            Some(index) if index > max => Some(DisabledReason::InvalidIndex),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        "add_vertex"
    }
}

/// Place `node` at `loc` and splice it into every way containing `edge`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddMidpoint {
    pub loc: Loc,
    pub edge: [EntityId; 2],
    pub node: Node,
}

impl AddMidpoint {
    pub fn new(loc: impl Into<Loc>, edge: [EntityId; 2], node: Node) -> Self {
        Self {
            loc: loc.into(),
            edge,
            node,
        }
    }
}

impl ActionOp for AddMidpoint {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        let [a, b] = self.edge;
        let node = self.node.with_loc(self.loc);
        let id = node.id();

        graph.try_update(|u| -> Result<(), ActionError> {
            u.replace(node);

            let ways_with_b: IdSet = u.parent_way_ids(b).into_iter().collect();
            for way_id in u.parent_way_ids(a) {
                if !ways_with_b.contains(&way_id) {
                    continue;
                }
                let way = u.way(way_id)?;
                // first undirected match only, once per way
                let position = way
                    .nodes()
                    .windows(2)
                    .position(|pair| (pair[0] == a && pair[1] == b) || (pair[0] == b && pair[1] == a));
                if let Some(i) = position {
                    let updated = way.add_node(id, Some(i + 1))?;
                    u.replace(updated);
                }
            }
            Ok(())
        })
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        let [a, b] = self.edge;
        if graph.node(a).is_err() || graph.node(b).is_err() {
            return Some(DisabledReason::NotFound);
        }
        if a == b {
            return Some(DisabledReason::NotEligible);
        }
        None
    }

    fn name(&self) -> &'static str {
        "add_midpoint"
    }
}

/// Add a member to a relation (append when `index` is `None`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddMember {
    pub relation: EntityId,
    pub member: Member,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl AddMember {
    pub fn new(relation: EntityId, member: Member, index: Option<usize>) -> Self {
        Self {
            relation,
            member,
            index,
        }
    }
}

impl ActionOp for AddMember {
    fn apply(&self, graph: &Graph) -> Result<Graph, ActionError> {
        let relation = graph.relation(self.relation)?;
        let updated = relation
            .add_member(self.member.clone(), self.index)
            .map_err(|e| match e {
                GraphError::IndexOutOfRange { index, .. } => ActionError::InvalidIndex {
                    id: self.relation,
                    index,
                },
                other => ActionError::Graph(other),
            })?;
        Ok(graph.replace(updated))
    }

    fn disabled(&self, graph: &Graph) -> Option<DisabledReason> {
        let Ok(relation) = graph.relation(self.relation) else {
            return Some(DisabledReason::NotFound);
        };
        match self.index {
            Some(index) if index > relation.members().len() => Some(DisabledReason::InvalidIndex),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        "add_member"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_graph::{Relation, Way};

    fn n(num: i64) -> EntityId {
        EntityId::node(num)
    }

    fn w(num: i64) -> EntityId {
        EntityId::way(num)
    }

    fn graph_with(ways: Vec<Way>) -> Graph {
        let mut entities: Vec<Entity> = (1..=4).map(|i| Node::new(n(i), [i as f64, 0.0]).into()).collect();
        entities.extend(ways.into_iter().map(Entity::from));
        Graph::new(entities)
    }

    fn midpoint() -> AddMidpoint {
        AddMidpoint::new([1.0, 2.0], [n(1), n(2)], Node::new(n(-1), [0.0, 0.0]))
    }

    #[test]
    fn test_add_midpoint_forward_edge() {
        let graph = graph_with(vec![Way::new(w(1), vec![n(1), n(2)])]);
        let next = midpoint().apply(&graph).unwrap();

        assert_eq!(next.way(w(1)).unwrap().nodes(), &[n(1), n(-1), n(2)]);
        assert_eq!(next.node(n(-1)).unwrap().loc(), Loc::new(1.0, 2.0));
    }

    #[test]
    fn test_add_midpoint_reverse_edge() {
        let graph = graph_with(vec![Way::new(w(1), vec![n(2), n(1)])]);
        let next = midpoint().apply(&graph).unwrap();
        assert_eq!(next.way(w(1)).unwrap().nodes(), &[n(2), n(-1), n(1)]);
    }

    #[test]
    fn test_add_midpoint_degenerate_doubling_becomes_loop() {
        let graph = graph_with(vec![Way::new(w(1), vec![n(1), n(2), n(1)])]);
        let next = midpoint().apply(&graph).unwrap();
        assert_eq!(next.way(w(1)).unwrap().nodes(), &[n(1), n(-1), n(2), n(1)]);
    }

    #[test]
    fn test_add_midpoint_leaves_other_ways_untouched() {
        let graph = graph_with(vec![
            Way::new(w(1), vec![n(1), n(2)]),
            Way::new(w(2), vec![n(1), n(3), n(2)]),
            Way::new(w(3), vec![n(3), n(4)]),
        ]);
        let next = midpoint().apply(&graph).unwrap();

        assert_eq!(next.way(w(1)).unwrap().nodes(), &[n(1), n(-1), n(2)]);
        assert_eq!(next.way(w(2)).unwrap(), graph.way(w(2)).unwrap());
        assert_eq!(next.way(w(3)).unwrap(), graph.way(w(3)).unwrap());
    }

    #[test]
    fn test_add_midpoint_disabled_without_endpoints() {
        let graph = graph_with(vec![]);
        let action = AddMidpoint::new([0.0, 0.0], [n(1), n(9)], Node::new(n(-1), [0.0, 0.0]));
        assert_eq!(action.disabled(&graph), Some(DisabledReason::NotFound));
    }

    #[test]
    fn test_add_entity_rejects_existing_id() {
        let graph = graph_with(vec![]);
        assert_eq!(
            AddEntity::new(Node::new(n(1), [0.0, 0.0])).disabled(&graph),
            Some(DisabledReason::NotEligible)
        );
        let next = AddEntity::new(Node::new(n(-1), [0.0, 0.0])).apply(&graph).unwrap();
        assert!(next.has_entity(n(-1)).is_some());
    }

    #[test]
    fn test_add_vertex() {
        let graph = graph_with(vec![Way::new(w(1), vec![n(1), n(2)])]);

        let next = AddVertex::new(w(1), n(3), None).apply(&graph).unwrap();
        assert_eq!(next.way(w(1)).unwrap().nodes(), &[n(1), n(2), n(3)]);
        assert_eq!(next.parent_way_ids(n(3)).collect::<Vec<_>>(), vec![w(1)]);

        assert_eq!(
            AddVertex::new(w(1), n(3), Some(5)).disabled(&graph),
            Some(DisabledReason::InvalidIndex)
        );
        assert_eq!(
            AddVertex::new(w(1), w(2), None).disabled(&graph),
            Some(DisabledReason::Vertex)
        );
        assert!(matches!(
            AddVertex::new(w(1), n(3), Some(5)).apply(&graph),
            Err(ActionError::InvalidIndex { index: 5, .. })
        ));
    }

    #[test]
    fn test_add_member() {
        let rel = EntityId::relation(1);
        let graph = graph_with(vec![]).replace(Relation::new(rel, vec![Member::new(n(1), "stop")]));

        let next = AddMember::new(rel, Member::new(n(2), "platform"), Some(0))
            .apply(&graph)
            .unwrap();
        assert_eq!(next.relation(rel).unwrap().members()[0].id, n(2));
        assert_eq!(next.parent_relation_ids(n(2)).collect::<Vec<_>>(), vec![rel]);

        assert_eq!(
            AddMember::new(rel, Member::new(n(2), ""), Some(3)).disabled(&graph),
            Some(DisabledReason::InvalidIndex)
        );
        assert_eq!(
            AddMember::new(EntityId::relation(9), Member::new(n(2), ""), None).disabled(&graph),
            Some(DisabledReason::NotFound)
        );
    }
}
