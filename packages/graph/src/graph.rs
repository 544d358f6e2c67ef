//! # Layered Graph
//!
//! Persistent snapshot of entities plus parent indices.
//!
//! ## Structure
//!
//! ```text
//!   Graph ──► layer 3: { w1 ↦ w1'v4 }        parent_ways: { n7 ↦ {w1} }
//!               │
//!             layer 2: { n9 ↦ ∅ (tombstone) } parent_ways: { }
//!               │
//!             base:    every loaded entity   parent_ways / parent_relations
//! ```
//!
//! - The base layer is fully materialized; each other layer stores only the
//!   entities it added, replaced or removed and the index sets it changed
//! - Lookups walk the chain from the top and stop at the first layer that
//!   knows the ID
//! - `replace`/`remove` are O(1) in graph size: index deltas come from diffing
//!   the old and new reference lists of one entity
//! - Chains longer than the base's `max_depth` are flattened into a single
//!   layer over the base

use crate::entity::{Entity, Node, Relation, Way};
use crate::error::{GraphError, GraphResult};
use crate::id::{EntityId, EntityKind};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Set of entity IDs, sorted for deterministic iteration
pub type IdSet = BTreeSet<EntityId>;

/// Layers allowed above the base before `replace`/`remove` flatten the chain
pub const DEFAULT_MAX_DEPTH: usize = 32;

type Slot = Option<Arc<Entity>>;

struct Layer {
    parent: Option<Graph>,
    entities: HashMap<EntityId, Slot>,
    parent_ways: HashMap<EntityId, Arc<IdSet>>,
    parent_relations: HashMap<EntityId, Arc<IdSet>>,
    depth: usize,
    max_depth: usize,
}

/// Immutable entity graph. Cloning is a reference-count bump.
#[derive(Clone)]
pub struct Graph {
    layer: Arc<Layer>,
}

struct Layers<'a> {
    next: Option<&'a Layer>,
}

impl<'a> Iterator for Layers<'a> {
    type Item = &'a Layer;

    fn next(&mut self) -> Option<&'a Layer> {
        let layer = self.next?;
        self.next = layer.parent.as_ref().map(|p| &*p.layer);
        Some(layer)
    }
}

impl Graph {
    /// Build a base graph from authoritative entities
    pub fn new(entities: impl IntoIterator<Item = Entity>) -> Self {
        Self::new_base(entities, DEFAULT_MAX_DEPTH)
    }

    /// Build a base graph with a custom flattening threshold
    pub fn new_base(entities: impl IntoIterator<Item = Entity>, max_depth: usize) -> Self {
        let mut update = GraphUpdate::base(max_depth);
        for entity in entities {
            update.replace(entity);
        }
        update.finish()
    }

    pub fn is_base(&self) -> bool {
        self.layer.parent.is_none()
    }

    /// The fully materialized graph at the bottom of the chain
    pub fn base(&self) -> Graph {
        let mut graph = self;
        while let Some(parent) = &graph.layer.parent {
            graph = parent;
        }
        graph.clone()
    }

    /// Number of delta layers above the base
    pub fn depth(&self) -> usize {
        self.layer.depth
    }

    pub fn max_depth(&self) -> usize {
        self.layer.max_depth
    }

    /// Same snapshot (not merely equal content)
    pub fn ptr_eq(&self, other: &Graph) -> bool {
        Arc::ptr_eq(&self.layer, &other.layer)
    }

    fn layers(&self) -> Layers<'_> {
        Layers {
            next: Some(&self.layer),
        }
    }

    fn local_layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers().filter(|layer| layer.parent.is_some())
    }

    pub fn has_entity(&self, id: EntityId) -> Option<&Arc<Entity>> {
        for layer in self.layers() {
            if let Some(slot) = layer.entities.get(&id) {
                return slot.as_ref();
            }
        }
        None
    }

    pub fn entity(&self, id: EntityId) -> GraphResult<&Arc<Entity>> {
        self.has_entity(id).ok_or(GraphError::EntityNotFound(id))
    }

    pub fn node(&self, id: EntityId) -> GraphResult<&Node> {
        self.entity(id)?.as_node().ok_or(GraphError::WrongKind {
            id,
            expected: EntityKind::Node,
        })
    }

    pub fn way(&self, id: EntityId) -> GraphResult<&Way> {
        self.entity(id)?.as_way().ok_or(GraphError::WrongKind {
            id,
            expected: EntityKind::Way,
        })
    }

    pub fn relation(&self, id: EntityId) -> GraphResult<&Relation> {
        self.entity(id)?.as_relation().ok_or(GraphError::WrongKind {
            id,
            expected: EntityKind::Relation,
        })
    }

    pub(crate) fn parent_way_set(&self, id: EntityId) -> Option<&Arc<IdSet>> {
        self.layers().find_map(|layer| layer.parent_ways.get(&id))
    }

    pub(crate) fn parent_relation_set(&self, id: EntityId) -> Option<&Arc<IdSet>> {
        self.layers().find_map(|layer| layer.parent_relations.get(&id))
    }

    pub fn parent_way_ids(&self, id: EntityId) -> impl Iterator<Item = EntityId> + '_ {
        self.parent_way_set(id)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    pub fn parent_relation_ids(&self, id: EntityId) -> impl Iterator<Item = EntityId> + '_ {
        self.parent_relation_set(id)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Ways referencing `id`, sorted by way ID
    pub fn parent_ways(&self, id: EntityId) -> Vec<&Way> {
        self.parent_way_ids(id)
            .filter_map(|way| self.has_entity(way).and_then(|e| e.as_way()))
            .collect()
    }

    /// Relations with `id` as a member, sorted by relation ID
    pub fn parent_relations(&self, id: EntityId) -> Vec<&Relation> {
        self.parent_relation_ids(id)
            .filter_map(|rel| self.has_entity(rel).and_then(|e| e.as_relation()))
            .collect()
    }

    /// Nodes of `way` in order, each once
    pub fn child_nodes(&self, way: &Way) -> Vec<&Node> {
        let mut seen = IdSet::new();
        way.nodes()
            .iter()
            .filter(|id| seen.insert(**id))
            .filter_map(|id| self.has_entity(*id).and_then(|e| e.as_node()))
            .collect()
    }

    /// Node is a vertex of more than one way
    pub fn is_shared(&self, node: EntityId) -> bool {
        self.parent_way_ids(node).nth(1).is_some()
    }

    /// Node stands on its own (no parent ways)
    pub fn is_poi(&self, node: EntityId) -> bool {
        self.parent_way_ids(node).next().is_none()
    }

    pub fn replace(&self, entity: impl Into<Entity>) -> Graph {
        self.update(|update| update.replace(entity))
    }

    /// Tombstone `id`.
    ///
    /// Never fails: references still pointing at `id` are integrity
    /// violations reported when an edit is committed.
    pub fn remove(&self, id: EntityId) -> Graph {
        self.update(|update| update.remove(id))
    }

    /// Restore the base value of `id` (or its absence)
    pub fn revert(&self, id: EntityId) -> Graph {
        let original = self.base().has_entity(id).cloned();
        self.update(|update| update.put(id, original))
    }

    /// Apply several changes as one new layer
    pub fn update(&self, f: impl FnOnce(&mut GraphUpdate)) -> Graph {
        let mut update = GraphUpdate::over(self);
        f(&mut update);
        update.finish()
    }

    pub fn try_update<E>(
        &self,
        f: impl FnOnce(&mut GraphUpdate) -> Result<(), E>,
    ) -> Result<Graph, E> {
        let mut update = GraphUpdate::over(self);
        f(&mut update)?;
        Ok(update.finish())
    }

    /// IDs added, replaced or removed above the base
    pub fn local_ids(&self) -> IdSet {
        self.local_layers()
            .flat_map(|layer| layer.entities.keys().copied())
            .collect()
    }

    /// Effective local slot per touched ID (`None` = removed)
    pub fn local_entries(&self) -> HashMap<EntityId, Option<Arc<Entity>>> {
        let mut entries = HashMap::new();
        for layer in self.local_layers() {
            for (id, slot) in &layer.entities {
                entries.entry(*id).or_insert_with(|| slot.clone());
            }
        }
        entries
    }

    /// Merge every delta layer into one layer directly over the base
    pub fn flatten(&self) -> Graph {
        if self.layer.depth <= 1 {
            return self.clone();
        }

        let mut entities = HashMap::new();
        let mut parent_ways = HashMap::new();
        let mut parent_relations = HashMap::new();

        for layer in self.local_layers() {
            for (id, slot) in &layer.entities {
                entities.entry(*id).or_insert_with(|| slot.clone());
            }
            for (id, set) in &layer.parent_ways {
                parent_ways.entry(*id).or_insert_with(|| Arc::clone(set));
            }
            for (id, set) in &layer.parent_relations {
                parent_relations.entry(*id).or_insert_with(|| Arc::clone(set));
            }
        }

        Graph {
            layer: Arc::new(Layer {
                parent: Some(self.base()),
                entities,
                parent_ways,
                parent_relations,
                depth: 1,
                max_depth: self.layer.max_depth,
            }),
        }
    }

    /// IDs of every live entity (full scan)
    pub fn entity_ids(&self) -> IdSet {
        let base = self.base();
        base.layer
            .entities
            .keys()
            .copied()
            .chain(self.local_ids())
            .filter(|id| self.has_entity(*id).is_some())
            .collect()
    }

    /// Every live entity, sorted by ID (full scan)
    pub fn entities(&self) -> Vec<&Arc<Entity>> {
        self.entity_ids()
            .into_iter()
            .filter_map(|id| self.has_entity(id))
            .collect()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(std::iter::empty())
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("depth", &self.layer.depth)
            .field("local", &self.local_ids().len())
            .finish()
    }
}

#[derive(Clone, Copy)]
enum Index {
    Ways,
    Relations,
}

/// A layer under construction
///
/// Reads see the pending changes first, then the parent graph. Each write
/// updates the parent indices for the children that entered or left the
/// entity's reference list.
pub struct GraphUpdate {
    parent: Option<Graph>,
    entities: HashMap<EntityId, Slot>,
    parent_ways: HashMap<EntityId, Arc<IdSet>>,
    parent_relations: HashMap<EntityId, Arc<IdSet>>,
    max_depth: usize,
}

impl GraphUpdate {
    pub(crate) fn over(graph: &Graph) -> Self {
        Self {
            parent: Some(graph.clone()),
            entities: HashMap::new(),
            parent_ways: HashMap::new(),
            parent_relations: HashMap::new(),
            max_depth: graph.layer.max_depth,
        }
    }

    pub(crate) fn base(max_depth: usize) -> Self {
        Self {
            parent: None,
            entities: HashMap::new(),
            parent_ways: HashMap::new(),
            parent_relations: HashMap::new(),
            max_depth,
        }
    }

    /// Start a new base from the contents of an existing one
    pub(crate) fn from_base(base: &Graph) -> Self {
        let base = base.base();
        Self {
            parent: None,
            entities: base.layer.entities.clone(),
            parent_ways: base.layer.parent_ways.clone(),
            parent_relations: base.layer.parent_relations.clone(),
            max_depth: base.layer.max_depth,
        }
    }

    pub fn has_entity(&self, id: EntityId) -> Option<&Arc<Entity>> {
        match self.entities.get(&id) {
            Some(slot) => slot.as_ref(),
            None => self.parent.as_ref().and_then(|p| p.has_entity(id)),
        }
    }

    pub fn entity(&self, id: EntityId) -> GraphResult<&Arc<Entity>> {
        self.has_entity(id).ok_or(GraphError::EntityNotFound(id))
    }

    pub fn node(&self, id: EntityId) -> GraphResult<&Node> {
        self.entity(id)?.as_node().ok_or(GraphError::WrongKind {
            id,
            expected: EntityKind::Node,
        })
    }

    pub fn way(&self, id: EntityId) -> GraphResult<&Way> {
        self.entity(id)?.as_way().ok_or(GraphError::WrongKind {
            id,
            expected: EntityKind::Way,
        })
    }

    pub fn relation(&self, id: EntityId) -> GraphResult<&Relation> {
        self.entity(id)?.as_relation().ok_or(GraphError::WrongKind {
            id,
            expected: EntityKind::Relation,
        })
    }

    /// Parent ways of `id` including pending changes, sorted by ID
    pub fn parent_way_ids(&self, id: EntityId) -> Vec<EntityId> {
        match self.parent_ways.get(&id) {
            Some(set) => set.iter().copied().collect(),
            None => self
                .parent
                .as_ref()
                .map(|p| p.parent_way_ids(id).collect())
                .unwrap_or_default(),
        }
    }

    /// Parent relations of `id` including pending changes, sorted by ID
    pub fn parent_relation_ids(&self, id: EntityId) -> Vec<EntityId> {
        match self.parent_relations.get(&id) {
            Some(set) => set.iter().copied().collect(),
            None => self
                .parent
                .as_ref()
                .map(|p| p.parent_relation_ids(id).collect())
                .unwrap_or_default(),
        }
    }

    pub fn replace(&mut self, entity: impl Into<Entity>) {
        let entity = entity.into();
        self.put(entity.id(), Some(Arc::new(entity)));
    }

    /// Layer in an entity already shared with another graph
    pub fn replace_shared(&mut self, entity: Arc<Entity>) {
        self.put(entity.id(), Some(entity));
    }

    pub fn remove(&mut self, id: EntityId) {
        self.put(id, None);
    }

    pub(crate) fn put(&mut self, id: EntityId, value: Slot) {
        let old = self.has_entity(id).cloned();
        let (old_nodes, old_members) = children(old.as_deref());
        let (new_nodes, new_members) = children(value.as_deref());

        for child in old_nodes.difference(&new_nodes) {
            self.index_mut(Index::Ways, *child).remove(&id);
        }
        for child in new_nodes.difference(&old_nodes) {
            self.index_mut(Index::Ways, *child).insert(id);
        }
        for child in old_members.difference(&new_members) {
            self.index_mut(Index::Relations, *child).remove(&id);
        }
        for child in new_members.difference(&old_members) {
            self.index_mut(Index::Relations, *child).insert(id);
        }

        if self.parent.is_none() && value.is_none() {
            self.entities.remove(&id);
        } else {
            self.entities.insert(id, value);
        }
    }

    fn index_mut(&mut self, which: Index, child: EntityId) -> &mut IdSet {
        let parent = self.parent.as_ref();
        let (map, inherited) = match which {
            Index::Ways => (
                &mut self.parent_ways,
                parent.and_then(|p| p.parent_way_set(child)),
            ),
            Index::Relations => (
                &mut self.parent_relations,
                parent.and_then(|p| p.parent_relation_set(child)),
            ),
        };
        let set = map
            .entry(child)
            .or_insert_with(|| inherited.cloned().unwrap_or_default());
        Arc::make_mut(set)
    }

    pub(crate) fn finish(mut self) -> Graph {
        let Some(parent) = self.parent.take() else {
            self.parent_ways.retain(|_, set| !set.is_empty());
            self.parent_relations.retain(|_, set| !set.is_empty());
            return Graph {
                layer: Arc::new(Layer {
                    parent: None,
                    entities: self.entities,
                    parent_ways: self.parent_ways,
                    parent_relations: self.parent_relations,
                    depth: 0,
                    max_depth: self.max_depth,
                }),
            };
        };

        if self.entities.is_empty() && self.parent_ways.is_empty() && self.parent_relations.is_empty() {
            return parent;
        }

        let depth = parent.layer.depth + 1;
        let graph = Graph {
            layer: Arc::new(Layer {
                parent: Some(parent),
                entities: self.entities,
                parent_ways: self.parent_ways,
                parent_relations: self.parent_relations,
                depth,
                max_depth: self.max_depth,
            }),
        };

        if depth > self.max_depth {
            graph.flatten()
        } else {
            graph
        }
    }
}

/// Child IDs of an entity, split by the index they feed
fn children(entity: Option<&Entity>) -> (IdSet, IdSet) {
    match entity {
        Some(Entity::Way(way)) => (way.nodes().iter().copied().collect(), IdSet::new()),
        Some(Entity::Relation(rel)) => (IdSet::new(), rel.members().iter().map(|m| m.id).collect()),
        Some(Entity::Node(_)) | None => (IdSet::new(), IdSet::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{tags, Geometry, Member};

    fn n(num: i64) -> EntityId {
        EntityId::node(num)
    }

    fn w(num: i64) -> EntityId {
        EntityId::way(num)
    }

    fn sample() -> Graph {
        Graph::new(vec![
            Node::new(n(1), [0.0, 0.0]).into(),
            Node::new(n(2), [1.0, 0.0]).into(),
            Node::new(n(3), [1.0, 1.0]).into(),
            Way::new(w(1), vec![n(1), n(2)]).into(),
            Relation::new(EntityId::relation(1), vec![Member::new(w(1), "outer")]).into(),
        ])
    }

    #[test]
    fn test_base_indices() {
        let graph = sample();
        assert!(graph.is_base());
        assert_eq!(graph.parent_way_ids(n(1)).collect::<Vec<_>>(), vec![w(1)]);
        assert_eq!(graph.parent_relation_ids(w(1)).collect::<Vec<_>>(), vec![EntityId::relation(1)]);
        assert!(graph.parent_ways(n(3)).is_empty());
    }

    #[test]
    fn test_entity_lookup_fails_fast() {
        let graph = sample();
        assert!(graph.has_entity(n(99)).is_none());
        assert_eq!(graph.entity(n(99)).unwrap_err(), GraphError::EntityNotFound(n(99)));
        assert!(matches!(graph.way(n(1)), Err(GraphError::WrongKind { .. })));
    }

    #[test]
    fn test_replace_creates_layer_and_keeps_old_snapshot() {
        let graph = sample();
        let moved = graph.replace(graph.node(n(1)).unwrap().with_loc([5.0, 5.0]));

        assert_eq!(moved.depth(), 1);
        assert_eq!(moved.node(n(1)).unwrap().loc().lon, 5.0);
        assert_eq!(graph.node(n(1)).unwrap().loc().lon, 0.0);
    }

    #[test]
    fn test_replace_way_updates_parent_ways() {
        let graph = sample();
        let way = graph.way(w(1)).unwrap().with_nodes(vec![n(2), n(3)]);
        let next = graph.replace(way);

        assert!(next.parent_ways(n(1)).is_empty());
        assert_eq!(next.parent_way_ids(n(3)).collect::<Vec<_>>(), vec![w(1)]);
        assert_eq!(next.parent_way_ids(n(2)).collect::<Vec<_>>(), vec![w(1)]);

        // the old snapshot still sees the old index
        assert_eq!(graph.parent_way_ids(n(1)).collect::<Vec<_>>(), vec![w(1)]);
    }

    #[test]
    fn test_remove_tombstones_and_clears_child_index() {
        let graph = sample().remove(w(1));
        assert!(graph.has_entity(w(1)).is_none());
        assert!(graph.parent_ways(n(1)).is_empty());
        assert_eq!(graph.local_ids().into_iter().collect::<Vec<_>>(), vec![w(1)]);
        // the relation still points at the removed way; caught at commit
        assert_eq!(graph.relation(EntityId::relation(1)).unwrap().members()[0].id, w(1));
    }

    #[test]
    fn test_geometry_depends_on_graph() {
        let graph = sample();
        let node = Entity::from(graph.node(n(1)).unwrap().clone());
        assert_eq!(node.geometry(&graph), Geometry::Vertex);

        let detached = graph.remove(w(1));
        assert_eq!(node.geometry(&detached), Geometry::Point);
    }

    #[test]
    fn test_child_nodes_dedups_closed_ways() {
        let graph = sample().replace(Way::new(w(2), vec![n(1), n(2), n(3), n(1)]));
        let way = graph.way(w(2)).unwrap();
        let ids: Vec<_> = graph.child_nodes(way).iter().map(|node| node.id()).collect();
        assert_eq!(ids, vec![n(1), n(2), n(3)]);
        assert!(graph.is_shared(n(1)));
        assert!(!graph.is_poi(n(3)));
    }

    #[test]
    fn test_update_batches_into_one_layer() {
        let graph = sample().update(|u| {
            u.replace(Node::new(n(4), [2.0, 2.0]));
            u.replace(Way::new(w(2), vec![n(3), n(4)]));
            assert_eq!(u.parent_way_ids(n(4)), vec![w(2)]);
            assert_eq!(u.parent_way_ids(n(1)), vec![w(1)]);
            u.remove(n(1));
            assert!(u.has_entity(n(1)).is_none());
        });
        assert_eq!(graph.depth(), 1);
        assert_eq!(graph.parent_way_ids(n(4)).collect::<Vec<_>>(), vec![w(2)]);
        assert!(graph.has_entity(n(1)).is_none());
    }

    #[test]
    fn test_empty_update_returns_same_snapshot() {
        let graph = sample();
        let same = graph.update(|_| {});
        assert!(same.ptr_eq(&graph));
    }

    #[test]
    fn test_flatten_preserves_lookups_and_indices() {
        let mut graph = sample();
        for i in 10..20 {
            graph = graph.replace(Node::new(n(i), [0.0, i as f64]));
            let way = graph.way(w(1)).unwrap().add_node(n(i), None).unwrap();
            graph = graph.replace(way);
        }
        graph = graph.remove(n(3));
        assert_eq!(graph.depth(), 21);

        let flat = graph.flatten();
        assert_eq!(flat.depth(), 1);
        assert_eq!(flat.local_ids(), graph.local_ids());
        assert_eq!(flat.way(w(1)).unwrap().nodes().len(), 12);
        assert!(flat.has_entity(n(3)).is_none());
        for i in 10..20 {
            assert_eq!(flat.parent_way_ids(n(i)).collect::<Vec<_>>(), vec![w(1)]);
        }
    }

    #[test]
    fn test_chain_depth_is_bounded() {
        let base = Graph::new_base(vec![Node::new(n(1), [0.0, 0.0]).into()], 4);
        let mut graph = base.clone();
        for i in 0..20 {
            let node = graph.node(n(1)).unwrap().with_loc([i as f64, 0.0]);
            graph = graph.replace(node);
            assert!(graph.depth() <= 4);
        }
        assert_eq!(graph.node(n(1)).unwrap().version(), 20);
        assert!(graph.base().ptr_eq(&base));
    }

    #[test]
    fn test_revert_restores_base_value() {
        let graph = sample();
        let tagged = graph.replace(graph.node(n(1)).unwrap().with_tags(tags([("highway", "crossing")])));
        let reverted = tagged.revert(n(1));
        assert_eq!(reverted.node(n(1)).unwrap(), graph.node(n(1)).unwrap());

        let created = graph.replace(Node::new(n(-1), [0.0, 0.0]));
        assert!(created.revert(n(-1)).has_entity(n(-1)).is_none());
    }

    #[test]
    fn test_entity_ids_merges_base_and_local() {
        let graph = sample().remove(n(3)).replace(Node::new(n(-1), [0.0, 0.0]));
        let ids: Vec<_> = graph.entity_ids().into_iter().collect();
        assert_eq!(ids, vec![n(-1), n(1), n(2), w(1), EntityId::relation(1)]);
        assert_eq!(graph.entities().len(), 5);
    }
}
