//! # Map Entities
//!
//! Immutable values for the three OSM primitives.
//!
//! ## Design
//!
//! - Every `with_*` builder returns a new value with the internal version `v`
//!   bumped by one; older values stay valid in older graphs
//! - Entities never hold a reference to a graph: anything that depends on
//!   neighbours (geometry, completeness) takes the graph as a parameter
//! - Way helpers keep closed rings closed and never leave two identical
//!   consecutive node references behind

use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::id::{EntityId, EntityKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Key/value tags. Ordered so serialized output is deterministic.
pub type Tags = BTreeMap<String, String>;

/// Keys that, on a closed way, make it an area unless `area=no`
const AREA_KEYS: &[&str] = &[
    "amenity",
    "area:highway",
    "building",
    "landuse",
    "leisure",
    "natural",
    "place",
    "shop",
    "tourism",
    "water",
];

const MAX_TAG_VALUE_CHARS: usize = 255;

/// Tag keys that carry meaning (not metadata like source/created_by)
pub fn is_interesting_tag(key: &str) -> bool {
    key != "attribution"
        && key != "created_by"
        && key != "source"
        && key != "odbl"
        && !key.starts_with("source:")
        && !key.starts_with("tiger:")
}

/// Longitude/latitude pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Loc {
    pub lon: f64,
    pub lat: f64,
}

impl Loc {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

impl From<[f64; 2]> for Loc {
    fn from([lon, lat]: [f64; 2]) -> Self {
        Self { lon, lat }
    }
}

/// How an entity renders in a particular graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Geometry {
    Point,
    Vertex,
    Line,
    Area,
    Relation,
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Geometry::Point => "point",
            Geometry::Vertex => "vertex",
            Geometry::Line => "line",
            Geometry::Area => "area",
            Geometry::Relation => "relation",
        };
        f.write_str(s)
    }
}

/// Where a node sits on a way, if at an end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affix {
    Prefix,
    Suffix,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    id: EntityId,
    #[serde(default)]
    v: u64,
    #[serde(default)]
    tags: Tags,
    loc: Loc,
}

impl Node {
    pub fn new(id: EntityId, loc: impl Into<Loc>) -> Self {
        Self {
            id,
            v: 0,
            tags: Tags::new(),
            loc: loc.into(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn version(&self) -> u64 {
        self.v
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn loc(&self) -> Loc {
        self.loc
    }

    pub fn with_tags(&self, tags: Tags) -> Self {
        Self {
            tags,
            v: self.v + 1,
            ..self.clone()
        }
    }

    pub fn with_loc(&self, loc: impl Into<Loc>) -> Self {
        Self {
            loc: loc.into(),
            v: self.v + 1,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Way {
    id: EntityId,
    #[serde(default)]
    v: u64,
    #[serde(default)]
    tags: Tags,
    nodes: Vec<EntityId>,
}

impl Way {
    pub fn new(id: EntityId, nodes: Vec<EntityId>) -> Self {
        Self {
            id,
            v: 0,
            tags: Tags::new(),
            nodes,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn version(&self) -> u64 {
        self.v
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn nodes(&self) -> &[EntityId] {
        &self.nodes
    }

    pub fn first(&self) -> Option<EntityId> {
        self.nodes.first().copied()
    }

    pub fn last(&self) -> Option<EntityId> {
        self.nodes.last().copied()
    }

    pub fn contains(&self, node: EntityId) -> bool {
        self.nodes.contains(&node)
    }

    pub fn affix(&self, node: EntityId) -> Option<Affix> {
        if self.first() == Some(node) {
            Some(Affix::Prefix)
        } else if self.last() == Some(node) {
            Some(Affix::Suffix)
        } else {
            None
        }
    }

    pub fn is_closed(&self) -> bool {
        self.nodes.len() > 1 && self.first() == self.last()
    }

    /// Too few distinct nodes to be drawn
    pub fn is_degenerate(&self) -> bool {
        let unique: BTreeSet<_> = self.nodes.iter().collect();
        unique.len() < if self.is_closed() { 3 } else { 2 }
    }

    pub fn is_area(&self) -> bool {
        match self.tags.get("area").map(String::as_str) {
            Some("yes") => return true,
            Some("no") => return false,
            _ => {}
        }
        self.is_closed() && self.tags.keys().any(|k| AREA_KEYS.contains(&k.as_str()))
    }

    pub fn with_tags(&self, tags: Tags) -> Self {
        Self {
            tags,
            v: self.v + 1,
            ..self.clone()
        }
    }

    pub fn with_nodes(&self, nodes: Vec<EntityId>) -> Self {
        Self {
            nodes,
            v: self.v + 1,
            ..self.clone()
        }
    }

    /// Insert `node` at `index` (append when `None`).
    ///
    /// On a closed way the valid range excludes the closing node, duplicate
    /// connectors are dropped first and the ring is re-closed afterwards.
    pub fn add_node(&self, node: EntityId, index: Option<usize>) -> GraphResult<Self> {
        let mut nodes = self.nodes.clone();
        let closed = self.is_closed();
        let max = if closed { nodes.len() - 1 } else { nodes.len() };
        let mut index = index.unwrap_or(max);

        if index > max {
            return Err(GraphError::IndexOutOfRange { index, max });
        }

        if closed {
            let connector = nodes[0];

            let i = 1;
            while i < nodes.len() && nodes.len() > 2 && nodes[i] == connector {
                nodes.remove(i);
                if index > i {
                    index -= 1;
                }
            }

            let mut i = nodes.len() - 1;
            while i > 0 && nodes.len() > 1 && nodes[i] == connector {
                nodes.remove(i);
                if index > i {
                    index -= 1;
                }
                i = nodes.len() - 1;
            }
        }

        nodes.insert(index.min(nodes.len()), node);
        let mut nodes = dedup_consecutive(nodes);

        if closed && (nodes.len() == 1 || nodes.first() != nodes.last()) {
            nodes.push(nodes[0]);
        }

        Ok(self.with_nodes(nodes))
    }

    /// Replace the node reference at `index`
    pub fn update_node(&self, node: EntityId, index: usize) -> GraphResult<Self> {
        let mut nodes = self.nodes.clone();
        let closed = self.is_closed();
        let max = nodes.len().saturating_sub(1);

        if nodes.is_empty() || index > max {
            return Err(GraphError::IndexOutOfRange { index, max });
        }

        nodes[index] = node;
        if closed && (index == 0 || index == max) {
            nodes[0] = node;
            nodes[max] = node;
        }

        Ok(self.with_nodes(dedup_consecutive(nodes)))
    }

    /// Replace every reference to `needle` with `replacement`
    pub fn replace_node(&self, needle: EntityId, replacement: EntityId) -> Self {
        let nodes = self
            .nodes
            .iter()
            .map(|&n| if n == needle { replacement } else { n })
            .collect();
        self.with_nodes(dedup_consecutive(nodes))
    }

    /// Remove every reference to `node`, keeping a closed way closed
    pub fn remove_node(&self, node: EntityId) -> Self {
        let closed = self.is_closed();
        let mut nodes = dedup_consecutive(self.nodes.iter().copied().filter(|&n| n != node).collect());

        if closed && !nodes.is_empty() && (nodes.len() == 1 || nodes.first() != nodes.last()) {
            nodes.push(nodes[0]);
        }

        self.with_nodes(nodes)
    }
}

fn dedup_consecutive(mut nodes: Vec<EntityId>) -> Vec<EntityId> {
    nodes.dedup();
    nodes
}

/// Relation member reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: EntityId,
    #[serde(default)]
    pub role: String,
}

impl Member {
    pub fn new(id: EntityId, role: impl Into<String>) -> Self {
        Self {
            id,
            role: role.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    id: EntityId,
    #[serde(default)]
    v: u64,
    #[serde(default)]
    tags: Tags,
    members: Vec<Member>,
}

impl Relation {
    pub fn new(id: EntityId, members: Vec<Member>) -> Self {
        Self {
            id,
            v: 0,
            tags: Tags::new(),
            members,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn version(&self) -> u64 {
        self.v
    }

    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// First member referencing `id`, with its index
    pub fn member_by_id(&self, id: EntityId) -> Option<(usize, &Member)> {
        self.members.iter().enumerate().find(|(_, m)| m.id == id)
    }

    pub fn is_multipolygon(&self) -> bool {
        self.tags.get("type").map(String::as_str) == Some("multipolygon")
    }

    pub fn is_degenerate(&self) -> bool {
        self.members.is_empty()
    }

    /// Every member is loaded in `graph`
    pub fn is_complete(&self, graph: &Graph) -> bool {
        self.members.iter().all(|m| graph.has_entity(m.id).is_some())
    }

    pub fn with_tags(&self, tags: Tags) -> Self {
        Self {
            tags,
            v: self.v + 1,
            ..self.clone()
        }
    }

    pub fn with_members(&self, members: Vec<Member>) -> Self {
        Self {
            members,
            v: self.v + 1,
            ..self.clone()
        }
    }

    pub fn add_member(&self, member: Member, index: Option<usize>) -> GraphResult<Self> {
        let mut members = self.members.clone();
        let max = members.len();
        let index = index.unwrap_or(max);
        if index > max {
            return Err(GraphError::IndexOutOfRange { index, max });
        }
        members.insert(index, member);
        Ok(self.with_members(members))
    }

    pub fn update_member(&self, member: Member, index: usize) -> GraphResult<Self> {
        let mut members = self.members.clone();
        match members.get_mut(index) {
            Some(slot) => *slot = member,
            None => {
                return Err(GraphError::IndexOutOfRange {
                    index,
                    max: members.len().saturating_sub(1),
                })
            }
        }
        Ok(self.with_members(members))
    }

    pub fn remove_member(&self, index: usize) -> GraphResult<Self> {
        if index >= self.members.len() {
            return Err(GraphError::IndexOutOfRange {
                index,
                max: self.members.len().saturating_sub(1),
            });
        }
        let mut members = self.members.clone();
        members.remove(index);
        Ok(self.with_members(members))
    }

    pub fn remove_members_with_id(&self, id: EntityId) -> Self {
        let members = self.members.iter().filter(|m| m.id != id).cloned().collect();
        self.with_members(members)
    }

    /// Point every member referencing `needle` at `replacement`, dropping
    /// the exact `(id, role)` duplicates this creates
    pub fn replace_member(&self, needle: EntityId, replacement: EntityId) -> Self {
        let mut seen = BTreeSet::new();
        let members = self
            .members
            .iter()
            .map(|m| {
                if m.id == needle {
                    Member::new(replacement, m.role.clone())
                } else {
                    m.clone()
                }
            })
            .filter(|m| m.id != replacement || seen.insert(m.role.clone()))
            .collect();
        self.with_members(members)
    }
}

/// A node, way or relation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Entity {
    Node(Node),
    Way(Way),
    Relation(Relation),
}

impl Entity {
    pub fn id(&self) -> EntityId {
        match self {
            Entity::Node(n) => n.id,
            Entity::Way(w) => w.id,
            Entity::Relation(r) => r.id,
        }
    }

    /// Kind of the variant (which may disagree with a malformed ID)
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Node(_) => EntityKind::Node,
            Entity::Way(_) => EntityKind::Way,
            Entity::Relation(_) => EntityKind::Relation,
        }
    }

    pub fn version(&self) -> u64 {
        match self {
            Entity::Node(n) => n.v,
            Entity::Way(w) => w.v,
            Entity::Relation(r) => r.v,
        }
    }

    pub fn tags(&self) -> &Tags {
        match self {
            Entity::Node(n) => &n.tags,
            Entity::Way(w) => &w.tags,
            Entity::Relation(r) => &r.tags,
        }
    }

    pub fn is_new(&self) -> bool {
        self.id().is_new()
    }

    pub fn with_tags(&self, tags: Tags) -> Self {
        match self {
            Entity::Node(n) => Entity::Node(n.with_tags(tags)),
            Entity::Way(w) => Entity::Way(w.with_tags(tags)),
            Entity::Relation(r) => Entity::Relation(r.with_tags(tags)),
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Entity::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_way(&self) -> Option<&Way> {
        match self {
            Entity::Way(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_relation(&self) -> Option<&Relation> {
        match self {
            Entity::Relation(r) => Some(r),
            _ => None,
        }
    }

    /// IDs this entity points at: way nodes or relation members
    pub fn references(&self) -> Vec<EntityId> {
        match self {
            Entity::Node(_) => Vec::new(),
            Entity::Way(w) => w.nodes.clone(),
            Entity::Relation(r) => r.members.iter().map(|m| m.id).collect(),
        }
    }

    pub fn has_interesting_tags(&self) -> bool {
        self.tags().keys().any(|k| is_interesting_tag(k))
    }

    pub fn geometry(&self, graph: &Graph) -> Geometry {
        match self {
            Entity::Node(n) => {
                if graph.parent_way_ids(n.id).next().is_some() {
                    Geometry::Vertex
                } else {
                    Geometry::Point
                }
            }
            Entity::Way(w) if w.is_area() => Geometry::Area,
            Entity::Way(_) => Geometry::Line,
            Entity::Relation(r) if r.is_multipolygon() => Geometry::Area,
            Entity::Relation(_) => Geometry::Relation,
        }
    }

    /// Merge `other` into this entity's tags.
    ///
    /// Conflicting values are combined as a `;`-separated list. Returns an
    /// unchanged clone (same version) when nothing changes.
    pub fn merge_tags(&self, other: &Tags) -> Self {
        let mut merged = self.tags().clone();
        let mut changed = false;

        for (key, theirs) in other {
            match merged.get(key) {
                None => {
                    merged.insert(key.clone(), theirs.clone());
                    changed = true;
                }
                Some(ours) if ours != theirs => {
                    let mut values: Vec<&str> = Vec::new();
                    for value in ours.split(';').chain(theirs.split(';')) {
                        let value = value.trim();
                        if !values.contains(&value) {
                            values.push(value);
                        }
                    }
                    let joined: String = values.join(";").chars().take(MAX_TAG_VALUE_CHARS).collect();
                    merged.insert(key.clone(), joined);
                    changed = true;
                }
                Some(_) => {}
            }
        }

        if changed {
            self.with_tags(merged)
        } else {
            self.clone()
        }
    }
}

impl From<Node> for Entity {
    fn from(node: Node) -> Self {
        Entity::Node(node)
    }
}

impl From<Way> for Entity {
    fn from(way: Way) -> Self {
        Entity::Way(way)
    }
}

impl From<Relation> for Entity {
    fn from(relation: Relation) -> Self {
        Entity::Relation(relation)
    }
}

/// Build a [`Tags`] map from string pairs
pub fn tags<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Tags
where
    K: Into<String>,
    V: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}
