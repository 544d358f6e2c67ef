//! # Entity identifiers
//!
//! IDs are rendered as `<kind><number>`: `n123`, `w-4`, `r7`. Server-assigned
//! entities carry positive numbers; entities created during an edit session
//! carry negative numbers handed out by an [`IdAllocator`].

use crate::error::GraphError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which of the three entity variants an ID belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Node,
    Way,
    Relation,
}

impl EntityKind {
    pub fn prefix(self) -> char {
        match self {
            EntityKind::Node => 'n',
            EntityKind::Way => 'w',
            EntityKind::Relation => 'r',
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Node => "node",
            EntityKind::Way => "way",
            EntityKind::Relation => "relation",
        }
    }

    fn from_prefix(c: char) -> Option<Self> {
        match c {
            'n' => Some(EntityKind::Node),
            'w' => Some(EntityKind::Way),
            'r' => Some(EntityKind::Relation),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identifier of an entity
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    kind: EntityKind,
    num: i64,
}

impl EntityId {
    pub fn from_osm(kind: EntityKind, num: i64) -> Self {
        Self { kind, num }
    }

    pub fn node(num: i64) -> Self {
        Self::from_osm(EntityKind::Node, num)
    }

    pub fn way(num: i64) -> Self {
        Self::from_osm(EntityKind::Way, num)
    }

    pub fn relation(num: i64) -> Self {
        Self::from_osm(EntityKind::Relation, num)
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Numeric part of the ID, as used by the server
    pub fn to_osm(&self) -> i64 {
        self.num
    }

    /// Created locally and never uploaded
    pub fn is_new(&self) -> bool {
        self.num < 0
    }

    /// Pick the "oldest" ID: the lowest server ID if there is one, otherwise
    /// the new ID closest to zero (allocated first).
    pub fn oldest<'a>(ids: impl IntoIterator<Item = &'a EntityId>) -> Option<EntityId> {
        let mut oldest_existing: Option<EntityId> = None;
        let mut oldest_new: Option<EntityId> = None;

        for id in ids {
            if id.is_new() {
                if oldest_new.map_or(true, |o| id.num > o.num) {
                    oldest_new = Some(*id);
                }
            } else if oldest_existing.map_or(true, |o| id.num < o.num) {
                oldest_existing = Some(*id);
            }
        }

        oldest_existing.or(oldest_new)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.num)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl FromStr for EntityId {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let kind = chars
            .next()
            .and_then(EntityKind::from_prefix)
            .ok_or_else(|| GraphError::InvalidId(s.to_string()))?;
        let num = chars
            .as_str()
            .parse::<i64>()
            .map_err(|_| GraphError::InvalidId(s.to_string()))?;

        if num == 0 {
            return Err(GraphError::InvalidId(s.to_string()));
        }

        Ok(Self { kind, num })
    }
}

impl TryFrom<String> for EntityId {
    type Error = GraphError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.to_string()
    }
}

/// Hands out negative IDs for entities created in a session
///
/// There is no process-wide counter: each editing session owns one allocator,
/// and a restored session seeds it from the IDs it already uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdAllocator {
    nodes: i64,
    ways: i64,
    relations: i64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an allocator that will never return any of `ids`
    pub fn seeded_from<'a>(ids: impl IntoIterator<Item = &'a EntityId>) -> Self {
        let mut allocator = Self::new();
        for id in ids {
            allocator.observe(id);
        }
        allocator
    }

    /// Record an ID as used
    pub fn observe(&mut self, id: &EntityId) {
        if !id.is_new() {
            return;
        }
        let counter = self.counter_mut(id.kind);
        *counter = (*counter).max(-id.num);
    }

    pub fn next(&mut self, kind: EntityKind) -> EntityId {
        let counter = self.counter_mut(kind);
        *counter += 1;
        EntityId::from_osm(kind, -*counter)
    }

    fn counter_mut(&mut self, kind: EntityKind) -> &mut i64 {
        match kind {
            EntityKind::Node => &mut self.nodes,
            EntityKind::Way => &mut self.ways,
            EntityKind::Relation => &mut self.relations,
        }
    }
}
