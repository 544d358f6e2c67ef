//! # Integrity checks
//!
//! Every commit is verified before it reaches the history stack.
//!
//! ## Design
//!
//! Checks only look at what changed between two snapshots, so a commit costs
//! time proportional to the edit:
//! - **References**: way nodes and relation members of touched entities resolve
//! - **Parents**: a deleted entity is no longer referenced by anyone
//! - **Index**: the parent-way / parent-relation index mirrors the references
//! - **Versions**: a modified entity has a higher version than before
//! - **Identity**: the variant matches the ID prefix and base IDs are not reused
//!
//! Checks are pluggable; [`IntegrityEngine::with_check`] adds custom ones.
//!
//! IDs created or deleted earlier in the session live outside both snapshots.
//! [`SessionIds`] remembers them so [`IntegrityEngine::check_session`] can
//! report a reuse under the identity check.

use atlas_graph::{Change, Difference, Entity, EntityId, EntityKind, Graph};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// One broken invariant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Name of the check that found it
    pub check: &'static str,
    pub id: EntityId,
    pub message: String,
}

impl Violation {
    pub fn new(check: &'static str, id: EntityId, message: impl Into<String>) -> Self {
        Self {
            check,
            id,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.message)
    }
}

/// Invariant evaluated on the transition `before -> after`
pub trait IntegrityCheck: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Report every violation introduced by `diff`
    fn check(&self, before: &Graph, after: &Graph, diff: &Difference) -> Vec<Violation>;
}

/// Way nodes and relation members point at loaded entities
///
/// Relations loaded from the server may be incomplete, so only members added
/// by the edit must resolve for a modified relation.
#[derive(Debug)]
pub struct ReferencesResolve;

impl IntegrityCheck for ReferencesResolve {
    fn name(&self) -> &'static str {
        "references_resolve"
    }

    fn check(&self, _before: &Graph, after: &Graph, diff: &Difference) -> Vec<Violation> {
        let mut violations = Vec::new();
        let touched = diff
            .created()
            .iter()
            .map(|e| (None, e))
            .chain(diff.modified().iter().map(|c| (Some(&c.from), &c.to)));

        for (from, entity) in touched {
            match entity.as_ref() {
                Entity::Node(_) => {}
                Entity::Way(way) => {
                    for node in way.nodes() {
                        if after.node(*node).is_err() {
                            violations.push(Violation::new(
                                self.name(),
                                way.id(),
                                format!("node {node} does not resolve"),
                            ));
                        }
                    }
                }
                Entity::Relation(relation) => {
                    let previous = from.map(|e| e.references()).unwrap_or_default();
                    for member in relation.members() {
                        if previous.contains(&member.id) {
                            continue;
                        }
                        if after.has_entity(member.id).is_none() {
                            violations.push(Violation::new(
                                self.name(),
                                relation.id(),
                                format!("member {} does not resolve", member.id),
                            ));
                        }
                    }
                }
            }
        }
        violations
    }
}

/// Deleted entities leave no parent behind
#[derive(Debug)]
pub struct NoDanglingParents;

impl IntegrityCheck for NoDanglingParents {
    fn name(&self) -> &'static str {
        "no_dangling_parents"
    }

    fn check(&self, _before: &Graph, after: &Graph, diff: &Difference) -> Vec<Violation> {
        let mut violations = Vec::new();
        for deleted in diff.deleted() {
            let id = deleted.id();
            for parent in after.parent_way_ids(id).chain(after.parent_relation_ids(id)) {
                violations.push(Violation::new(
                    self.name(),
                    id,
                    format!("deleted but still referenced by {parent}"),
                ));
            }
        }
        violations
    }
}

/// The parent indices agree with the references of every touched entity
#[derive(Debug)]
pub struct IndexConsistency;

impl IndexConsistency {
    fn indexed(graph: &Graph, parent: &Entity, child: EntityId) -> bool {
        match parent.kind() {
            EntityKind::Way => graph.parent_way_ids(child).any(|p| p == parent.id()),
            EntityKind::Relation => graph.parent_relation_ids(child).any(|p| p == parent.id()),
            EntityKind::Node => false,
        }
    }
}

impl IntegrityCheck for IndexConsistency {
    fn name(&self) -> &'static str {
        "index_consistency"
    }

    fn check(&self, _before: &Graph, after: &Graph, diff: &Difference) -> Vec<Violation> {
        let mut violations = Vec::new();

        let pairs = diff
            .created()
            .iter()
            .map(|e| (None, Some(e)))
            .chain(diff.modified().iter().map(|c| (Some(&c.from), Some(&c.to))))
            .chain(diff.deleted().iter().map(|e| (Some(e), None)));

        for (from, to) in pairs {
            let current = to.map(|e| e.references()).unwrap_or_default();

            if let Some(entity) = to {
                for child in &current {
                    if !Self::indexed(after, entity, *child) {
                        violations.push(Violation::new(
                            self.name(),
                            *child,
                            format!("index is missing parent {}", entity.id()),
                        ));
                    }
                }
            }

            if let Some(entity) = from {
                for child in entity.references() {
                    if !current.contains(&child) && Self::indexed(after, entity, child) {
                        violations.push(Violation::new(
                            self.name(),
                            child,
                            format!("index still lists former parent {}", entity.id()),
                        ));
                    }
                }
            }
        }
        violations
    }
}

/// Versions only grow, except when an entity is put back to its base value
#[derive(Debug)]
pub struct MonotonicVersion;

impl IntegrityCheck for MonotonicVersion {
    fn name(&self) -> &'static str {
        "monotonic_version"
    }

    fn check(&self, _before: &Graph, after: &Graph, diff: &Difference) -> Vec<Violation> {
        let base = after.base();
        diff.modified()
            .iter()
            .filter(|change| change.to.version() <= change.from.version())
            .filter(|change| !is_base_value(&base, &change.to))
            .map(|Change { from, to }| {
                Violation::new(
                    self.name(),
                    to.id(),
                    format!("version went from {} to {}", from.version(), to.version()),
                )
            })
            .collect()
    }
}

/// Variants agree with their ID, and deleted base IDs are not recycled
#[derive(Debug)]
pub struct Identity;

impl IntegrityCheck for Identity {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn check(&self, _before: &Graph, after: &Graph, diff: &Difference) -> Vec<Violation> {
        let base = after.base();
        let mut violations = Vec::new();
        let extant = diff
            .created()
            .iter()
            .map(|e| (true, e))
            .chain(diff.modified().iter().map(|c| (false, &c.to)));

        for (created, entity) in extant {
            let id = entity.id();
            if id.kind() != entity.kind() {
                violations.push(Violation::new(
                    self.name(),
                    id,
                    format!("{} stored under a {} id", entity.kind(), id.kind()),
                ));
                continue;
            }
            if !created {
                continue;
            }
            if let Some(original) = base.has_entity(id) {
                if **original != **entity && entity.version() <= original.version() {
                    violations.push(Violation::new(
                        self.name(),
                        id,
                        "re-created with a different value",
                    ));
                }
            }
        }
        violations
    }
}

/// Last value of every ID created or deleted during a session
#[derive(Debug, Clone, Default)]
pub struct SessionIds {
    seen: HashMap<EntityId, Arc<Entity>>,
}

impl SessionIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the IDs a committed edit created or deleted
    pub fn record(&mut self, diff: &Difference) {
        for entity in diff.created().iter().chain(diff.deleted()) {
            self.seen.insert(entity.id(), Arc::clone(entity));
        }
        for change in diff.modified() {
            if let Some(value) = self.seen.get_mut(&change.to.id()) {
                *value = Arc::clone(&change.to);
            }
        }
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.seen.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Entities created by `diff` under an ID the session used for something else
    pub fn reused(&self, diff: &Difference) -> Vec<Violation> {
        diff.created()
            .iter()
            .filter_map(|entity| {
                let previous = self.seen.get(&entity.id())?;
                (**previous != **entity).then(|| {
                    Violation::new(
                        Identity.name(),
                        entity.id(),
                        "reuses the id of another entity from this session",
                    )
                })
            })
            .collect()
    }
}

fn is_base_value(base: &Graph, entity: &Arc<Entity>) -> bool {
    base.has_entity(entity.id())
        .is_some_and(|original| Arc::ptr_eq(original, entity) || **original == **entity)
}

/// Runs all registered checks over a transition
#[derive(Debug)]
pub struct IntegrityEngine {
    checks: Vec<Box<dyn IntegrityCheck>>,
}

impl IntegrityEngine {
    /// Create engine with the default checks
    pub fn new() -> Self {
        Self {
            checks: vec![
                Box::new(ReferencesResolve),
                Box::new(NoDanglingParents),
                Box::new(IndexConsistency),
                Box::new(MonotonicVersion),
                Box::new(Identity),
            ],
        }
    }

    /// Engine without any checks
    pub fn empty() -> Self {
        Self { checks: Vec::new() }
    }

    pub fn with_check(mut self, check: impl IntegrityCheck + 'static) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    pub fn check_names(&self) -> Vec<&'static str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    /// Every violation introduced between `before` and `after`
    pub fn check(&self, before: &Graph, after: &Graph) -> Vec<Violation> {
        self.run(before, after, None)
    }

    /// Like [`check`](Self::check), also rejecting IDs the session already used.
    /// Reuse is only reported when the identity check is registered.
    pub fn check_session(&self, before: &Graph, after: &Graph, session: &SessionIds) -> Vec<Violation> {
        self.run(before, after, Some(session))
    }

    fn run(&self, before: &Graph, after: &Graph, session: Option<&SessionIds>) -> Vec<Violation> {
        let diff = Difference::new(before, after);
        if diff.is_empty() {
            return Vec::new();
        }

        let mut violations = Vec::new();
        for check in &self.checks {
            violations.append(&mut check.check(before, after, &diff));
        }
        if let Some(session) = session {
            if self.check_names().contains(&Identity.name()) {
                violations.append(&mut session.reused(&diff));
            }
        }
        violations
    }

    /// Verify a whole snapshot against its base
    pub fn check_graph(&self, graph: &Graph) -> Vec<Violation> {
        self.check(&graph.base(), graph)
    }
}

impl Default for IntegrityEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_graph::{Member, Node, Relation, Way};

    fn n(num: i64) -> EntityId {
        EntityId::node(num)
    }

    fn w(num: i64) -> EntityId {
        EntityId::way(num)
    }

    fn r(num: i64) -> EntityId {
        EntityId::relation(num)
    }

    fn base() -> Graph {
        Graph::new(vec![
            Node::new(n(1), [0.0, 0.0]).into(),
            Node::new(n(2), [1.0, 0.0]).into(),
            Way::new(w(1), vec![n(1), n(2)]).into(),
            // incomplete: w9 was never loaded
            Relation::new(r(1), vec![Member::new(w(9), "outer")]).into(),
        ])
    }

    fn checks(violations: &[Violation]) -> Vec<&'static str> {
        violations.iter().map(|v| v.check).collect()
    }

    #[test]
    fn test_clean_edit_passes() {
        let engine = IntegrityEngine::new();
        let graph = base();
        let node = graph.node(n(1)).unwrap().with_loc([3.0, 3.0]);
        let next = graph.replace(node).replace(Node::new(n(-1), [2.0, 0.0]));
        assert!(engine.check(&graph, &next).is_empty());
        assert!(engine.check(&graph, &graph).is_empty());
    }

    #[test]
    fn test_unresolved_way_node() {
        let graph = base();
        let next = graph.replace(Way::new(w(-1), vec![n(1), n(-5)]));
        let violations = IntegrityEngine::new().check(&graph, &next);
        assert_eq!(checks(&violations), vec!["references_resolve"]);
        assert_eq!(violations[0].to_string(), "w-1: node n-5 does not resolve");
    }

    #[test]
    fn test_incomplete_relation_tolerated_until_new_member() {
        let engine = IntegrityEngine::new();
        let graph = base();
        let relation = graph.relation(r(1)).unwrap();

        let retagged = graph.replace(relation.with_tags(atlas_graph::tags([("type", "multipolygon")])));
        assert!(engine.check(&graph, &retagged).is_empty());

        let extended = relation
            .add_member(Member::new(w(8), "inner"), None)
            .unwrap();
        let broken = graph.replace(extended);
        let violations = engine.check(&graph, &broken);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].message, "member w8 does not resolve");
    }

    #[test]
    fn test_raw_remove_leaves_dangling_parent() {
        let graph = base();
        let next = graph.remove(n(2));
        let names = checks(&IntegrityEngine::new().check(&graph, &next));
        assert!(names.contains(&"no_dangling_parents"));
    }

    #[test]
    fn test_version_must_grow() {
        let engine = IntegrityEngine::new();
        let graph = base();

        let moved = graph.node(n(1)).unwrap().with_loc([5.0, 5.0]);
        let edited = graph.replace(moved);
        // same version, different value
        let stale = edited.replace(Node::new(n(1), [6.0, 6.0]));
        assert_eq!(checks(&engine.check(&edited, &stale)), vec!["monotonic_version"]);

        // going back to the base value is allowed
        assert!(engine.check(&edited, &edited.revert(n(1))).is_empty());
    }

    #[test]
    fn test_identity_violations() {
        let engine = IntegrityEngine::new();
        let graph = base();

        let mislabeled = graph.replace(Node::new(w(-3), [0.0, 0.0]));
        let violations = engine.check(&graph, &mislabeled);
        assert_eq!(checks(&violations), vec!["identity"]);

        let deleted = graph.remove(w(1));
        let reused = deleted.replace(Way::new(w(1), vec![n(2), n(1)]));
        let violations = engine.check(&deleted, &reused);
        assert_eq!(checks(&violations), vec!["identity"]);
        assert_eq!(violations[0].message, "re-created with a different value");
    }

    #[test]
    fn test_session_ids_reject_reuse_after_delete() {
        let engine = IntegrityEngine::new();
        let graph = base();
        let mut session = SessionIds::new();

        let bench = Node::new(n(-1), [0.0, 1.0]).with_tags(atlas_graph::tags([("amenity", "bench")]));
        let created = graph.replace(bench.clone());
        assert!(engine.check_session(&graph, &created, &session).is_empty());
        session.record(&Difference::new(&graph, &created));

        let deleted = created.remove(n(-1));
        session.record(&Difference::new(&created, &deleted));
        assert!(session.contains(n(-1)));

        let reused = deleted.replace(Node::new(n(-1), [5.0, 5.0]));
        let violations = engine.check_session(&deleted, &reused, &session);
        assert_eq!(checks(&violations), vec!["identity"]);
        assert_eq!(violations[0].id, n(-1));

        // putting the same entity back is not a reuse
        let restored = deleted.replace(bench);
        assert!(engine.check_session(&deleted, &restored, &session).is_empty());

        // without the identity check nothing is reported
        let lenient = IntegrityEngine::empty();
        assert!(lenient.check_session(&deleted, &reused, &session).is_empty());
        assert!(engine.check(&deleted, &reused).is_empty());
    }

    #[derive(Debug)]
    struct NoNewRelations;

    impl IntegrityCheck for NoNewRelations {
        fn name(&self) -> &'static str {
            "no_new_relations"
        }

        fn check(&self, _before: &Graph, _after: &Graph, diff: &Difference) -> Vec<Violation> {
            diff.created()
                .iter()
                .filter(|e| e.kind() == EntityKind::Relation)
                .map(|e| Violation::new(self.name(), e.id(), "relations are read-only"))
                .collect()
        }
    }

    #[test]
    fn test_custom_check_and_check_graph() {
        let engine = IntegrityEngine::empty().with_check(NoNewRelations);
        assert_eq!(engine.check_names(), vec!["no_new_relations"]);

        let graph = base().replace(Relation::new(r(-1), vec![Member::new(n(1), "")]));
        let violations = engine.check_graph(&graph);
        assert_eq!(violations, vec![Violation::new("no_new_relations", r(-1), "relations are read-only")]);
    }
}
