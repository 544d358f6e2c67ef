use atlas_graph::{
    tags, Difference, Entity, EntityId, Graph, IdSet, Member, Node, Rebase, Relation, Way,
};
use std::collections::BTreeMap;

fn n(num: i64) -> EntityId {
    EntityId::node(num)
}

fn w(num: i64) -> EntityId {
    EntityId::way(num)
}

fn r(num: i64) -> EntityId {
    EntityId::relation(num)
}

fn fixture() -> Graph {
    let mut entities: Vec<Entity> = (1..=6).map(|i| Node::new(n(i), [i as f64, 0.0]).into()).collect();
    entities.push(Way::new(w(1), vec![n(1), n(2), n(3)]).into());
    entities.push(Way::new(w(2), vec![n(3), n(4), n(5), n(3)]).into());
    entities.push(Relation::new(r(1), vec![Member::new(w(1), "outer"), Member::new(n(6), "label")]).into());
    Graph::new(entities)
}

/// Parent indices rebuilt by scanning every entity
fn scanned_indices(graph: &Graph) -> (BTreeMap<EntityId, IdSet>, BTreeMap<EntityId, IdSet>) {
    let mut ways: BTreeMap<EntityId, IdSet> = BTreeMap::new();
    let mut relations: BTreeMap<EntityId, IdSet> = BTreeMap::new();
    for entity in graph.entities() {
        match entity.as_ref() {
            Entity::Way(way) => {
                for node in way.nodes() {
                    ways.entry(*node).or_default().insert(way.id());
                }
            }
            Entity::Relation(rel) => {
                for member in rel.members() {
                    relations.entry(member.id).or_default().insert(rel.id());
                }
            }
            Entity::Node(_) => {}
        }
    }
    (ways, relations)
}

fn assert_indices_consistent(graph: &Graph) {
    let (ways, relations) = scanned_indices(graph);
    let mut ids: IdSet = graph.entity_ids();
    ids.extend(ways.keys().copied());
    ids.extend(relations.keys().copied());

    for id in ids {
        let expected_ways = ways.get(&id).cloned().unwrap_or_default();
        let actual_ways: IdSet = graph.parent_way_ids(id).collect();
        assert_eq!(actual_ways, expected_ways, "parent ways of {id}");

        let expected_rels = relations.get(&id).cloned().unwrap_or_default();
        let actual_rels: IdSet = graph.parent_relation_ids(id).collect();
        assert_eq!(actual_rels, expected_rels, "parent relations of {id}");
    }
}

/// Small deterministic generator so the edit sequence is reproducible
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: u64) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 33) % bound
    }
}

fn random_edit(graph: &Graph, rng: &mut Lcg, step: i64) -> Graph {
    let ways: Vec<_> = graph.entities().into_iter().filter_map(|e| e.as_way().cloned()).collect();
    let nodes: Vec<_> = graph.entities().into_iter().filter_map(|e| e.as_node().cloned()).collect();

    match rng.next(5) {
        0 => {
            let id = n(-step);
            let graph = graph.replace(Node::new(id, [step as f64, 1.0]));
            match ways.get(rng.next(ways.len().max(1) as u64) as usize) {
                Some(way) => graph.replace(way.add_node(id, None).unwrap()),
                None => graph,
            }
        }
        1 if !nodes.is_empty() => {
            let node = &nodes[rng.next(nodes.len() as u64) as usize];
            graph.update(|u| {
                for parent in graph.parent_ways(node.id()) {
                    u.replace(parent.remove_node(node.id()));
                }
                u.remove(node.id());
            })
        }
        2 if !ways.is_empty() && nodes.len() >= 2 => {
            let a = nodes[rng.next(nodes.len() as u64) as usize].id();
            let b = nodes[rng.next(nodes.len() as u64) as usize].id();
            let way = &ways[rng.next(ways.len() as u64) as usize];
            graph.replace(way.with_nodes(vec![a, b]))
        }
        3 if !ways.is_empty() => {
            let way = &ways[rng.next(ways.len() as u64) as usize];
            graph.replace(Relation::new(r(-step), vec![Member::new(way.id(), "")]))
        }
        _ if !nodes.is_empty() => {
            let node = &nodes[rng.next(nodes.len() as u64) as usize];
            graph.replace(node.with_tags(tags([("step", step.to_string())])))
        }
        _ => graph.clone(),
    }
}

#[test]
fn test_indices_match_full_scan_after_random_edits() {
    let mut graph = fixture();
    let mut rng = Lcg(42);
    for step in 1..=200 {
        graph = random_edit(&graph, &mut rng, step);
        assert_indices_consistent(&graph);
    }
    assert!(graph.depth() <= graph.max_depth());
}

#[test]
fn test_flatten_preserves_indices() {
    let mut graph = fixture();
    let mut rng = Lcg(7);
    for step in 1..=25 {
        graph = random_edit(&graph, &mut rng, step);
    }
    let flat = graph.flatten();
    assert_indices_consistent(&flat);
    assert!(Difference::new(&graph, &flat).is_empty());
    assert_eq!(flat.entity_ids(), graph.entity_ids());
}

#[test]
fn test_old_snapshots_are_unaffected_by_later_edits() {
    let mut snapshots = vec![fixture()];
    let mut rng = Lcg(99);
    for step in 1..=40 {
        let next = random_edit(snapshots.last().unwrap(), &mut rng, step);
        snapshots.push(next);
    }

    let expected: Vec<IdSet> = snapshots.iter().map(Graph::entity_ids).collect();
    let _ = random_edit(&snapshots[10], &mut rng, 1000);
    let after: Vec<IdSet> = snapshots.iter().map(Graph::entity_ids).collect();
    assert_eq!(expected, after);
    for snapshot in &snapshots {
        assert_indices_consistent(snapshot);
    }
}

#[test]
fn test_rebase_keeps_indices_consistent() {
    let base = fixture();
    let edited = base
        .replace(base.way(w(1)).unwrap().remove_node(n(2)))
        .remove(n(2))
        .replace(Node::new(n(-1), [9.0, 9.0]));

    let fetched: Vec<Entity> = vec![
        Node::new(n(7), [7.0, 0.0]).into(),
        Way::new(w(3), vec![n(2), n(7)]).into(),
    ];
    let rebase = Rebase::new(&edited, fetched, false);
    let (rebased, conflicts) = rebase.apply(&edited);

    assert_eq!(conflicts.len(), 1);
    assert!(rebased.has_entity(n(2)).is_some());
    assert!(rebased.has_entity(n(-1)).is_some());
    assert_indices_consistent(&rebased);
    assert_indices_consistent(rebase.base());
}

#[test]
fn test_graph_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Graph>();
    assert_send_sync::<Entity>();

    let graph = fixture().replace(Node::new(n(-1), [0.0, 0.0]));
    let handle = std::thread::spawn(move || graph.entity_ids().len());
    assert_eq!(handle.join().unwrap(), 10);
}
