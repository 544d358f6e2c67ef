use atlas_graph::{EntityId, Graph, Node, Way};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// A grid of `size` ways, each with `size` nodes
fn grid(size: i64) -> Graph {
    let mut entities = Vec::new();
    for row in 0..size {
        let mut nodes = Vec::new();
        for col in 0..size {
            let id = EntityId::node(row * size + col + 1);
            entities.push(Node::new(id, [col as f64, row as f64]).into());
            nodes.push(id);
        }
        entities.push(Way::new(EntityId::way(row + 1), nodes).into());
    }
    Graph::new(entities)
}

fn build_base(c: &mut Criterion) {
    c.bench_function("build_base_100x100", |b| b.iter(|| grid(black_box(100))));
}

fn replace_node(c: &mut Criterion) {
    let graph = grid(100);
    let node = graph.node(EntityId::node(5050)).unwrap().clone();

    c.bench_function("replace_node", |b| {
        b.iter(|| graph.replace(black_box(node.with_loc([0.5, 0.5]))))
    });
}

fn lookup_through_layers(c: &mut Criterion) {
    let mut graph = grid(100);
    for i in 1..=30 {
        let node = graph.node(EntityId::node(i)).unwrap().with_loc([i as f64, 0.5]);
        graph = graph.replace(node);
    }

    c.bench_function("lookup_base_entity_depth_30", |b| {
        b.iter(|| graph.has_entity(black_box(EntityId::node(9_000))).is_some())
    });
    c.bench_function("parent_ways_depth_30", |b| {
        b.iter(|| graph.parent_ways(black_box(EntityId::node(15))).len())
    });
}

fn flatten(c: &mut Criterion) {
    let mut graph = grid(100);
    for i in 1..=30 {
        let way = graph.way(EntityId::way(i)).unwrap().remove_node(EntityId::node(i * 100));
        graph = graph.replace(way);
    }

    c.bench_function("flatten_depth_30", |b| b.iter(|| black_box(&graph).flatten()));
}

criterion_group!(benches, build_base, replace_node, lookup_through_layers, flatten);
criterion_main!(benches);
