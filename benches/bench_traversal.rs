use std::{sync::Arc, time::Duration};

use criterion::{Criterion, criterion_group, criterion_main};
use lineagegraph::{
    ChangeType, EngineConfig, GraphSnapshot, ImpactRequest, LineageEngine, LineageQuery,
    PathWeighting, TraversalAlgorithm,
    synthetic::{LineageShape, generate_lineage, node_id},
    traverse,
};

const CHAIN_SEED: u64 = 0xDD21;
const LAYERED_SEED: u64 = 0xEE45;
const RANDOM_SEED: u64 = 0xFF89;
const SAMPLE_SIZE: usize = 20;
const WARM_UP: Duration = Duration::from_millis(300);
const MEASURE: Duration = Duration::from_millis(500);

struct PreparedGraph {
    snapshot: Arc<GraphSnapshot>,
    root: String,
    label: &'static str,
}

fn bench_scale() -> usize {
    #[cfg(feature = "bench-ci")]
    {
        10_000
    }
    #[cfg(not(feature = "bench-ci"))]
    {
        50_000
    }
}

fn prepare(shape: LineageShape, nodes: usize, seed: u64, label: &'static str) -> PreparedGraph {
    let data = generate_lineage(shape, nodes, seed);
    let snapshot = Arc::new(data.to_snapshot().expect("snapshot"));
    PreparedGraph {
        snapshot,
        root: node_id(nodes / 2),
        label,
    }
}

fn prepared_graphs() -> Vec<PreparedGraph> {
    let nodes = bench_scale();
    vec![
        prepare(LineageShape::Chain, nodes, CHAIN_SEED, "chain"),
        prepare(LineageShape::LayeredDag { width: 50 }, nodes, LAYERED_SEED, "layered"),
        prepare(LineageShape::RandomDag { parents: 3 }, nodes, RANDOM_SEED, "random"),
    ]
}

fn bench_algorithms(c: &mut Criterion) {
    let graphs = prepared_graphs();
    let algorithms = [
        ("bfs", TraversalAlgorithm::BreadthFirst),
        ("dfs", TraversalAlgorithm::DepthFirst),
        ("shortest", TraversalAlgorithm::ShortestPath),
        ("critical", TraversalAlgorithm::CriticalPath),
    ];
    for (name, algorithm) in algorithms {
        let mut group = c.benchmark_group(name);
        group.sample_size(SAMPLE_SIZE);
        group.warm_up_time(WARM_UP);
        group.measurement_time(MEASURE);
        for prepared in &graphs {
            let query = LineageQuery::bidirectional(prepared.root.clone())
                .max_depth(10)
                .algorithm(algorithm);
            group.bench_function(prepared.label, |b| {
                b.iter(|| traverse(&prepared.snapshot, &query));
            });
        }
        group.finish();
    }
}

fn bench_certainty_paths(c: &mut Criterion) {
    let graphs = prepared_graphs();
    let mut group = c.benchmark_group("shortest_certainty");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP);
    group.measurement_time(MEASURE);
    for prepared in &graphs {
        let query = LineageQuery::downstream(prepared.root.clone())
            .max_depth(10)
            .algorithm(TraversalAlgorithm::ShortestPath)
            .weighting(PathWeighting::Certainty);
        group.bench_function(prepared.label, |b| {
            b.iter(|| traverse(&prepared.snapshot, &query));
        });
    }
    group.finish();
}

fn bench_cached_queries(c: &mut Criterion) {
    let data = generate_lineage(LineageShape::RandomDag { parents: 3 }, bench_scale(), RANDOM_SEED);
    let engine = LineageEngine::builder(EngineConfig::default())
        .snapshot(data.to_snapshot().expect("snapshot"))
        .build()
        .expect("engine");
    let query = LineageQuery::downstream(node_id(0)).max_depth(5);
    engine.query_lineage(&query).expect("warm");

    let mut group = c.benchmark_group("engine");
    group.sample_size(SAMPLE_SIZE);
    group.warm_up_time(WARM_UP);
    group.measurement_time(MEASURE);
    group.bench_function("cached_query", |b| {
        b.iter(|| engine.query_lineage(&query).expect("query"));
    });
    let request = ImpactRequest::new(node_id(0), ChangeType::SchemaChange).max_depth(5);
    group.bench_function("impact", |b| {
        b.iter(|| engine.analyze_impact(&request).expect("impact"));
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_algorithms,
    bench_certainty_paths,
    bench_cached_queries
);
criterion_main!(benches);
