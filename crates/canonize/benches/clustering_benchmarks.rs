//! Benchmarks for similarity computation and clustering.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use canonize::clustering::cluster;
use canonize::similarity::character_similarity;
use canonize::{ClusteringMethod, Normalizer, PassConfig, SimilarityMatrix};

const CITIES: &[&str] = &[
    "New York", "Los Angeles", "Chicago", "Houston", "Phoenix", "Philadelphia",
    "San Antonio", "San Diego", "Dallas", "San Jose", "Austin", "Boston",
];

/// Distinct values with case, spacing and typo variants of real names.
fn generate_values(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let base = CITIES[i % CITIES.len()];
            match (i / CITIES.len()) % 4 {
                0 => base.to_string(),
                1 => base.to_lowercase(),
                2 => format!("{} ", base.to_uppercase()),
                _ => format!("{}{}", &base[..base.len() - 1], i),
            }
        })
        .collect()
}

fn generate_column(rows: usize) -> Vec<String> {
    let values = generate_values(48);
    (0..rows).map(|i| values[(i * 7) % values.len()].clone()).collect()
}

fn bench_character_similarity(c: &mut Criterion) {
    let mut group = c.benchmark_group("character_similarity");

    for count in [25, 50, 100, 200] {
        let values = generate_values(count);
        group.throughput(Throughput::Elements((count * (count - 1) / 2) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &values, |b, values| {
            b.iter(|| character_similarity(black_box(values)));
        });
    }

    group.finish();
}

fn bench_clustering(c: &mut Criterion) {
    let mut group = c.benchmark_group("clustering");
    let methods = [
        ClusteringMethod::Hierarchical {
            similarity_threshold: 0.82,
        },
        ClusteringMethod::ConnectedComponents {
            similarity_threshold: 0.88,
        },
        ClusteringMethod::affinity_propagation(),
    ];

    for count in [50, 100, 200] {
        let matrix: SimilarityMatrix = character_similarity(&generate_values(count));
        for method in &methods {
            group.bench_with_input(BenchmarkId::new(method.name(), count), &matrix, |b, m| {
                b.iter(|| cluster(black_box(m), method));
            });
        }
    }

    group.finish();
}

fn bench_full_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_pass");
    let normalizer = Normalizer::new();
    let config = PassConfig::new("city");

    for rows in [1_000, 10_000] {
        let column = generate_column(rows);
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &column, |b, column| {
            b.iter(|| normalizer.run_pass(black_box(column), &config, 0));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_character_similarity,
    bench_clustering,
    bench_full_pass
);
criterion_main!(benches);
