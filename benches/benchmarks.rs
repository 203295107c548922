//! Benchmark suite for the default collaborators.
//!
//! - Clustering (k-means, k-medoids)
//! - Silhouette scoring
//! - Information-gain ranking
//!
//! # Running Benchmarks
//!
//! ```bash
//! cargo bench
//! cargo bench -- --save-baseline main
//! cargo bench -- --baseline main
//! ```

use cohortsift::collab::{silhouette_score, Clusterer, KMeansClusterer, KMedoidsClusterer};
use cohortsift::collab::info_gain::rank_attributes;
use cohortsift::dataset::arff::{ArffAttribute, ArffData, ArffKind};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const N_FEATURES: usize = 20;
const N_CLUSTERS: usize = 3;

/// Rows drawn around `N_CLUSTERS` well-separated centres.
fn synthetic_matrix(n_rows: usize) -> (Array2<f64>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(42);
    let groups: Vec<usize> = (0..n_rows).map(|i| i % N_CLUSTERS).collect();
    let data = Array2::from_shape_fn((n_rows, N_FEATURES), |(r, _)| {
        groups[r] as f64 * 5.0 + rng.gen_range(-1.0..1.0)
    });
    (data, groups)
}

fn synthetic_arff(n_rows: usize) -> ArffData {
    let (data, groups) = synthetic_matrix(n_rows);
    let mut attributes: Vec<ArffAttribute> = (0..N_FEATURES)
        .map(|c| ArffAttribute {
            name: format!("F{c}"),
            kind: ArffKind::Numeric,
        })
        .collect();
    attributes.push(ArffAttribute {
        name: "cluster_id".to_string(),
        kind: ArffKind::Nominal((0..N_CLUSTERS).map(|g| g.to_string()).collect()),
    });

    let rows = data
        .rows()
        .into_iter()
        .zip(&groups)
        .map(|(row, group)| {
            row.iter()
                .map(|v| Some(format!("{v:.4}")))
                .chain(std::iter::once(Some(group.to_string())))
                .collect()
        })
        .collect();

    ArffData {
        relation: "BENCH".to_string(),
        attributes,
        rows,
    }
}

// ============================================================================
// Clustering Benchmarks
// ============================================================================

fn bench_clustering(c: &mut Criterion) {
    let mut group = c.benchmark_group("clustering");

    for size in [100, 500, 1000] {
        let (data, _) = synthetic_matrix(size);
        group.throughput(Throughput::Elements(size as u64));

        let kmeans = KMeansClusterer::new().with_seed(1);
        group.bench_with_input(BenchmarkId::new("kmeans", size), &data, |b, data| {
            b.iter(|| kmeans.cluster(black_box(data), N_CLUSTERS));
        });

        if size <= 500 {
            let kmedoids = KMedoidsClusterer::new().with_seed(1);
            group.bench_with_input(BenchmarkId::new("kmedoids", size), &data, |b, data| {
                b.iter(|| kmedoids.cluster(black_box(data), N_CLUSTERS));
            });
        }
    }

    group.finish();
}

fn bench_silhouette(c: &mut Criterion) {
    let mut group = c.benchmark_group("silhouette");

    for size in [100, 500, 1000] {
        let (data, labels) = synthetic_matrix(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| silhouette_score(black_box(data), black_box(&labels)));
        });
    }

    group.finish();
}

// ============================================================================
// Ranking Benchmarks
// ============================================================================

fn bench_info_gain(c: &mut Criterion) {
    let mut group = c.benchmark_group("info_gain");

    for size in [100, 1000, 5000] {
        let arff = synthetic_arff(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &arff, |b, arff| {
            b.iter(|| rank_attributes(black_box(arff), "cluster_id", 10));
        });
    }

    group.finish();
}

criterion_group!(clustering_benches, bench_clustering, bench_silhouette);

criterion_group!(ranking_benches, bench_info_gain);

criterion_main!(clustering_benches, ranking_benches);
