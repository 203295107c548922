//! Default clustering algorithms and the silhouette coefficient.
//!
//! Both clusterers seed deterministically: the first centre is row
//! `seed % n_rows`, each further centre is the row farthest from all centres
//! chosen so far (ties go to the lowest row index).

use super::{ClusterAssignment, Clusterer};
use crate::error::{Result, SiftError};
use ndarray::{Array2, ArrayView1};
use tracing::{debug, warn};

const DEFAULT_MAX_ITERATIONS: usize = 300;

fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    squared_distance(a, b).sqrt()
}

fn validate_input(name: &str, data: &Array2<f64>, n_clusters: usize) -> Result<()> {
    let n_rows = data.nrows();
    if n_clusters == 0 {
        return Err(SiftError::collaborator(name, "n_clusters must be at least 1"));
    }
    if n_rows < n_clusters {
        return Err(SiftError::collaborator(
            name,
            format!("{n_rows} rows cannot form {n_clusters} clusters"),
        ));
    }
    if data.iter().any(|v| !v.is_finite()) {
        return Err(SiftError::collaborator(name, "matrix contains non-finite values"));
    }
    Ok(())
}

/// Row indices of `k` well-spread starting centres.
fn farthest_point_seeds(data: &Array2<f64>, k: usize, seed: u64) -> Vec<usize> {
    let n = data.nrows();
    let first = usize::try_from(seed % n as u64).unwrap_or(0);
    let mut seeds = vec![first];
    let mut min_distances = vec![f64::INFINITY; n];

    while seeds.len() < k {
        let last = data.row(seeds[seeds.len() - 1]);
        for (i, row) in data.rows().into_iter().enumerate() {
            let d = squared_distance(row, last);
            if d < min_distances[i] {
                min_distances[i] = d;
            }
        }

        let mut best = None;
        let mut best_distance = -1.0;
        for (i, d) in min_distances.iter().enumerate() {
            if seeds.contains(&i) {
                continue;
            }
            if *d > best_distance {
                best_distance = *d;
                best = Some(i);
            }
        }
        match best {
            Some(i) => seeds.push(i),
            None => break,
        }
    }
    seeds
}

/// Renumber labels 0.. in order of first appearance.
fn densify(labels: &[usize]) -> Vec<usize> {
    let mut mapping: Vec<(usize, usize)> = Vec::new();
    labels
        .iter()
        .map(|label| {
            if let Some((_, dense)) = mapping.iter().find(|(l, _)| l == label) {
                *dense
            } else {
                let dense = mapping.len();
                mapping.push((*label, dense));
                dense
            }
        })
        .collect()
}

fn nearest(row: ArrayView1<'_, f64>, centres: &Array2<f64>) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (j, centre) in centres.rows().into_iter().enumerate() {
        let d = squared_distance(row, centre);
        if d < best_distance {
            best_distance = d;
            best = j;
        }
    }
    best
}

// ============================================================================
// Silhouette
// ============================================================================

/// Mean silhouette coefficient over all rows, Euclidean distance.
///
/// Returns 0.0 when there are fewer than two clusters or every row is its
/// own cluster, where the coefficient is undefined. Singleton clusters
/// contribute 0.
#[must_use]
pub fn silhouette_score(data: &Array2<f64>, labels: &[usize]) -> f64 {
    let n = data.nrows();
    let n_clusters = labels.iter().copied().max().map_or(0, |m| m + 1);
    let mut sizes = vec![0usize; n_clusters];
    for label in labels {
        sizes[*label] += 1;
    }
    let populated = sizes.iter().filter(|s| **s > 0).count();
    if populated < 2 || populated >= n {
        return 0.0;
    }

    let mut total = 0.0;
    for i in 0..n {
        let own = labels[i];
        if sizes[own] <= 1 {
            continue;
        }

        let mut sums = vec![0.0; n_clusters];
        for j in 0..n {
            if i != j {
                sums[labels[j]] += distance(data.row(i), data.row(j));
            }
        }

        let a = sums[own] / (sizes[own] - 1) as f64;
        let b = (0..n_clusters)
            .filter(|c| *c != own && sizes[*c] > 0)
            .map(|c| sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);

        let denom = a.max(b);
        if denom > 0.0 {
            total += (b - a) / denom;
        }
    }
    total / n as f64
}

// ============================================================================
// K-Means
// ============================================================================

/// Lloyd's algorithm with farthest-point seeding.
#[derive(Debug, Clone)]
pub struct KMeansClusterer {
    max_iterations: usize,
    seed: u64,
}

impl Default for KMeansClusterer {
    fn default() -> Self {
        Self::new()
    }
}

impl KMeansClusterer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            seed: 0,
        }
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

impl Clusterer for KMeansClusterer {
    fn name(&self) -> &str {
        "kmeans"
    }

    fn cluster(&self, data: &Array2<f64>, n_clusters: usize) -> Result<ClusterAssignment> {
        validate_input(self.name(), data, n_clusters)?;
        let (n, dim) = data.dim();

        let seeds = farthest_point_seeds(data, n_clusters, self.seed);
        let mut centres = Array2::<f64>::zeros((seeds.len(), dim));
        for (j, &row) in seeds.iter().enumerate() {
            centres.row_mut(j).assign(&data.row(row));
        }

        let mut labels = vec![usize::MAX; n];
        let mut converged = false;
        let mut iterations = 0;
        while iterations < self.max_iterations {
            iterations += 1;

            let mut changed = false;
            for (i, row) in data.rows().into_iter().enumerate() {
                let label = nearest(row, &centres);
                if labels[i] != label {
                    labels[i] = label;
                    changed = true;
                }
            }
            if !changed {
                converged = true;
                break;
            }

            let mut sums = Array2::<f64>::zeros(centres.dim());
            let mut counts = vec![0usize; centres.nrows()];
            for (i, row) in data.rows().into_iter().enumerate() {
                let mut target = sums.row_mut(labels[i]);
                target += &row;
                counts[labels[i]] += 1;
            }
            for (j, count) in counts.iter().enumerate() {
                // Empty clusters keep their previous centre.
                if *count > 0 {
                    let mean = sums.row(j).mapv(|v| v / *count as f64);
                    centres.row_mut(j).assign(&mean);
                }
            }
        }

        if converged {
            debug!("kmeans converged after {} iterations", iterations);
        } else {
            warn!(
                "kmeans did not converge within {} iterations, using last assignment",
                self.max_iterations
            );
        }

        let labels = densify(&labels);
        let score = silhouette_score(data, &labels);
        Ok(ClusterAssignment { labels, score })
    }
}

// ============================================================================
// K-Medoids
// ============================================================================

/// Alternating k-medoids (Voronoi iteration) on a precomputed distance
/// matrix.
#[derive(Debug, Clone)]
pub struct KMedoidsClusterer {
    max_iterations: usize,
    seed: u64,
}

impl Default for KMedoidsClusterer {
    fn default() -> Self {
        Self::new()
    }
}

impl KMedoidsClusterer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            seed: 0,
        }
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

impl Clusterer for KMedoidsClusterer {
    fn name(&self) -> &str {
        "kmedoids"
    }

    fn cluster(&self, data: &Array2<f64>, n_clusters: usize) -> Result<ClusterAssignment> {
        validate_input(self.name(), data, n_clusters)?;
        let n = data.nrows();

        let mut distances = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            for j in (i + 1)..n {
                let d = distance(data.row(i), data.row(j));
                distances[[i, j]] = d;
                distances[[j, i]] = d;
            }
        }

        let mut medoids = farthest_point_seeds(data, n_clusters, self.seed);
        let assign = |medoids: &[usize]| -> Vec<usize> {
            (0..n)
                .map(|i| {
                    let mut best = 0;
                    for (j, &m) in medoids.iter().enumerate() {
                        if distances[[i, m]] < distances[[i, medoids[best]]] {
                            best = j;
                        }
                    }
                    best
                })
                .collect()
        };

        let mut labels = assign(&medoids);
        for iteration in 0..self.max_iterations {
            let mut updated = medoids.clone();
            for (j, medoid) in updated.iter_mut().enumerate() {
                let members: Vec<usize> = (0..n).filter(|i| labels[*i] == j).collect();
                let mut best_cost = f64::INFINITY;
                for &candidate in &members {
                    let cost: f64 = members.iter().map(|m| distances[[candidate, *m]]).sum();
                    if cost < best_cost {
                        best_cost = cost;
                        *medoid = candidate;
                    }
                }
            }

            if updated == medoids {
                debug!("kmedoids converged after {} iterations", iteration + 1);
                break;
            }
            medoids = updated;
            labels = assign(&medoids);
        }

        let labels = densify(&labels);
        let score = silhouette_score(data, &labels);
        Ok(ClusterAssignment { labels, score })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_blobs() -> Array2<f64> {
        array![
            [0.0, 0.0],
            [0.1, 0.2],
            [0.2, 0.1],
            [10.0, 10.0],
            [10.2, 9.9],
            [9.8, 10.1],
        ]
    }

    #[test]
    fn test_kmeans_separates_blobs() {
        let result = KMeansClusterer::new().cluster(&two_blobs(), 2).unwrap();
        assert_eq!(result.labels, vec![0, 0, 0, 1, 1, 1]);
        assert!(result.score > 0.9);
    }

    #[test]
    fn test_kmedoids_separates_blobs() {
        let result = KMedoidsClusterer::new().cluster(&two_blobs(), 2).unwrap();
        assert_eq!(result.labels, vec![0, 0, 0, 1, 1, 1]);
        assert!(result.score > 0.9);
    }

    #[test]
    fn test_kmeans_is_deterministic() {
        let data = two_blobs();
        let a = KMeansClusterer::new().with_seed(3).cluster(&data, 3).unwrap();
        let b = KMeansClusterer::new().with_seed(3).cluster(&data, 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_labels_are_dense() {
        let result = KMeansClusterer::new().with_seed(4).cluster(&two_blobs(), 3).unwrap();
        let max = *result.labels.iter().max().unwrap();
        for label in 0..=max {
            assert!(result.labels.contains(&label));
        }
        assert_eq!(result.labels[0], 0);
    }

    #[test]
    fn test_too_few_rows() {
        let data = array![[1.0], [2.0]];
        let err = KMeansClusterer::new().cluster(&data, 3).unwrap_err();
        assert!(matches!(err, SiftError::Collaborator { .. }));
    }

    #[test]
    fn test_non_finite_rejected() {
        let data = array![[1.0], [f64::NAN], [3.0]];
        assert!(KMeansClusterer::new().cluster(&data, 2).is_err());
    }

    #[test]
    fn test_silhouette_single_cluster_is_zero() {
        assert_eq!(silhouette_score(&two_blobs(), &[0, 0, 0, 0, 0, 0]), 0.0);
    }

    #[test]
    fn test_silhouette_known_value() {
        // Two points per cluster on a line: a = 1, b = 4.5 for the outer
        // points and a = 1, b = 3.5 for the inner ones.
        let data = array![[0.0], [1.0], [4.0], [5.0]];
        let score = silhouette_score(&data, &[0, 0, 1, 1]);
        let expected = ((3.5 / 4.5) + (2.5 / 3.5)) / 2.0;
        assert!((score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_farthest_point_seeds() {
        let seeds = farthest_point_seeds(&two_blobs(), 2, 0);
        assert_eq!(seeds[0], 0);
        assert!(seeds[1] >= 3);
    }
}
