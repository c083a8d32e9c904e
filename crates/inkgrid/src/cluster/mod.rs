//! Variant clustering: deterministic k-means over feature vectors.
//!
//! The clusterer targets small inputs (tens of occurrences per character),
//! so it trades convergence checks and empty-cluster re-seeding for a fixed
//! number of rounds and a reproducible initialization:
//!
//! - `k = clamp(round(sqrt(n / 2)), min, max)`, capped at `n`
//! - centroid `c` starts at the vector in position `floor(c·(n−1) / max(1, k−1))`
//! - each round assigns every vector to its nearest centroid (first wins ties)
//!   and moves every non-empty centroid to the mean of its members
//!
//! Clusters are emitted largest first; each one's representative is the
//! member closest to its final centroid.

use crate::core::config::AtlasConfig;
use crate::similarity::euclidean_distance;
use crate::types::{Cluster, FeatureVector, OccurrenceId};

/// Tuning constants of the clusterer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterParams {
    pub iterations: usize,
    pub min_clusters: usize,
    pub max_clusters: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self::from(&AtlasConfig::default())
    }
}

impl From<&AtlasConfig> for ClusterParams {
    fn from(config: &AtlasConfig) -> Self {
        Self {
            iterations: config.kmeans_iterations,
            min_clusters: config.min_clusters,
            max_clusters: config.max_clusters,
        }
    }
}

impl ClusterParams {
    /// Number of clusters for `n` occurrences.
    pub fn cluster_count(&self, n: usize) -> usize {
        let k = ((n as f64) / 2.0).sqrt().round() as usize;
        k.clamp(self.min_clusters, self.max_clusters).min(n)
    }
}

/// Centroids and per-vector assignments after the final round.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeans {
    pub assignments: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
}

/// Run `iterations` rounds of k-means with evenly spaced initial centroids.
pub fn kmeans(vectors: &[&[f64]], k: usize, iterations: usize) -> KMeans {
    let n = vectors.len();
    let k = k.min(n);
    if k == 0 {
        return KMeans {
            assignments: Vec::new(),
            centroids: Vec::new(),
        };
    }

    let dims = vectors[0].len();
    let mut centroids: Vec<Vec<f64>> = (0..k)
        .map(|c| vectors[(c * (n - 1)) / (k - 1).max(1)].to_vec())
        .collect();
    let mut assignments = vec![0usize; n];

    for _ in 0..iterations {
        for (i, vector) in vectors.iter().enumerate() {
            assignments[i] = nearest(vector, &centroids);
        }

        let mut sums = vec![vec![0.0f64; dims]; k];
        let mut counts = vec![0usize; k];
        for (vector, &c) in vectors.iter().zip(&assignments) {
            counts[c] += 1;
            for (sum, value) in sums[c].iter_mut().zip(vector.iter()) {
                *sum += value;
            }
        }

        for ((centroid, sum), &count) in centroids.iter_mut().zip(sums).zip(&counts) {
            if count == 0 {
                continue;
            }
            let inv = 1.0 / count as f64;
            *centroid = sum.into_iter().map(|s| s * inv).collect();
        }
    }

    KMeans { assignments, centroids }
}

fn nearest(vector: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (c, centroid) in centroids.iter().enumerate() {
        let d = euclidean_distance(vector, centroid);
        if d < best_distance {
            best_distance = d;
            best = c;
        }
    }
    best
}

/// Partition `items` into variant clusters.
///
/// Every item lands in exactly one cluster. `items` should be ordered by
/// identity; that order drives initialization and member order, which makes
/// the result reproducible.
pub fn cluster_occurrences(items: &[(OccurrenceId, FeatureVector)], params: &ClusterParams) -> Vec<Cluster> {
    let vectors: Vec<&[f64]> = items.iter().map(|(_, vector)| vector.values()).collect();
    let k = params.cluster_count(items.len());
    let result = kmeans(&vectors, k, params.iterations);

    let mut clusters: Vec<Cluster> = result
        .centroids
        .iter()
        .enumerate()
        .filter_map(|(c, centroid)| {
            let members: Vec<usize> = (0..items.len()).filter(|&i| result.assignments[i] == c).collect();
            let representative = members.iter().copied().min_by(|&a, &b| {
                euclidean_distance(vectors[a], centroid).total_cmp(&euclidean_distance(vectors[b], centroid))
            })?;
            Some(Cluster {
                id: c,
                members: members.iter().map(|&i| items[i].0).collect(),
                representative: items[representative].0,
            })
        })
        .collect();

    order_clusters(&mut clusters);
    clusters
}

/// Sort clusters largest first, ties broken by representative identity.
pub fn order_clusters(clusters: &mut [Cluster]) {
    clusters.sort_by(|a, b| {
        b.members
            .len()
            .cmp(&a.members.len())
            .then_with(|| a.representative.cmp(&b.representative))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn items(points: &[[f64; 2]]) -> Vec<(OccurrenceId, FeatureVector)> {
        points
            .iter()
            .enumerate()
            .map(|(i, p)| (OccurrenceId(i as u32 * 10), FeatureVector::new(1, p.to_vec())))
            .collect()
    }

    #[test]
    fn test_cluster_count() {
        let params = ClusterParams::default();
        assert_eq!(params.cluster_count(2), 2);
        assert_eq!(params.cluster_count(8), 2);
        assert_eq!(params.cluster_count(18), 3);
        assert_eq!(params.cluster_count(40), 4);
        assert_eq!(params.cluster_count(50), 5);
        assert_eq!(params.cluster_count(400), 5);
    }

    #[test]
    fn test_cluster_count_never_exceeds_n() {
        let params = ClusterParams {
            iterations: 10,
            min_clusters: 3,
            max_clusters: 5,
        };
        assert_eq!(params.cluster_count(2), 2);
    }

    #[test]
    fn test_initialization_is_evenly_spaced() {
        let points: Vec<Vec<f64>> = (0..5).map(|i| vec![i as f64]).collect();
        let vectors: Vec<&[f64]> = points.iter().map(Vec::as_slice).collect();
        let result = kmeans(&vectors, 3, 0);
        assert_eq!(result.centroids, vec![vec![0.0], vec![2.0], vec![4.0]]);
    }

    #[test]
    fn test_separates_two_groups() {
        let data = items(&[[0.0, 0.0], [0.1, 0.1], [0.2, 0.0], [10.0, 10.0], [10.1, 10.2], [9.9, 10.0]]);
        let clusters = cluster_occurrences(&data, &ClusterParams::default());

        assert_eq!(clusters.len(), 2);
        let first: HashSet<u32> = clusters[0].members.iter().map(|id| id.0).collect();
        let second: HashSet<u32> = clusters[1].members.iter().map(|id| id.0).collect();
        assert!(first == HashSet::from([0, 10, 20]) || first == HashSet::from([30, 40, 50]));
        assert!(first.is_disjoint(&second));
    }

    #[test]
    fn test_coverage_and_representatives() {
        let points: Vec<[f64; 2]> = (0..40).map(|i| [(i % 7) as f64, (i / 7) as f64 * 1.5]).collect();
        let data = items(&points);
        let clusters = cluster_occurrences(&data, &ClusterParams::default());

        assert!(clusters.len() <= 4);
        let total: usize = clusters.iter().map(Cluster::len).sum();
        assert_eq!(total, 40);

        let mut seen = HashSet::new();
        for cluster in &clusters {
            assert!(cluster.contains(cluster.representative));
            for id in &cluster.members {
                assert!(seen.insert(*id), "occurrence {} appears twice", id);
            }
        }
        assert_eq!(seen.len(), 40);

        for pair in clusters.windows(2) {
            assert!(pair[0].len() >= pair[1].len());
        }
    }

    #[test]
    fn test_clustering_is_deterministic() {
        let points: Vec<[f64; 2]> = (0..23).map(|i| [((i * 37) % 11) as f64, ((i * 13) % 5) as f64]).collect();
        let data = items(&points);
        let params = ClusterParams::default();
        assert_eq!(cluster_occurrences(&data, &params), cluster_occurrences(&data, &params));
    }

    #[test]
    fn test_representative_is_closest_to_centroid() {
        let data = items(&[[0.0, 0.0], [1.0, 0.0], [2.0, 0.0], [100.0, 0.0], [101.0, 0.0]]);
        let clusters = cluster_occurrences(&data, &ClusterParams::default());
        assert_eq!(clusters[0].members, vec![OccurrenceId(0), OccurrenceId(10), OccurrenceId(20)]);
        assert_eq!(clusters[0].representative, OccurrenceId(10));
    }

    #[test]
    fn test_identical_vectors_collapse_into_one_cluster() {
        let data = items(&[[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]]);
        let clusters = cluster_occurrences(&data, &ClusterParams::default());
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 3);
        assert_eq!(clusters[0].representative, OccurrenceId(0));
    }
}
