use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::error::ClusteringError;
use crate::pipeline::context::RunContext;
use crate::pipeline::vectorize::DocumentTermMatrix;

use super::{ClusteringBackend, RawLabel};

/// In-process spherical k-means over L2-normalized term-count rows.
///
/// Stands in for the external solver in tests and on hosts without it.
#[derive(Debug, Clone)]
pub struct KMeansBackend {
    max_iterations: usize,
    seed: Option<u64>,
}

impl KMeansBackend {
    /// `max_iterations` is raised to at least one.
    #[must_use]
    pub fn new(max_iterations: usize, seed: Option<u64>) -> Self {
        Self {
            max_iterations: max_iterations.max(1),
            seed,
        }
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}

#[async_trait]
impl ClusteringBackend for KMeansBackend {
    async fn cluster(
        &self,
        run: &RunContext,
        matrix: &DocumentTermMatrix,
        k: usize,
    ) -> Result<Vec<RawLabel>, ClusteringError> {
        if k == 0 {
            return Err(ClusteringError::backend_unavailable(
                "k-means requires at least one cluster",
            ));
        }
        let points = normalized_rows(matrix);
        let assignments = SphericalKMeans::fit(
            &points,
            matrix.column_count(),
            k,
            self.max_iterations,
            &mut self.rng(),
        );
        debug!(
            run_id = %run.run_id,
            k,
            documents = assignments.len(),
            "in-process k-means finished"
        );
        Ok(assignments.iter().map(ToString::to_string).collect())
    }

    fn name(&self) -> &'static str {
        "kmeans"
    }
}

type SparsePoint = Vec<(usize, f32)>;

fn normalized_rows(matrix: &DocumentTermMatrix) -> Vec<SparsePoint> {
    matrix
        .rows()
        .iter()
        .map(|row| {
            let norm = row
                .entries()
                .iter()
                .map(|(_, count)| (*count as f32).powi(2))
                .sum::<f32>()
                .sqrt();
            row.entries()
                .iter()
                .map(|(index, count)| {
                    let value = if norm > 0.0 { *count as f32 / norm } else { 0.0 };
                    (*index, value)
                })
                .collect()
        })
        .collect()
}

struct SphericalKMeans;

impl SphericalKMeans {
    /// Returns one cluster index per point.
    fn fit(
        points: &[SparsePoint],
        dim: usize,
        k: usize,
        max_iterations: usize,
        rng: &mut StdRng,
    ) -> Vec<usize> {
        if points.is_empty() || dim == 0 {
            return vec![0; points.len()];
        }

        let k = k.min(points.len());
        let mut centroids = farthest_first_centroids(points, dim, k, rng);

        let mut assignments = vec![usize::MAX; points.len()];
        for _ in 0..max_iterations {
            // E-step: nearest centroid by cosine similarity
            let new_assignments: Vec<usize> = points
                .iter()
                .map(|point| nearest(point, &centroids))
                .collect();
            if new_assignments == assignments {
                break;
            }
            assignments = new_assignments;

            // M-step
            let mut sums = vec![vec![0.0_f32; dim]; k];
            let mut counts = vec![0_usize; k];
            for (point, &cluster) in points.iter().zip(&assignments) {
                for &(index, value) in point {
                    sums[cluster][index] += value;
                }
                counts[cluster] += 1;
            }

            for (cluster, sum) in sums.into_iter().enumerate() {
                if counts[cluster] > 0 {
                    centroids[cluster] = normalize_dense(sum);
                } else if let Some(point) = points.choose(rng) {
                    centroids[cluster] = densify(point, dim);
                }
            }
        }

        assignments
    }
}

/// Random first centroid, then repeatedly the point least similar to every chosen one.
fn farthest_first_centroids(
    points: &[SparsePoint],
    dim: usize,
    k: usize,
    rng: &mut StdRng,
) -> Vec<Vec<f32>> {
    let Some(first) = points.choose(rng) else {
        return Vec::new();
    };
    let mut centroids = vec![densify(first, dim)];
    let mut closest: Vec<f32> = points
        .iter()
        .map(|point| similarity(point, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let Some((farthest, _)) = closest
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
        else {
            break;
        };
        let centroid = densify(&points[farthest], dim);
        for (point, best) in points.iter().zip(closest.iter_mut()) {
            *best = best.max(similarity(point, &centroid));
        }
        centroids.push(centroid);
    }
    centroids
}

fn similarity(point: &SparsePoint, centroid: &[f32]) -> f32 {
    point
        .iter()
        .map(|&(index, value)| value * centroid[index])
        .sum()
}

fn densify(point: &SparsePoint, dim: usize) -> Vec<f32> {
    let mut dense = vec![0.0; dim];
    for &(index, value) in point {
        dense[index] = value;
    }
    dense
}

fn normalize_dense(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }
    vector
}

fn nearest(point: &SparsePoint, centroids: &[Vec<f32>]) -> usize {
    let mut best_cluster = 0;
    let mut best_similarity = f32::NEG_INFINITY;
    for (cluster, centroid) in centroids.iter().enumerate() {
        let score = similarity(point, centroid);
        if score > best_similarity {
            best_similarity = score;
            best_cluster = cluster;
        }
    }
    best_cluster
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::vectorize::vectorize;

    fn words(text: &str) -> Vec<String> {
        text.split_whitespace().map(ToString::to_string).collect()
    }

    fn two_topic_matrix() -> DocumentTermMatrix {
        vectorize(&[
            words("apec summit leaders beijing"),
            words("apec summit beijing trade"),
            words("apec leaders summit"),
            words("football match goal striker"),
            words("football striker goal"),
            words("match goal football league"),
        ])
        .expect("vectorize")
    }

    #[tokio::test]
    async fn separates_disjoint_topics() {
        let backend = KMeansBackend::new(20, Some(7));
        let run = RunContext::new("unused", "topic");

        let labels = backend
            .cluster(&run, &two_topic_matrix(), 2)
            .await
            .expect("k-means succeeds");

        assert_eq!(labels.len(), 6);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[1], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[4], labels[5]);
        assert_ne!(labels[0], labels[3]);
    }

    #[tokio::test]
    async fn seeded_runs_are_reproducible() {
        let backend = KMeansBackend::new(20, Some(42));
        let run = RunContext::new("unused", "topic");
        let matrix = two_topic_matrix();

        let first = backend.cluster(&run, &matrix, 3).await.unwrap();
        let second = backend.cluster(&run, &matrix, 3).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn never_writes_to_the_work_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = KMeansBackend::new(5, Some(1));
        let run = RunContext::new(dir.path(), "topic");

        backend.cluster(&run, &two_topic_matrix(), 2).await.unwrap();
        assert!(!run.work_dir().exists());
    }

    #[tokio::test]
    async fn k_larger_than_documents_is_clamped() {
        let backend = KMeansBackend::new(10, Some(3));
        let run = RunContext::new("unused", "topic");
        let matrix = vectorize(&[words("a b"), words("c d")]).unwrap();

        let labels = backend.cluster(&run, &matrix, 10).await.unwrap();
        assert_eq!(labels.len(), 2);
        assert!(labels.iter().all(|label| label == "0" || label == "1"));
    }

    #[tokio::test]
    async fn zero_iterations_still_assigns_every_document() {
        let backend = KMeansBackend::new(0, Some(1));
        let run = RunContext::new("unused", "topic");

        let labels = backend.cluster(&run, &two_topic_matrix(), 2).await.unwrap();
        assert_eq!(labels.len(), 6);
        assert!(labels.iter().all(|label| label == "0" || label == "1"));
    }

    #[tokio::test]
    async fn empty_vocabulary_puts_everything_in_one_group() {
        let backend = KMeansBackend::new(10, Some(3));
        let run = RunContext::new("unused", "topic");
        let matrix = vectorize(&[Vec::<String>::new(), Vec::new()]).unwrap();

        let labels = backend.cluster(&run, &matrix, 2).await.unwrap();
        assert_eq!(labels, vec!["0", "0"]);
    }
}
