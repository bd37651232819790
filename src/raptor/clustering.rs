//! Soft clustering with BIC-selected cluster count and a stall guard.
//!
//! Runs k-means for every candidate `k` in `[min_k, min(max_k, n)]`, scores
//! each with a Gaussian-mixture BIC approximation (Open Question (c) in
//! `DESIGN.md`), and keeps the lowest-BIC clustering. If the result would
//! make no progress toward a smaller tree (as many clusters as points, or
//! every cluster a singleton) the stall guard forces a single cluster so
//! the tree-builder level loop always terminates.

use rand::seq::SliceRandom;
use rand::Rng;

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    (1.0 - cosine_similarity(a, b)) as f64
}

fn euclidean_distance_sq(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| ((x - y) as f64).powi(2)).sum()
}

/// Project `vectors` onto `target_dim` dimensions with a fixed random
/// Gaussian projection (Johnson-Lindenstrauss), a cheap UMAP-style stand-in
/// used when the ambient dimensionality is high enough that clustering in
/// the raw space is unreliable. A no-op when `target_dim >= dim`.
pub fn reduce_dimensions(vectors: &[Vec<f32>], target_dim: usize) -> Vec<Vec<f32>> {
    if vectors.is_empty() {
        return Vec::new();
    }
    let dim = vectors[0].len();
    if target_dim >= dim {
        return vectors.to_vec();
    }
    let mut rng = rand::thread_rng();
    let scale = 1.0 / (target_dim as f32).sqrt();
    let projection: Vec<Vec<f32>> = (0..target_dim)
        .map(|_| (0..dim).map(|_| rng.gen_range(-1.0f32..1.0f32) * scale).collect())
        .collect();

    vectors
        .iter()
        .map(|v| {
            projection
                .iter()
                .map(|row| row.iter().zip(v.iter()).map(|(p, x)| p * x).sum())
                .collect()
        })
        .collect()
}

struct KMeansResult {
    assignments: Vec<usize>,
    centroids: Vec<Vec<f32>>,
    wcss: f64,
}

fn kmeans(points: &[Vec<f32>], k: usize, max_iters: usize) -> KMeansResult {
    let n = points.len();
    let dim = points[0].len();
    let mut rng = rand::thread_rng();

    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut rng);
    let mut centroids: Vec<Vec<f32>> = indices.iter().take(k).map(|&i| points[i].clone()).collect();

    let mut assignments = vec![0usize; n];

    for _ in 0..max_iters {
        let mut changed = false;
        for (i, point) in points.iter().enumerate() {
            let mut best = 0;
            let mut best_dist = f64::MAX;
            for (c, centroid) in centroids.iter().enumerate() {
                let d = euclidean_distance_sq(point, centroid);
                if d < best_dist {
                    best_dist = d;
                    best = c;
                }
            }
            if assignments[i] != best {
                changed = true;
            }
            assignments[i] = best;
        }

        let mut sums = vec![vec![0f64; dim]; k];
        let mut counts = vec![0usize; k];
        for (i, point) in points.iter().enumerate() {
            let c = assignments[i];
            counts[c] += 1;
            for d in 0..dim {
                sums[c][d] += point[d] as f64;
            }
        }
        for c in 0..k {
            if counts[c] == 0 {
                continue;
            }
            centroids[c] = sums[c].iter().map(|s| (s / counts[c] as f64) as f32).collect();
        }

        if !changed {
            break;
        }
    }

    let wcss: f64 = points
        .iter()
        .enumerate()
        .map(|(i, p)| euclidean_distance_sq(p, &centroids[assignments[i]]))
        .sum();

    KMeansResult { assignments, centroids, wcss }
}

/// Gaussian-mixture BIC approximation: lower is better.
fn bic(wcss: f64, n: usize, k: usize, dim: usize) -> f64 {
    let n = n as f64;
    let free_params = (dim * k) as f64;
    let log_likelihood = if wcss > 0.0 {
        -0.5 * n * (wcss / n).ln()
    } else {
        f64::MAX / 2.0
    };
    free_params * n.ln() - 2.0 * log_likelihood
}

/// Cluster `embeddings` (by original index), returning groups of indices in
/// ascending order within each group. Applies the stall guard: if the
/// chosen clustering would not reduce the point count (as many clusters as
/// points, or every cluster a singleton), a single cluster containing
/// everything is returned instead.
pub fn cluster(embeddings: &[Vec<f32>], min_k: usize, max_k: usize) -> Vec<Vec<usize>> {
    let n = embeddings.len();
    if n <= 1 {
        return vec![(0..n).collect()];
    }

    let effective_max_k = max_k.min(n);
    let effective_min_k = min_k.min(effective_max_k).max(1);

    if effective_max_k <= 1 {
        return vec![(0..n).collect()];
    }

    let points: Vec<Vec<f32>> = if embeddings[0].len() > 8 {
        reduce_dimensions(embeddings, 8)
    } else {
        embeddings.to_vec()
    };
    let dim = points[0].len();

    let mut best_assignments: Option<Vec<usize>> = None;
    let mut best_k = effective_min_k;
    let mut best_bic = f64::MAX;

    for k in effective_min_k..=effective_max_k {
        if k >= n {
            continue;
        }
        let result = kmeans(&points, k, 50);
        let score = bic(result.wcss, n, k, dim);
        if score < best_bic {
            best_bic = score;
            best_k = k;
            best_assignments = Some(result.assignments);
        }
    }

    let assignments = match best_assignments {
        Some(a) => a,
        None => return vec![(0..n).collect()],
    };

    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); best_k];
    for (i, &c) in assignments.iter().enumerate() {
        groups[c].push(i);
    }
    groups.retain(|g| !g.is_empty());

    let all_singletons = groups.iter().all(|g| g.len() == 1);
    if groups.len() >= n || all_singletons {
        return vec![(0..n).collect()];
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_vectors_is_zero() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn single_point_is_its_own_cluster() {
        let groups = cluster(&[vec![1.0, 2.0]], 2, 50);
        assert_eq!(groups, vec![vec![0]]);
    }

    #[test]
    fn max_k_greater_than_n_caps_at_n() {
        let points = vec![vec![0.0, 0.0], vec![10.0, 10.0], vec![20.0, 20.0]];
        let groups = cluster(&points, 2, 50);
        let total: usize = groups.iter().map(|g| g.len()).sum();
        assert_eq!(total, 3);
        assert!(groups.len() <= 3);
    }

    #[test]
    fn well_separated_clusters_are_recovered() {
        let points = vec![
            vec![0.0, 0.0],
            vec![0.1, 0.1],
            vec![0.0, 0.2],
            vec![50.0, 50.0],
            vec![50.1, 50.1],
            vec![50.0, 49.9],
        ];
        let groups = cluster(&points, 2, 4);
        assert_eq!(groups.len(), 2);
        let total: usize = groups.iter().map(|g| g.len()).sum();
        assert_eq!(total, 6);
    }

    #[test]
    fn degenerate_all_identical_points_trigger_stall_guard() {
        let points = vec![vec![1.0, 1.0]; 5];
        let groups = cluster(&points, 2, 5);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 5);
    }

    #[test]
    fn reduce_dimensions_is_noop_when_target_exceeds_source() {
        let vectors = vec![vec![1.0, 2.0, 3.0]];
        let reduced = reduce_dimensions(&vectors, 8);
        assert_eq!(reduced, vectors);
    }

    #[test]
    fn reduce_dimensions_shrinks_vector_length() {
        let vectors = vec![vec![1.0; 16], vec![2.0; 16]];
        let reduced = reduce_dimensions(&vectors, 8);
        assert_eq!(reduced[0].len(), 8);
        assert_eq!(reduced[1].len(), 8);
    }
}
