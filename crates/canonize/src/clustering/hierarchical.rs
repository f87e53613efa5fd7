//! Average-linkage (UPGMA) agglomerative clustering.

use crate::similarity::SimilarityMatrix;

use super::ClusterAssignment;

/// Cluster with average linkage, merging while the mean pairwise similarity
/// between two clusters is at least `similarity_threshold`.
///
/// One strong link cannot pull unrelated values together: it is the average
/// over all member pairs that has to clear the threshold. Average-linkage
/// merge levels never increase, so stopping at the first pair below the
/// threshold gives the same flat clusters as cutting the full tree. Ties are
/// broken by the lowest `(i, j)` cluster pair.
///
/// A threshold of `1.0` only merges identical strings; since the values of a
/// pass are distinct, every value stays a singleton.
pub fn average_linkage(matrix: &SimilarityMatrix, similarity_threshold: f64) -> ClusterAssignment {
    let n = matrix.len();
    if similarity_threshold >= 1.0 {
        return ClusterAssignment::singletons(n);
    }

    let mut linkage: Vec<f64> = (0..n * n).map(|idx| matrix.get(idx / n, idx % n)).collect();
    let mut size = vec![1usize; n];
    let mut active = vec![true; n];
    // Cluster slot each value currently belongs to.
    let mut slot: Vec<usize> = (0..n).collect();

    loop {
        let Some((a, b, level)) = most_similar_pair(&linkage, &active, n) else {
            break;
        };
        if level < similarity_threshold {
            break;
        }

        // Lance-Williams update for average linkage; `b` folds into `a`.
        let (size_a, size_b) = (size[a] as f64, size[b] as f64);
        for k in (0..n).filter(|&k| active[k] && k != a && k != b) {
            let merged =
                (size_a * linkage[a * n + k] + size_b * linkage[b * n + k]) / (size_a + size_b);
            linkage[a * n + k] = merged;
            linkage[k * n + a] = merged;
        }
        size[a] += size[b];
        active[b] = false;
        for s in slot.iter_mut().filter(|s| **s == b) {
            *s = a;
        }
    }

    ClusterAssignment::from_labels(&slot)
}

/// Highest-similarity pair of active clusters, first in `(i, j)` order on ties.
fn most_similar_pair(linkage: &[f64], active: &[bool], n: usize) -> Option<(usize, usize, f64)> {
    let mut best: Option<(usize, usize, f64)> = None;
    for i in (0..n).filter(|&i| active[i]) {
        for j in ((i + 1)..n).filter(|&j| active[j]) {
            let s = linkage[i * n + j];
            if best.is_none_or(|(_, _, current)| s > current) {
                best = Some((i, j, s));
            }
        }
    }
    best
}
