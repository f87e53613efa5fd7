//! Connected components of the similarity threshold graph.

use petgraph::unionfind::UnionFind;

use crate::similarity::SimilarityMatrix;

use super::ClusterAssignment;

/// Group values connected by a path of edges with `similarity >= threshold`.
///
/// Membership is transitive: if A~B and B~C clear the threshold, A, B and C
/// share a cluster even when A~C does not. A threshold of `1.0` only merges
/// identical strings, so every distinct value stays a singleton.
pub fn connected_components(matrix: &SimilarityMatrix, threshold: f64) -> ClusterAssignment {
    let n = matrix.len();
    if threshold >= 1.0 {
        return ClusterAssignment::singletons(n);
    }

    let mut sets = UnionFind::<usize>::new(n);
    for i in 0..n {
        for j in (i + 1)..n {
            if matrix.get(i, j) >= threshold {
                sets.union(i, j);
            }
        }
    }

    // Root choice is arbitrary; labels are densified by first appearance.
    ClusterAssignment::from_labels(&sets.into_labeling())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chaining_merges_transitively() {
        let m = SimilarityMatrix::from_rows(vec![
            vec![1.0, 0.6, 0.1],
            vec![0.6, 1.0, 0.6],
            vec![0.1, 0.6, 1.0],
        ])
        .unwrap();
        let a = connected_components(&m, 0.5);
        assert_eq!(a.labels(), &[0, 0, 0]);
    }

    #[test]
    fn test_edge_at_threshold_counts() {
        let m = SimilarityMatrix::from_rows(vec![vec![1.0, 0.7], vec![0.7, 1.0]]).unwrap();
        assert_eq!(connected_components(&m, 0.7).cluster_count(), 1);
        assert_eq!(connected_components(&m, 0.71).cluster_count(), 2);
    }

    #[test]
    fn test_threshold_extremes() {
        let m = SimilarityMatrix::from_rows(vec![
            vec![1.0, 1.0, 0.0],
            vec![1.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ])
        .unwrap();
        assert_eq!(connected_components(&m, 1.0).cluster_count(), 3);
        assert_eq!(connected_components(&m, 0.0).cluster_count(), 1);
    }

    #[test]
    fn test_labels_follow_first_appearance() {
        // 0 and 3 link, 1 and 2 link: labels are dense by first member.
        let linked = [(0, 3), (1, 2)];
        let m = SimilarityMatrix::from_pairs(4, |i, j| {
            if linked.contains(&(i, j)) { 0.9 } else { 0.1 }
        });
        assert_eq!(connected_components(&m, 0.5).labels(), &[0, 1, 1, 0]);
    }
}
