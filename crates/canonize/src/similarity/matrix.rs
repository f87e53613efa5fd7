//! Symmetric similarity matrix with a fixed unit diagonal.

use serde::{Deserialize, Serialize};

use crate::error::{CanonizeError, Result};

/// Tolerance used when validating symmetry of externally built matrices.
const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// n×n similarity matrix.
///
/// Every entry lies in `[0, 1]`, `get(i, j) == get(j, i)` and the diagonal is
/// exactly `1.0`. Writes go through [`SimilarityMatrix::set`], which clamps and
/// mirrors, so the invariants hold for every constructed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatrix {
    n: usize,
    data: Vec<f64>,
}

impl SimilarityMatrix {
    /// Identity matrix: every value is only similar to itself.
    pub fn identity(n: usize) -> Self {
        let mut data = vec![0.0; n * n];
        for i in 0..n {
            data[i * n + i] = 1.0;
        }
        Self { n, data }
    }

    /// Build a matrix by evaluating `f(i, j)` for every pair `i < j`.
    pub fn from_pairs(n: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut matrix = Self::identity(n);
        for i in 0..n {
            for j in (i + 1)..n {
                let score = f(i, j);
                matrix.set(i, j, score);
            }
        }
        matrix
    }

    /// Build a matrix from explicit rows.
    ///
    /// Rows must be square and symmetric. Off-diagonal entries are clamped to
    /// `[0, 1]` and the diagonal is forced to `1.0`.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let n = rows.len();
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != n) {
            return Err(CanonizeError::Validation(format!(
                "Similarity matrix row {} has {} entries, expected {}",
                i,
                row.len(),
                n
            )));
        }

        let mut matrix = Self::identity(n);
        for i in 0..n {
            for j in (i + 1)..n {
                let (a, b) = (rows[i][j], rows[j][i]);
                if a.is_nan() || b.is_nan() {
                    return Err(CanonizeError::Validation(format!(
                        "Similarity matrix entry ({}, {}) is NaN",
                        i, j
                    )));
                }
                if (a - b).abs() > SYMMETRY_TOLERANCE {
                    return Err(CanonizeError::Validation(format!(
                        "Similarity matrix is not symmetric at ({}, {}): {} vs {}",
                        i, j, a, b
                    )));
                }
                matrix.set(i, j, a);
            }
        }
        Ok(matrix)
    }

    /// Number of values the matrix covers.
    pub fn len(&self) -> usize {
        self.n
    }

    /// True if the matrix covers no values.
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Similarity between values `i` and `j`.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n + j]
    }

    /// Set the similarity of an off-diagonal pair, mirrored to `(j, i)`.
    ///
    /// The score is clamped to `[0, 1]`; NaN becomes `0.0`. Diagonal writes
    /// are ignored.
    pub fn set(&mut self, i: usize, j: usize, score: f64) {
        if i == j {
            return;
        }
        let score = if score.is_nan() {
            0.0
        } else {
            score.clamp(0.0, 1.0)
        };
        self.data[i * self.n + j] = score;
        self.data[j * self.n + i] = score;
    }

    /// Row `i` as a slice.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n..(i + 1) * self.n]
    }

    /// Off-diagonal similarities in row-major `(i, j), i < j` order.
    pub fn upper_triangle(&self) -> Vec<f64> {
        let mut upper = Vec::with_capacity(self.n * self.n.saturating_sub(1) / 2);
        for i in 0..self.n {
            for j in (i + 1)..self.n {
                upper.push(self.get(i, j));
            }
        }
        upper
    }

    /// Spread of the off-diagonal similarities, `None` below two values.
    pub fn stats(&self) -> Option<SimilarityStats> {
        let mut upper = self.upper_triangle();
        if upper.is_empty() {
            return None;
        }
        upper.sort_by(f64::total_cmp);
        let mid = upper.len() / 2;
        let median = if upper.len() % 2 == 0 {
            (upper[mid - 1] + upper[mid]) / 2.0
        } else {
            upper[mid]
        };
        Some(SimilarityStats {
            min: upper[0],
            max: upper[upper.len() - 1],
            median,
        })
    }
}

/// Minimum, maximum and median of the off-diagonal similarities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityStats {
    pub min: f64,
    pub max: f64,
    pub median: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let m = SimilarityMatrix::identity(3);
        assert_eq!(m.get(1, 1), 1.0);
        assert_eq!(m.get(0, 2), 0.0);
    }

    #[test]
    fn test_set_clamps_and_mirrors() {
        let mut m = SimilarityMatrix::identity(2);
        m.set(0, 1, 1.0000001);
        assert_eq!(m.get(1, 0), 1.0);
        m.set(1, 0, -0.2);
        assert_eq!(m.get(0, 1), 0.0);
        m.set(1, 1, 0.3);
        assert_eq!(m.get(1, 1), 1.0);
    }

    #[test]
    fn test_from_rows_rejects_asymmetric() {
        let rows = vec![vec![1.0, 0.4], vec![0.5, 1.0]];
        assert!(matches!(
            SimilarityMatrix::from_rows(rows),
            Err(CanonizeError::Validation(_))
        ));
    }

    #[test]
    fn test_from_rows_forces_diagonal() {
        let rows = vec![vec![0.7, 0.4], vec![0.4, 0.2]];
        let m = SimilarityMatrix::from_rows(rows).unwrap();
        assert_eq!(m.get(0, 0), 1.0);
        assert_eq!(m.get(1, 1), 1.0);
        assert_eq!(m.get(0, 1), 0.4);
    }

    #[test]
    fn test_upper_triangle_order() {
        let m = SimilarityMatrix::from_pairs(3, |i, j| (i + j) as f64 / 10.0);
        // (0,1), (0,2), (1,2)
        assert_eq!(m.upper_triangle(), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_stats_skip_diagonal() {
        let m = SimilarityMatrix::from_pairs(4, |i, j| (i + j) as f64 / 10.0);
        let stats = m.stats().unwrap();
        assert_eq!(stats.min, 0.1);
        assert_eq!(stats.max, 0.5);
        // 0.1 0.2 0.3 0.3 0.4 0.5
        assert!((stats.median - 0.3).abs() < 1e-12);
        assert!(SimilarityMatrix::identity(1).stats().is_none());
    }
}
