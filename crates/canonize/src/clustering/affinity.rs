//! Affinity propagation over a precomputed similarity matrix.
//!
//! Responsibilities `R` and availabilities `A` are exchanged until the set of
//! exemplars (values with `A[k][k] + R[k][k] > 0`) has been stable for
//! `convergence_iter` rounds, or `max_iter` rounds have run. A tiny seeded
//! perturbation of the similarities breaks ties between equally good
//! exemplars, so a fixed seed gives a fixed result.

use crate::similarity::SimilarityMatrix;

use super::{ClusterAssignment, ClusterOutcome, Convergence};

/// Parameters of one affinity propagation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffinityParams {
    pub preference: Option<f64>,
    pub damping: f64,
    pub max_iter: usize,
    pub convergence_iter: usize,
    pub seed: u64,
}

/// Run affinity propagation.
///
/// Outcomes:
/// - converged with exemplars: one cluster per exemplar
/// - not converged but exemplars found: the last exemplars' clusters, marked
///   not converged
/// - no exemplars: one cluster per value, marked degraded
pub fn affinity_propagation(matrix: &SimilarityMatrix, params: &AffinityParams) -> ClusterOutcome {
    let n = matrix.len();
    if n <= 1 {
        return ClusterOutcome::exact(ClusterAssignment::single_cluster(n));
    }

    let preference = params.preference.unwrap_or_else(|| median(matrix));

    if let Some(assignment) = degenerate_assignment(matrix, preference) {
        let exemplars = assignment.cluster_count();
        return ClusterOutcome {
            assignment,
            convergence: Some(Convergence {
                converged: true,
                iterations: 0,
                exemplars,
            }),
        };
    }

    let mut s = Square::from_matrix(matrix);
    for i in 0..n {
        s.set(i, i, preference);
    }
    add_noise(&mut s, params.seed);

    let run = propagate(&s, params);
    let exemplars: Vec<usize> = (0..n).filter(|&k| run.is_exemplar[k]).collect();
    let convergence = Convergence {
        converged: run.converged,
        iterations: run.iterations,
        exemplars: exemplars.len(),
    };

    if exemplars.is_empty() {
        return ClusterOutcome {
            assignment: ClusterAssignment::singletons(n),
            convergence: Some(convergence),
        };
    }

    let labels = assign_to_exemplars(&s, exemplars);
    ClusterOutcome {
        assignment: ClusterAssignment::from_labels(&labels),
        convergence: Some(convergence),
    }
}

/// Dense row-major n×n working matrix.
#[derive(Debug, Clone)]
struct Square {
    n: usize,
    data: Vec<f64>,
}

impl Square {
    fn zeros(n: usize) -> Self {
        Self {
            n,
            data: vec![0.0; n * n],
        }
    }

    fn from_matrix(matrix: &SimilarityMatrix) -> Self {
        let n = matrix.len();
        let mut data = Vec::with_capacity(n * n);
        for i in 0..n {
            data.extend_from_slice(matrix.row(i));
        }
        Self { n, data }
    }

    fn get(&self, i: usize, k: usize) -> f64 {
        self.data[i * self.n + k]
    }

    fn set(&mut self, i: usize, k: usize, value: f64) {
        self.data[i * self.n + k] = value;
    }

    fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n..(i + 1) * self.n]
    }
}

/// Median of every entry, diagonal included.
fn median(matrix: &SimilarityMatrix) -> f64 {
    let n = matrix.len();
    let mut values: Vec<f64> = (0..n).flat_map(|i| matrix.row(i).to_vec()).collect();
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Shortcut for inputs where every off-diagonal similarity is the same.
///
/// Message passing cannot prefer any exemplar there: if the preference
/// exceeds the common similarity every value is its own exemplar, otherwise
/// all values form one cluster.
fn degenerate_assignment(matrix: &SimilarityMatrix, preference: f64) -> Option<ClusterAssignment> {
    let n = matrix.len();
    let first = matrix.get(0, 1);
    let all_equal = (0..n).all(|i| ((i + 1)..n).all(|j| matrix.get(i, j) == first));
    if !all_equal {
        return None;
    }
    if preference > first {
        Some(ClusterAssignment::singletons(n))
    } else {
        Some(ClusterAssignment::single_cluster(n))
    }
}

/// Add `(eps * s + tiny * 100) * N(0, 1)` to every entry.
fn add_noise(s: &mut Square, seed: u64) {
    let mut rng = fastrand::Rng::with_seed(seed);
    let scale_floor = f64::MIN_POSITIVE * 100.0;
    for value in s.data.iter_mut() {
        let noise = standard_normal(&mut rng);
        *value += (f64::EPSILON * *value + scale_floor) * noise;
    }
}

/// Box-Muller transform over two uniform draws.
fn standard_normal(rng: &mut fastrand::Rng) -> f64 {
    // `f64()` is in [0, 1); shift to (0, 1] so the logarithm stays finite.
    let u1 = 1.0 - rng.f64();
    let u2 = rng.f64();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

struct Propagation {
    is_exemplar: Vec<bool>,
    converged: bool,
    iterations: usize,
}

fn propagate(s: &Square, params: &AffinityParams) -> Propagation {
    let n = s.n;
    let damping = params.damping;
    let mut r = Square::zeros(n);
    let mut a = Square::zeros(n);
    let mut tmp = Square::zeros(n);

    // Exemplar flags of the last `convergence_iter` rounds, one ring slot per
    // round.
    let window = params.convergence_iter.max(1);
    let mut history = vec![vec![false; n]; window];
    let mut is_exemplar = vec![false; n];
    let mut iterations = 0;
    let mut converged = false;

    for it in 0..params.max_iter {
        iterations = it + 1;

        // Responsibilities.
        for i in 0..n {
            let (mut best_k, mut best, mut second) = (0, f64::NEG_INFINITY, f64::NEG_INFINITY);
            for k in 0..n {
                let v = a.get(i, k) + s.get(i, k);
                if v > best {
                    second = best;
                    best = v;
                    best_k = k;
                } else if v > second {
                    second = v;
                }
            }
            for k in 0..n {
                let competitor = if k == best_k { second } else { best };
                tmp.set(i, k, s.get(i, k) - competitor);
            }
        }
        for (old, new) in r.data.iter_mut().zip(&tmp.data) {
            *old = damping * *old + (1.0 - damping) * new;
        }

        // Availabilities.
        for k in 0..n {
            let column_sum: f64 = (0..n)
                .map(|i| if i == k { r.get(k, k) } else { r.get(i, k).max(0.0) })
                .sum();
            for i in 0..n {
                let new = if i == k {
                    column_sum - r.get(k, k)
                } else {
                    (column_sum - r.get(i, k).max(0.0)).min(0.0)
                };
                tmp.set(i, k, new);
            }
        }
        for (old, new) in a.data.iter_mut().zip(&tmp.data) {
            *old = damping * *old + (1.0 - damping) * new;
        }

        for k in 0..n {
            is_exemplar[k] = a.get(k, k) + r.get(k, k) > 0.0;
        }
        history[it % window].clone_from(&is_exemplar);

        if it >= window {
            let stable = (0..n).all(|k| {
                let votes = history.iter().filter(|round| round[k]).count();
                votes == 0 || votes == window
            });
            if stable && is_exemplar.iter().any(|&e| e) {
                converged = true;
                break;
            }
        }
    }

    Propagation {
        is_exemplar,
        converged,
        iterations,
    }
}

/// Attach every value to its most similar exemplar, then move each exemplar
/// to the member with the highest total similarity to its cluster and
/// attach again. Returns the exemplar index of every value.
fn assign_to_exemplars(s: &Square, mut exemplars: Vec<usize>) -> Vec<usize> {
    let n = s.n;
    let nearest = |exemplars: &[usize]| -> Vec<usize> {
        let mut choice: Vec<usize> = (0..n)
            .map(|i| argmax(exemplars.iter().map(|&k| s.get(i, k))))
            .collect();
        for (c, &k) in exemplars.iter().enumerate() {
            choice[k] = c;
        }
        choice
    };

    let choice = nearest(&exemplars);
    for (c, exemplar) in exemplars.iter_mut().enumerate() {
        let members: Vec<usize> = (0..n).filter(|&i| choice[i] == c).collect();
        let best = argmax(
            members
                .iter()
                .map(|&j| members.iter().map(|&i| s.row(i)[j]).sum::<f64>()),
        );
        *exemplar = members[best];
    }

    let choice = nearest(&exemplars);
    choice.into_iter().map(|c| exemplars[c]).collect()
}

/// Position of the largest value, first on ties.
fn argmax(values: impl Iterator<Item = f64>) -> usize {
    let mut best = (0, f64::NEG_INFINITY);
    for (i, v) in values.enumerate() {
        if v > best.1 {
            best = (i, v);
        }
    }
    best.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(preference: Option<f64>) -> AffinityParams {
        AffinityParams {
            preference,
            damping: 0.9,
            max_iter: 500,
            convergence_iter: 15,
            seed: 42,
        }
    }

    fn two_groups() -> SimilarityMatrix {
        SimilarityMatrix::from_rows(vec![
            vec![1.0, 0.9, 0.9, 0.1, 0.1],
            vec![0.9, 1.0, 0.9, 0.1, 0.1],
            vec![0.9, 0.9, 1.0, 0.1, 0.1],
            vec![0.1, 0.1, 0.1, 1.0, 0.9],
            vec![0.1, 0.1, 0.1, 0.9, 1.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_separated_groups_converge() {
        let outcome = affinity_propagation(&two_groups(), &params(Some(0.5)));
        assert_eq!(outcome.assignment.labels(), &[0, 0, 0, 1, 1]);
        let convergence = outcome.convergence.unwrap();
        assert!(convergence.converged);
        assert_eq!(convergence.exemplars, 2);
        assert!(!outcome.is_degraded());
    }

    #[test]
    fn test_fixed_seed_is_deterministic() {
        let first = affinity_propagation(&two_groups(), &params(None));
        let second = affinity_propagation(&two_groups(), &params(None));
        assert_eq!(first, second);
    }

    #[test]
    fn test_iteration_cap_reports_non_convergence() {
        let capped = AffinityParams {
            max_iter: 1,
            convergence_iter: 1,
            ..params(Some(0.5))
        };
        let outcome = affinity_propagation(&two_groups(), &capped);
        let convergence = outcome.convergence.unwrap();
        assert!(!convergence.converged);
        assert_eq!(convergence.iterations, 1);
        assert!(outcome.is_degraded());
        assert_eq!(outcome.assignment.len(), 5);
    }

    #[test]
    fn test_equal_similarities_shortcut() {
        let m = SimilarityMatrix::from_pairs(4, |_, _| 0.5);
        let together = affinity_propagation(&m, &params(None));
        assert_eq!(together.assignment.cluster_count(), 1);

        let apart = affinity_propagation(&m, &params(Some(0.9)));
        assert_eq!(apart.assignment.cluster_count(), 4);
    }

    #[test]
    fn test_median_includes_diagonal() {
        let m = SimilarityMatrix::from_rows(vec![vec![1.0, 0.2], vec![0.2, 1.0]]).unwrap();
        assert!((median(&m) - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_standard_normal_is_finite() {
        let mut rng = fastrand::Rng::with_seed(7);
        for _ in 0..1000 {
            assert!(standard_normal(&mut rng).is_finite());
        }
    }
}
