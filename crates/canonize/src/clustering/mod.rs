//! Turning a similarity matrix into one cluster label per value.
//!
//! Strategies:
//!
//! - [`ClusteringMethod::Hierarchical`] - average linkage (UPGMA), merging while
//!   the mean similarity is at least `similarity_threshold`
//! - [`ClusteringMethod::ConnectedComponents`] - components of the graph with
//!   an edge wherever similarity reaches the threshold; chains transitively
//! - [`ClusteringMethod::AffinityPropagation`] - exemplar-based message
//!   passing with a seeded tie-breaker and an iteration cap, optionally with
//!   a preference search reviewed by a reasoning provider

mod affinity;
mod components;
mod hierarchical;
mod search;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{CanonizeError, Result};
use crate::similarity::SimilarityMatrix;

pub use affinity::{AffinityParams, affinity_propagation};
pub use components::connected_components;
pub use hierarchical::average_linkage;
pub use search::{SearchRound, search_preference};

/// Default similarity threshold for hierarchical clustering.
pub const DEFAULT_HIERARCHICAL_THRESHOLD: f64 = 0.82;

/// Default similarity threshold for connected components.
pub const DEFAULT_COMPONENTS_THRESHOLD: f64 = 0.88;

/// Default affinity propagation parameters.
pub const DEFAULT_DAMPING: f64 = 0.9;
pub const DEFAULT_MAX_ITER: usize = 500;
pub const DEFAULT_CONVERGENCE_ITER: usize = 15;
pub const DEFAULT_SEED: u64 = 42;

/// Default number of reviewed rounds in a preference search.
pub const DEFAULT_SEARCH_ROUNDS: usize = 5;

fn default_hierarchical_threshold() -> f64 {
    DEFAULT_HIERARCHICAL_THRESHOLD
}

fn default_components_threshold() -> f64 {
    DEFAULT_COMPONENTS_THRESHOLD
}

fn default_damping() -> f64 {
    DEFAULT_DAMPING
}

fn default_max_iter() -> usize {
    DEFAULT_MAX_ITER
}

fn default_convergence_iter() -> usize {
    DEFAULT_CONVERGENCE_ITER
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn default_search_rounds() -> usize {
    DEFAULT_SEARCH_ROUNDS
}

/// Let a reasoning provider review affinity propagation results and steer
/// the preference between rounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceSearch {
    #[serde(default = "default_search_rounds")]
    pub max_rounds: usize,
    /// Model override for the reviews.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Default for PreferenceSearch {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_SEARCH_ROUNDS,
            model: None,
        }
    }
}

/// How values are grouped from their similarity matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ClusteringMethod {
    /// Average-linkage agglomerative clustering.
    Hierarchical {
        #[serde(default = "default_hierarchical_threshold")]
        similarity_threshold: f64,
    },

    /// Threshold graph connected components.
    ConnectedComponents {
        #[serde(default = "default_components_threshold")]
        similarity_threshold: f64,
    },

    /// Affinity propagation.
    AffinityPropagation {
        /// Self-similarity of every value. `None` uses the median of the
        /// similarity matrix. Lower values give fewer clusters.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preference: Option<f64>,
        #[serde(default = "default_damping")]
        damping: f64,
        #[serde(default = "default_max_iter")]
        max_iter: usize,
        #[serde(default = "default_convergence_iter")]
        convergence_iter: usize,
        #[serde(default = "default_seed")]
        seed: u64,
        /// Review rounds that adjust the preference; off when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preference_search: Option<PreferenceSearch>,
    },
}

impl Default for ClusteringMethod {
    fn default() -> Self {
        ClusteringMethod::Hierarchical {
            similarity_threshold: DEFAULT_HIERARCHICAL_THRESHOLD,
        }
    }
}

impl ClusteringMethod {
    /// Affinity propagation with default parameters.
    pub fn affinity_propagation() -> Self {
        ClusteringMethod::AffinityPropagation {
            preference: None,
            damping: DEFAULT_DAMPING,
            max_iter: DEFAULT_MAX_ITER,
            convergence_iter: DEFAULT_CONVERGENCE_ITER,
            seed: DEFAULT_SEED,
            preference_search: None,
        }
    }

    /// Affinity propagation with default parameters and a reviewed
    /// preference search.
    pub fn affinity_search(search: PreferenceSearch) -> Self {
        ClusteringMethod::AffinityPropagation {
            preference: None,
            damping: DEFAULT_DAMPING,
            max_iter: DEFAULT_MAX_ITER,
            convergence_iter: DEFAULT_CONVERGENCE_ITER,
            seed: DEFAULT_SEED,
            preference_search: Some(search),
        }
    }

    /// Preference search settings, for affinity propagation with a search.
    pub fn preference_search(&self) -> Option<&PreferenceSearch> {
        match self {
            ClusteringMethod::AffinityPropagation {
                preference_search, ..
            } => preference_search.as_ref(),
            _ => None,
        }
    }

    /// Parameters of a single affinity propagation run, for that method.
    pub fn affinity_params(&self) -> Option<AffinityParams> {
        match self {
            ClusteringMethod::AffinityPropagation {
                preference,
                damping,
                max_iter,
                convergence_iter,
                seed,
                ..
            } => Some(AffinityParams {
                preference: *preference,
                damping: *damping,
                max_iter: *max_iter,
                convergence_iter: *convergence_iter,
                seed: *seed,
            }),
            _ => None,
        }
    }

    /// Method name, as used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            ClusteringMethod::Hierarchical { .. } => "hierarchical",
            ClusteringMethod::ConnectedComponents { .. } => "connected_components",
            ClusteringMethod::AffinityPropagation { .. } => "affinity_propagation",
        }
    }

    /// Similarity threshold, for the threshold-based methods.
    pub fn threshold(&self) -> Option<f64> {
        match self {
            ClusteringMethod::Hierarchical {
                similarity_threshold,
            }
            | ClusteringMethod::ConnectedComponents {
                similarity_threshold,
            } => Some(*similarity_threshold),
            ClusteringMethod::AffinityPropagation { .. } => None,
        }
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        match self {
            ClusteringMethod::Hierarchical {
                similarity_threshold,
            }
            | ClusteringMethod::ConnectedComponents {
                similarity_threshold,
            } => {
                if !(0.0..=1.0).contains(similarity_threshold) {
                    return Err(CanonizeError::Configuration(format!(
                        "similarity_threshold must be in [0, 1], got {}",
                        similarity_threshold
                    )));
                }
            }
            ClusteringMethod::AffinityPropagation {
                preference,
                damping,
                max_iter,
                convergence_iter,
                preference_search,
                ..
            } => {
                if !(0.5..1.0).contains(damping) {
                    return Err(CanonizeError::Configuration(format!(
                        "damping must be in [0.5, 1), got {}",
                        damping
                    )));
                }
                if *max_iter == 0 || *convergence_iter == 0 {
                    return Err(CanonizeError::Configuration(
                        "max_iter and convergence_iter must be at least 1".to_string(),
                    ));
                }
                if let Some(p) = preference.filter(|p| !p.is_finite()) {
                    return Err(CanonizeError::Configuration(format!(
                        "preference must be finite, got {}",
                        p
                    )));
                }
                if preference_search.as_ref().is_some_and(|s| s.max_rounds == 0) {
                    return Err(CanonizeError::Configuration(
                        "preference_search.max_rounds must be at least 1".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

impl FromStr for ClusteringMethod {
    type Err = CanonizeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "hierarchical" | "upgma" | "average" => Ok(ClusteringMethod::default()),
            "connected_components" | "connected-components" | "cc" | "components" => {
                Ok(ClusteringMethod::ConnectedComponents {
                    similarity_threshold: DEFAULT_COMPONENTS_THRESHOLD,
                })
            }
            "affinity_propagation" | "affinity-propagation" | "ap" | "affinity" => {
                Ok(ClusteringMethod::affinity_propagation())
            }
            _ => Err(CanonizeError::Configuration(format!(
                "Unknown clustering method: {}. Use: hierarchical, connected_components, or affinity_propagation.",
                s
            ))),
        }
    }
}

impl fmt::Display for ClusteringMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One cluster label per value, numbered densely `0..k-1` in order of first
/// appearance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    labels: Vec<usize>,
}

impl ClusterAssignment {
    /// Renumber arbitrary labels densely by first appearance.
    pub fn from_labels(raw: &[usize]) -> Self {
        let mut seen: HashMap<usize, usize> = HashMap::new();
        let labels = raw
            .iter()
            .map(|&label| {
                let next = seen.len();
                *seen.entry(label).or_insert(next)
            })
            .collect();
        Self { labels }
    }

    /// Every value in its own cluster.
    pub fn singletons(n: usize) -> Self {
        Self {
            labels: (0..n).collect(),
        }
    }

    /// All values in one cluster.
    pub fn single_cluster(n: usize) -> Self {
        Self { labels: vec![0; n] }
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of distinct clusters.
    pub fn cluster_count(&self) -> usize {
        self.labels.iter().max().map_or(0, |max| max + 1)
    }

    /// Value indices per cluster, clusters in label order, members in value
    /// order.
    pub fn clusters(&self) -> Vec<Vec<usize>> {
        let mut clusters = vec![Vec::new(); self.cluster_count()];
        for (value, &label) in self.labels.iter().enumerate() {
            clusters[label].push(value);
        }
        clusters
    }
}

/// Convergence record of an affinity propagation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Convergence {
    /// True if the exemplar set was stable for `convergence_iter` rounds.
    pub converged: bool,
    /// Message-passing rounds run.
    pub iterations: usize,
    /// Exemplars found in the final round.
    pub exemplars: usize,
}

/// Result of clustering.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterOutcome {
    pub assignment: ClusterAssignment,
    /// Present for affinity propagation only.
    pub convergence: Option<Convergence>,
}

impl ClusterOutcome {
    /// Outcome without a convergence record.
    pub fn exact(assignment: ClusterAssignment) -> Self {
        Self {
            assignment,
            convergence: None,
        }
    }

    /// True if the labels came from a run that did not converge or found no
    /// exemplars.
    pub fn is_degraded(&self) -> bool {
        self.convergence
            .is_some_and(|c| !c.converged || c.exemplars == 0)
    }
}

/// Cluster the values covered by `matrix`.
pub fn cluster(matrix: &SimilarityMatrix, method: &ClusteringMethod) -> Result<ClusterOutcome> {
    method.validate()?;
    let n = matrix.len();
    if n <= 1 {
        return Ok(ClusterOutcome::exact(ClusterAssignment::single_cluster(n)));
    }

    let outcome = match method {
        ClusteringMethod::Hierarchical {
            similarity_threshold,
        } => ClusterOutcome::exact(average_linkage(matrix, *similarity_threshold)),
        ClusteringMethod::ConnectedComponents {
            similarity_threshold,
        } => ClusterOutcome::exact(connected_components(matrix, *similarity_threshold)),
        ClusteringMethod::AffinityPropagation {
            preference,
            damping,
            max_iter,
            convergence_iter,
            seed,
            ..
        } => affinity_propagation(
            matrix,
            &AffinityParams {
                preference: *preference,
                damping: *damping,
                max_iter: *max_iter,
                convergence_iter: *convergence_iter,
                seed: *seed,
            },
        ),
    };
    log_outcome(method, n, &outcome);
    Ok(outcome)
}

fn log_outcome(method: &ClusteringMethod, n: usize, outcome: &ClusterOutcome) {
    debug!(
        "{} clustering: {} values -> {} clusters",
        method,
        n,
        outcome.assignment.cluster_count()
    );
    if let Some(c) = outcome.convergence.filter(|_| outcome.is_degraded()) {
        warn!(
            "Affinity propagation degraded: converged={}, iterations={}, exemplars={}",
            c.converged, c.iterations, c.exemplars
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renumber_by_first_appearance() {
        let a = ClusterAssignment::from_labels(&[7, 3, 7, 9, 3]);
        assert_eq!(a.labels(), &[0, 1, 0, 2, 1]);
        assert_eq!(a.cluster_count(), 3);
        assert_eq!(a.clusters(), vec![vec![0, 2], vec![1, 4], vec![3]]);
    }

    #[test]
    fn test_empty_assignment() {
        let a = ClusterAssignment::single_cluster(0);
        assert!(a.is_empty());
        assert_eq!(a.cluster_count(), 0);
        assert!(a.clusters().is_empty());
    }

    #[test]
    fn test_threshold_out_of_range() {
        let m = SimilarityMatrix::identity(3);
        let method = ClusteringMethod::ConnectedComponents {
            similarity_threshold: 1.2,
        };
        assert!(matches!(
            cluster(&m, &method),
            Err(CanonizeError::Configuration(_))
        ));
    }

    #[test]
    fn test_damping_out_of_range() {
        let m = SimilarityMatrix::identity(3);
        let method = ClusteringMethod::AffinityPropagation {
            preference: None,
            damping: 0.3,
            max_iter: 200,
            convergence_iter: 15,
            seed: 42,
            preference_search: None,
        };
        assert!(matches!(
            cluster(&m, &method),
            Err(CanonizeError::Configuration(_))
        ));
    }

    #[test]
    fn test_single_value_is_trivial() {
        let m = SimilarityMatrix::identity(1);
        for method in [
            ClusteringMethod::default(),
            ClusteringMethod::affinity_propagation(),
        ] {
            let outcome = cluster(&m, &method).unwrap();
            assert_eq!(outcome.assignment.labels(), &[0]);
            assert!(!outcome.is_degraded());
        }
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!(
            "cc".parse::<ClusteringMethod>().unwrap().name(),
            "connected_components"
        );
        assert_eq!(
            "AP".parse::<ClusteringMethod>().unwrap(),
            ClusteringMethod::affinity_propagation()
        );
        assert!("kmeans".parse::<ClusteringMethod>().is_err());
    }

    #[test]
    fn test_method_serde_defaults() {
        let method: ClusteringMethod =
            serde_json::from_str(r#"{"method": "affinity_propagation", "damping": 0.7}"#)
                .unwrap();
        assert_eq!(
            method,
            ClusteringMethod::AffinityPropagation {
                preference: None,
                damping: 0.7,
                max_iter: DEFAULT_MAX_ITER,
                convergence_iter: DEFAULT_CONVERGENCE_ITER,
                seed: DEFAULT_SEED,
                preference_search: None,
            }
        );
    }

    #[test]
    fn test_preference_search_config() {
        let method: ClusteringMethod = serde_json::from_str(
            r#"{"method": "affinity_propagation", "preference_search": {}}"#,
        )
        .unwrap();
        assert_eq!(
            method.preference_search(),
            Some(&PreferenceSearch::default())
        );
        assert_eq!(method.preference_search().unwrap().max_rounds, DEFAULT_SEARCH_ROUNDS);
        assert!(ClusteringMethod::affinity_propagation().preference_search().is_none());

        let zero = ClusteringMethod::affinity_search(PreferenceSearch {
            max_rounds: 0,
            model: None,
        });
        assert!(matches!(zero.validate(), Err(CanonizeError::Configuration(_))));
    }
}
