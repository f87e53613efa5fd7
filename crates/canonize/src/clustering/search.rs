//! Affinity propagation with a preference steered by a reasoning provider.
//!
//! Each round clusters at the current preference and sends the clusters for
//! review. An accepted round ends the search; otherwise the suggested
//! preference is clamped into `[-0.99, -0.01]` and tried next. When no round
//! is accepted, the round with the most clusters short of all singletons wins,
//! provided it found more than one cluster; failing that, the last round
//! stands.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{CanonizeError, Result};
use crate::llm::{ClusterReview, ReasoningProvider};
use crate::similarity::SimilarityMatrix;

use super::{
    AffinityParams, ClusterAssignment, ClusterOutcome, PreferenceSearch, affinity_propagation,
};

/// Bounds for the starting preference derived from the similarities.
const START_BOUNDS: (f64, f64) = (-0.95, -0.05);

/// Bounds for preferences suggested by the reviewer.
const SUGGESTION_BOUNDS: (f64, f64) = (-0.99, -0.01);

/// Record of one reviewed round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRound {
    /// Round number, starting at 1.
    pub round: usize,
    pub preference: f64,
    pub clusters: usize,
    pub satisfactory: bool,
    pub suggested_preference: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
}

/// Run the reviewed preference search over `values`, whose similarities are
/// `matrix`.
///
/// An explicit `params.preference` is the first preference tried; without
/// one the search starts at the median similarity minus 0.3. Review failures
/// abort the search.
pub fn search_preference(
    matrix: &SimilarityMatrix,
    values: &[String],
    params: &AffinityParams,
    search: &PreferenceSearch,
    reviewer: &dyn ReasoningProvider,
    context: &str,
) -> Result<(ClusterOutcome, Vec<SearchRound>)> {
    let n = matrix.len();
    let Some(stats) = matrix.stats() else {
        return Ok((
            ClusterOutcome::exact(ClusterAssignment::single_cluster(n)),
            Vec::new(),
        ));
    };

    let mut preference = params
        .preference
        .unwrap_or_else(|| (stats.median - 0.3).clamp(START_BOUNDS.0, START_BOUNDS.1));
    let mut rounds = Vec::with_capacity(search.max_rounds);
    let mut best: Option<(usize, ClusterOutcome)> = None;
    let mut last = None;

    for round in 1..=search.max_rounds {
        let outcome = affinity_propagation(
            matrix,
            &AffinityParams {
                preference: Some(preference),
                ..*params
            },
        );
        let k = outcome.assignment.cluster_count();
        if k < n && best.as_ref().is_none_or(|(best_k, _)| k > *best_k) {
            best = Some((k, outcome.clone()));
        }

        let clusters: Vec<Vec<String>> = outcome
            .assignment
            .clusters()
            .into_iter()
            .map(|members| members.into_iter().map(|i| values[i].clone()).collect())
            .collect();
        let evaluation = reviewer.evaluate_clusters(&ClusterReview {
            clusters: &clusters,
            preference,
            stats,
            context,
            model: search.model.as_deref(),
        })?;
        debug!(
            "Preference search round {}: preference {:.3} -> {} clusters, satisfactory={}",
            round, preference, k, evaluation.is_satisfactory
        );

        let satisfactory = evaluation.is_satisfactory;
        let suggested = evaluation.suggested_preference;
        rounds.push(SearchRound {
            round,
            preference,
            clusters: k,
            satisfactory,
            suggested_preference: suggested,
            issues: evaluation.issues,
            reasoning: evaluation.reasoning,
        });

        if satisfactory {
            info!("Preference {:.3} accepted after {} rounds", preference, round);
            return Ok((outcome, rounds));
        }
        preference = suggested.clamp(SUGGESTION_BOUNDS.0, SUGGESTION_BOUNDS.1);
        last = Some(outcome);
    }

    let chosen = match (best, last) {
        (Some((k, outcome)), _) if k > 1 => outcome,
        (_, Some(outcome)) => outcome,
        _ => {
            return Err(CanonizeError::Configuration(
                "preference_search.max_rounds must be at least 1".to_string(),
            ));
        }
    };
    info!(
        "No preference accepted in {} rounds; keeping {} clusters",
        rounds.len(),
        chosen.assignment.cluster_count()
    );
    Ok((chosen, rounds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceFailure;
    use crate::llm::{ClusterEvaluation, MockProvider};

    fn params() -> AffinityParams {
        AffinityParams {
            preference: None,
            damping: 0.9,
            max_iter: 500,
            convergence_iter: 15,
            seed: 42,
        }
    }

    fn two_groups() -> (SimilarityMatrix, Vec<String>) {
        let m = SimilarityMatrix::from_rows(vec![
            vec![1.0, 0.9, 0.9, 0.1, 0.1],
            vec![0.9, 1.0, 0.9, 0.1, 0.1],
            vec![0.9, 0.9, 1.0, 0.1, 0.1],
            vec![0.1, 0.1, 0.1, 1.0, 0.9],
            vec![0.1, 0.1, 0.1, 0.9, 1.0],
        ])
        .unwrap();
        let values = ["NYC", "New York", "new york", "Boston", "boston"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        (m, values)
    }

    fn verdict(satisfactory: bool, suggested: f64) -> ClusterEvaluation {
        ClusterEvaluation {
            is_satisfactory: satisfactory,
            issues: if satisfactory {
                Vec::new()
            } else {
                vec!["groups split".to_string()]
            },
            suggested_preference: suggested,
            reasoning: String::new(),
        }
    }

    #[test]
    fn test_accepted_round_ends_search() {
        let (m, values) = two_groups();
        let reviewer = MockProvider::new();
        let search = PreferenceSearch::default();
        let (outcome, rounds) =
            search_preference(&m, &values, &params(), &search, &reviewer, "cities").unwrap();

        assert_eq!(rounds.len(), 1);
        assert!(rounds[0].satisfactory);
        // Median off-diagonal similarity is 0.1, so the search starts at -0.2.
        assert!((rounds[0].preference + 0.2).abs() < 1e-12);
        assert_eq!(rounds[0].clusters, outcome.assignment.cluster_count());
        assert_eq!(reviewer.evaluate_calls(), 1);
    }

    #[test]
    fn test_suggestions_are_clamped_and_followed() {
        let (m, values) = two_groups();
        let reviewer = MockProvider::new().with_evaluations(vec![
            verdict(false, -5.0),
            verdict(false, 0.4),
            verdict(true, -0.5),
        ]);
        let search = PreferenceSearch::default();
        let (_, rounds) =
            search_preference(&m, &values, &params(), &search, &reviewer, "").unwrap();

        assert_eq!(rounds.len(), 3);
        assert_eq!(reviewer.reviewed_preferences()[1], -0.99);
        assert_eq!(reviewer.reviewed_preferences()[2], -0.01);
        assert!(rounds[2].satisfactory);
        assert_eq!(rounds[0].issues, vec!["groups split".to_string()]);
    }

    #[test]
    fn test_explicit_preference_starts_the_search() {
        let (m, values) = two_groups();
        let reviewer = MockProvider::new();
        let start = AffinityParams {
            preference: Some(-0.4),
            ..params()
        };
        let search = PreferenceSearch::default();
        search_preference(&m, &values, &start, &search, &reviewer, "").unwrap();
        assert_eq!(reviewer.reviewed_preferences(), vec![-0.4]);
    }

    #[test]
    fn test_unaccepted_search_keeps_richest_result() {
        let (m, values) = two_groups();
        let reviewer = MockProvider::new().with_evaluations(vec![verdict(false, -0.3)]);
        let search = PreferenceSearch {
            max_rounds: 3,
            model: None,
        };
        let (outcome, rounds) =
            search_preference(&m, &values, &params(), &search, &reviewer, "").unwrap();

        assert_eq!(rounds.len(), 3);
        assert!(rounds.iter().all(|r| !r.satisfactory));
        let richest = rounds
            .iter()
            .map(|r| r.clusters)
            .filter(|&k| k < values.len())
            .max()
            .unwrap_or(0);
        if richest > 1 {
            assert_eq!(outcome.assignment.cluster_count(), richest);
        } else {
            assert_eq!(outcome.assignment.cluster_count(), rounds[2].clusters);
        }
    }

    #[test]
    fn test_review_failure_aborts() {
        let (m, values) = two_groups();
        let reviewer = MockProvider::new().failing(ServiceFailure::Timeout);
        let search = PreferenceSearch::default();
        let result = search_preference(&m, &values, &params(), &search, &reviewer, "");
        assert!(matches!(result, Err(CanonizeError::Service { .. })));
    }
}
