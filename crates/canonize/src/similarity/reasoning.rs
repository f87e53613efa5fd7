//! Reasoning-based similarity: batched pair scoring by a language model.

use log::debug;
use rayon::prelude::*;

use crate::error::{CanonizeError, Result};
use crate::llm::{ReasoningProvider, ScoringRequest, ValuePair};

use super::SimilarityMatrix;

/// Number of pairs sent per request for `n` unique values.
///
/// Small inputs use small batches so a single bad answer costs little; large
/// inputs use bigger ones to bound the request count.
pub fn batch_size(n: usize) -> usize {
    match n {
        0..=10 => 15,
        11..=30 => 20,
        31..=75 => 30,
        76..=100 => 40,
        _ => 50,
    }
}

/// All unordered index pairs `(i, j)`, `i < j`, in lexicographic order.
fn value_pairs(n: usize) -> Vec<(usize, usize)> {
    let mut pairs = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            pairs.push((i, j));
        }
    }
    pairs
}

/// Score every pair of `values` with the reasoning provider.
///
/// Batches run on a dedicated pool of at most `max_concurrent_batches`
/// threads. The matrix is only assembled once every batch has returned a
/// complete, valid answer; the first failure is returned instead.
pub fn reasoning_similarity(
    values: &[String],
    provider: &dyn ReasoningProvider,
    request: &ScoringRequest<'_>,
    max_concurrent_batches: usize,
) -> Result<SimilarityMatrix> {
    let n = values.len();
    let pairs = value_pairs(n);
    if pairs.is_empty() {
        return Ok(SimilarityMatrix::identity(n));
    }

    let size = batch_size(n);
    let batches: Vec<&[(usize, usize)]> = pairs.chunks(size).collect();
    debug!(
        "Scoring {} pairs in {} batches of up to {} with {} ({} concurrent)",
        pairs.len(),
        batches.len(),
        size,
        provider.name(),
        max_concurrent_batches
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(max_concurrent_batches.max(1))
        .build()
        .map_err(|e| {
            CanonizeError::Configuration(format!("Failed to build batch thread pool: {}", e))
        })?;

    let scored: Vec<Vec<f64>> = pool.install(|| {
        batches
            .par_iter()
            .enumerate()
            .map(|(batch, chunk)| score_batch(batch, chunk, values, provider, request))
            .collect::<Result<Vec<_>>>()
    })?;

    let mut matrix = SimilarityMatrix::identity(n);
    for (chunk, scores) in batches.iter().zip(scored) {
        for (&(i, j), score) in chunk.iter().zip(scores) {
            matrix.set(i, j, score);
        }
    }
    Ok(matrix)
}

/// Send one batch and return its scores in batch order.
fn score_batch(
    batch: usize,
    chunk: &[(usize, usize)],
    values: &[String],
    provider: &dyn ReasoningProvider,
    request: &ScoringRequest<'_>,
) -> Result<Vec<f64>> {
    let items: Vec<ValuePair> = chunk
        .iter()
        .enumerate()
        .map(|(index, &(i, j))| ValuePair {
            index,
            a: values[i].clone(),
            b: values[j].clone(),
        })
        .collect();

    debug!("Dispatching batch {} ({} pairs)", batch, items.len());
    let answer = provider.score_pairs(&items, request)?;

    let malformed = |message: String| {
        CanonizeError::malformed(provider.name(), format!("Batch {}: {}", batch, message))
    };

    let mut scores: Vec<Option<f64>> = vec![None; items.len()];
    for item in answer {
        let slot = scores
            .get_mut(item.index)
            .ok_or_else(|| malformed(format!("unknown pair index {}", item.index)))?;
        if slot.is_some() {
            return Err(malformed(format!("pair {} scored twice", item.index)));
        }
        if !(0.0..=1.0).contains(&item.similarity) {
            return Err(malformed(format!(
                "score {} for pair {} is outside [0, 1]",
                item.similarity, item.index
            )));
        }
        *slot = Some(item.similarity);
    }

    scores
        .into_iter()
        .enumerate()
        .map(|(index, score)| score.ok_or_else(|| malformed(format!("pair {} not scored", index))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceFailure;
    use crate::llm::{
        ClusterEvaluation, ClusterReview, LlmConfig, MockProvider, PairScore, ReasoningMode,
    };

    fn request() -> ScoringRequest<'static> {
        ScoringRequest {
            context: "city names",
            mode: ReasoningMode::Graded,
            model: None,
        }
    }

    /// Provider that answers every batch with a fixed list.
    struct FixedAnswer {
        answer: Vec<PairScore>,
        config: LlmConfig,
    }

    impl FixedAnswer {
        fn new(answer: Vec<PairScore>) -> Self {
            Self {
                answer,
                config: LlmConfig::default(),
            }
        }
    }

    impl ReasoningProvider for FixedAnswer {
        fn score_pairs(&self, _: &[ValuePair], _: &ScoringRequest<'_>) -> Result<Vec<PairScore>> {
            Ok(self.answer.clone())
        }

        fn select_canonical(&self, _: &[String], _: &str, _: Option<&str>) -> Result<i64> {
            Ok(1)
        }

        fn evaluate_clusters(&self, review: &ClusterReview<'_>) -> Result<ClusterEvaluation> {
            Ok(ClusterEvaluation {
                is_satisfactory: true,
                issues: Vec::new(),
                suggested_preference: review.preference,
                reasoning: String::new(),
            })
        }

        fn config(&self) -> &LlmConfig {
            &self.config
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_batch_size_tiers() {
        assert_eq!(batch_size(2), 15);
        assert_eq!(batch_size(10), 15);
        assert_eq!(batch_size(11), 20);
        assert_eq!(batch_size(30), 20);
        assert_eq!(batch_size(75), 30);
        assert_eq!(batch_size(100), 40);
        assert_eq!(batch_size(101), 50);
    }

    #[test]
    fn test_pairs_are_lexicographic() {
        assert_eq!(value_pairs(3), vec![(0, 1), (0, 2), (1, 2)]);
        assert!(value_pairs(1).is_empty());
    }

    #[test]
    fn test_batches_cover_every_pair() {
        let values: Vec<String> = (0..12).map(|i| format!("value {}", i)).collect();
        let provider = MockProvider::new();
        let m = reasoning_similarity(&values, &provider, &request(), 3).unwrap();

        // 66 pairs in batches of 20
        assert_eq!(provider.batch_sizes(), vec![6, 20, 20, 20]);
        assert_eq!(m.len(), 12);
        assert_eq!(m.get(3, 7), m.get(7, 3));
    }

    #[test]
    fn test_one_failed_batch_fails_the_matrix() {
        let values: Vec<String> = (0..12).map(|i| format!("value {}", i)).collect();
        let provider = MockProvider::new().failing_on_call(2, ServiceFailure::RateLimited);
        let err = reasoning_similarity(&values, &provider, &request(), 2).unwrap_err();
        assert!(matches!(
            err,
            CanonizeError::Service {
                kind: ServiceFailure::RateLimited,
                ..
            }
        ));
        assert!(provider.score_calls() >= 2);
    }

    #[test]
    fn test_alias_scores_scatter() {
        let values = strings(&["New York", "NYC", "Boston"]);
        let provider = MockProvider::new().with_alias("NYC", "New York");
        let m = reasoning_similarity(&values, &provider, &request(), 4).unwrap();
        assert_eq!(m.get(0, 1), 1.0);
        assert!(m.get(0, 2) < 0.5);
    }

    #[test]
    fn test_missing_score_is_service_error() {
        let values = strings(&["a", "b", "c"]);
        let provider = MockProvider::new().dropping_scores();
        let err = reasoning_similarity(&values, &provider, &request(), 1).unwrap_err();
        assert!(err.is_malformed_response());
    }

    #[test]
    fn test_duplicate_index_is_service_error() {
        let values = strings(&["a", "b"]);
        let provider = FixedAnswer::new(vec![
            PairScore { index: 0, similarity: 0.2 },
            PairScore { index: 0, similarity: 0.3 },
        ]);
        let err = reasoning_similarity(&values, &provider, &request(), 1).unwrap_err();
        assert!(err.is_malformed_response());
    }

    #[test]
    fn test_out_of_range_score_is_service_error() {
        let values = strings(&["a", "b"]);
        let provider = FixedAnswer::new(vec![PairScore { index: 0, similarity: 1.5 }]);
        let err = reasoning_similarity(&values, &provider, &request(), 1).unwrap_err();
        assert!(err.is_malformed_response());
    }

    #[test]
    fn test_unknown_index_is_service_error() {
        let values = strings(&["a", "b"]);
        let provider = FixedAnswer::new(vec![
            PairScore { index: 0, similarity: 0.5 },
            PairScore { index: 7, similarity: 0.5 },
        ]);
        let err = reasoning_similarity(&values, &provider, &request(), 1).unwrap_err();
        assert!(err.is_malformed_response());
    }
}
