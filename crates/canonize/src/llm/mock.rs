//! Mock provider for testing.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{CanonizeError, Result, ServiceFailure};
use crate::similarity::token_sort_ratio;

use super::provider::{
    ClusterEvaluation, ClusterReview, EmbeddingProvider, LlmConfig, PairScore, ReasoningMode,
    ReasoningProvider, ScoringRequest, ValuePair,
};

/// Dimension of the mock embedding vectors.
const MOCK_DIMENSIONS: usize = 64;

/// What the mock answers to canonical-selection requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockCanonicalResponse {
    /// Pick the longest candidate (first on ties), like a model preferring
    /// full names over abbreviations.
    Longest,
    /// Always answer this 1-based index, valid or not.
    Index(i64),
    /// Answer with text that contains no index.
    Unparseable,
}

/// Mock provider that returns predictable responses for testing.
///
/// Embeddings are bags of lowercased character bigrams, pair scores are the
/// token-sort ratio, both after resolving registered aliases. Every call is
/// counted so tests can assert how often the "service" was reached.
pub struct MockProvider {
    config: LlmConfig,
    aliases: HashMap<String, String>,
    pair_overrides: HashMap<(String, String), f64>,
    canonical_response: MockCanonicalResponse,
    failure: Option<ServiceFailure>,
    score_failure: Option<(usize, ServiceFailure)>,
    drop_scores: bool,
    evaluations: Vec<ClusterEvaluation>,
    embed_calls: AtomicUsize,
    score_calls: AtomicUsize,
    select_calls: AtomicUsize,
    evaluate_calls: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
    reviewed_preferences: Mutex<Vec<f64>>,
}

impl MockProvider {
    /// Create a new mock provider.
    pub fn new() -> Self {
        Self::with_config(LlmConfig {
            model: "mock-reasoner".to_string(),
            embedding_model: "mock-embedder".to_string(),
            ..LlmConfig::default()
        })
    }

    /// Create with custom configuration.
    pub fn with_config(config: LlmConfig) -> Self {
        Self {
            config,
            aliases: HashMap::new(),
            pair_overrides: HashMap::new(),
            canonical_response: MockCanonicalResponse::Longest,
            failure: None,
            score_failure: None,
            drop_scores: false,
            evaluations: Vec::new(),
            embed_calls: AtomicUsize::new(0),
            score_calls: AtomicUsize::new(0),
            select_calls: AtomicUsize::new(0),
            evaluate_calls: AtomicUsize::new(0),
            batch_sizes: Mutex::new(Vec::new()),
            reviewed_preferences: Mutex::new(Vec::new()),
        }
    }

    /// Treat `alias` as the same entity as `target` (e.g. "NYC" → "New York").
    pub fn with_alias(mut self, alias: impl Into<String>, target: impl Into<String>) -> Self {
        self.aliases.insert(alias.into(), target.into());
        self
    }

    /// Force the score of one pair, regardless of order.
    pub fn with_pair_score(
        mut self,
        a: impl Into<String>,
        b: impl Into<String>,
        score: f64,
    ) -> Self {
        let (a, b) = (a.into(), b.into());
        self.pair_overrides.insert((b.clone(), a.clone()), score);
        self.pair_overrides.insert((a, b), score);
        self
    }

    /// Set the canonical-selection behavior.
    pub fn with_canonical_response(mut self, response: MockCanonicalResponse) -> Self {
        self.canonical_response = response;
        self
    }

    /// Make every call fail with the given failure kind.
    pub fn failing(mut self, failure: ServiceFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    /// Fail only the `call`-th `score_pairs` request (1-based), so one batch
    /// among several goes wrong.
    pub fn failing_on_call(mut self, call: usize, failure: ServiceFailure) -> Self {
        self.score_failure = Some((call, failure));
        self
    }

    /// Answer cluster reviews from a script, one entry per call. The last
    /// entry repeats once the script runs out; without a script every review
    /// is accepted.
    pub fn with_evaluations(mut self, evaluations: Vec<ClusterEvaluation>) -> Self {
        self.evaluations = evaluations;
        self
    }

    /// Omit the last score of every batch, simulating an incomplete answer.
    pub fn dropping_scores(mut self) -> Self {
        self.drop_scores = true;
        self
    }

    /// Number of `embed` calls made so far.
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    /// Number of `score_pairs` calls made so far.
    pub fn score_calls(&self) -> usize {
        self.score_calls.load(Ordering::SeqCst)
    }

    /// Number of `select_canonical` calls made so far.
    pub fn select_calls(&self) -> usize {
        self.select_calls.load(Ordering::SeqCst)
    }

    /// Number of `evaluate_clusters` calls made so far.
    pub fn evaluate_calls(&self) -> usize {
        self.evaluate_calls.load(Ordering::SeqCst)
    }

    /// Preferences of every reviewed clustering, in call order.
    pub fn reviewed_preferences(&self) -> Vec<f64> {
        self.reviewed_preferences
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }

    /// Sizes of every scored batch, sorted ascending.
    pub fn batch_sizes(&self) -> Vec<usize> {
        let mut sizes = self
            .batch_sizes
            .lock()
            .map(|sizes| sizes.clone())
            .unwrap_or_default();
        sizes.sort_unstable();
        sizes
    }

    fn check_failure(&self) -> Result<()> {
        match self.failure {
            Some(kind) => Err(CanonizeError::service("mock", kind, "injected failure")),
            None => Ok(()),
        }
    }

    fn resolve<'a>(&'a self, value: &'a str) -> &'a str {
        self.aliases.get(value).map(String::as_str).unwrap_or(value)
    }

    fn score(&self, pair: &ValuePair, mode: ReasoningMode) -> f64 {
        if let Some(&score) = self.pair_overrides.get(&(pair.a.clone(), pair.b.clone())) {
            return score;
        }
        let score = token_sort_ratio(self.resolve(&pair.a), self.resolve(&pair.b)) / 100.0;
        match mode {
            ReasoningMode::Strict => {
                if score >= 0.9 {
                    1.0
                } else {
                    0.0
                }
            }
            ReasoningMode::Graded => score,
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingProvider for MockProvider {
    fn embed(&self, texts: &[String], _model: Option<&str>) -> Result<Vec<Vec<f64>>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(texts.iter().map(|t| bigram_vector(self.resolve(t))).collect())
    }

    fn embedding_model(&self) -> &str {
        &self.config.embedding_model
    }

    fn name(&self) -> &str {
        "mock"
    }
}

impl ReasoningProvider for MockProvider {
    fn score_pairs(
        &self,
        pairs: &[ValuePair],
        request: &ScoringRequest<'_>,
    ) -> Result<Vec<PairScore>> {
        let call = self.score_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut sizes) = self.batch_sizes.lock() {
            sizes.push(pairs.len());
        }
        self.check_failure()?;
        if let Some((_, kind)) = self.score_failure.filter(|(failing, _)| *failing == call) {
            return Err(CanonizeError::service(
                "mock",
                kind,
                format!("injected failure on call {}", call),
            ));
        }

        let mut scores: Vec<PairScore> = pairs
            .iter()
            .map(|pair| PairScore {
                index: pair.index,
                similarity: self.score(pair, request.mode),
            })
            .collect();
        if self.drop_scores {
            scores.pop();
        }
        Ok(scores)
    }

    fn select_canonical(
        &self,
        candidates: &[String],
        _context: &str,
        _model: Option<&str>,
    ) -> Result<i64> {
        self.select_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        match self.canonical_response {
            MockCanonicalResponse::Longest => {
                let mut best = 0;
                for (i, candidate) in candidates.iter().enumerate() {
                    if candidate.chars().count() > candidates[best].chars().count() {
                        best = i;
                    }
                }
                Ok(best as i64 + 1)
            }
            MockCanonicalResponse::Index(index) => Ok(index),
            MockCanonicalResponse::Unparseable => Err(CanonizeError::malformed(
                "mock",
                "No candidate number in response: they all look fine",
            )),
        }
    }

    fn evaluate_clusters(&self, review: &ClusterReview<'_>) -> Result<ClusterEvaluation> {
        let call = self.evaluate_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.reviewed_preferences.lock() {
            seen.push(review.preference);
        }
        self.check_failure()?;

        let scripted = self
            .evaluations
            .get(call)
            .or_else(|| self.evaluations.last())
            .cloned();
        Ok(scripted.unwrap_or_else(|| ClusterEvaluation {
            is_satisfactory: true,
            issues: Vec::new(),
            suggested_preference: review.preference,
            reasoning: "clusters look consistent".to_string(),
        }))
    }

    fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Deterministic bag-of-bigrams vector of the lowercased text.
fn bigram_vector(text: &str) -> Vec<f64> {
    let chars: Vec<char> = format!(" {} ", text.to_lowercase()).chars().collect();
    let mut vector = vec![0.0; MOCK_DIMENSIONS];
    for window in chars.windows(2) {
        // FNV-1a over the two scalar values.
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for c in window {
            hash ^= *c as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        vector[(hash % MOCK_DIMENSIONS as u64) as usize] += 1.0;
    }
    vector
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::SimilarityStats;

    fn request() -> ScoringRequest<'static> {
        ScoringRequest {
            context: "",
            mode: ReasoningMode::Graded,
            model: None,
        }
    }

    #[test]
    fn test_mock_embeddings_are_case_insensitive() {
        let provider = MockProvider::new();
        let vectors = provider
            .embed(&["Boston".to_string(), "BOSTON".to_string()], None)
            .unwrap();
        assert_eq!(vectors[0], vectors[1]);
        assert_eq!(vectors[0].len(), MOCK_DIMENSIONS);
        assert_eq!(provider.embed_calls(), 1);
    }

    #[test]
    fn test_mock_alias_scoring() {
        let provider = MockProvider::new().with_alias("NYC", "New York");
        let pairs = vec![ValuePair {
            index: 0,
            a: "NYC".to_string(),
            b: "new york".to_string(),
        }];
        let scores = provider.score_pairs(&pairs, &request()).unwrap();
        assert_eq!(scores, vec![PairScore { index: 0, similarity: 1.0 }]);
        assert_eq!(provider.batch_sizes(), vec![1]);
    }

    #[test]
    fn test_mock_canonical_longest() {
        let provider = MockProvider::new();
        let candidates = vec!["NY".to_string(), "New York".to_string(), "NYC".to_string()];
        assert_eq!(provider.select_canonical(&candidates, "", None).unwrap(), 2);
    }

    #[test]
    fn test_mock_fails_only_the_chosen_call() {
        let provider = MockProvider::new().failing_on_call(2, ServiceFailure::Timeout);
        let pairs = vec![ValuePair {
            index: 0,
            a: "a".to_string(),
            b: "b".to_string(),
        }];
        assert!(provider.score_pairs(&pairs, &request()).is_ok());
        assert!(provider.score_pairs(&pairs, &request()).is_err());
        assert!(provider.score_pairs(&pairs, &request()).is_ok());
        assert_eq!(provider.score_calls(), 3);
    }

    #[test]
    fn test_mock_evaluation_script_repeats_last() {
        let reject = ClusterEvaluation {
            is_satisfactory: false,
            issues: vec!["too many clusters".to_string()],
            suggested_preference: -0.8,
            reasoning: String::new(),
        };
        let provider = MockProvider::new().with_evaluations(vec![reject.clone()]);
        let clusters = vec![vec!["a".to_string()]];
        let review = ClusterReview {
            clusters: &clusters,
            preference: -0.2,
            stats: SimilarityStats {
                min: 0.0,
                max: 0.0,
                median: 0.0,
            },
            context: "",
            model: None,
        };
        assert_eq!(provider.evaluate_clusters(&review).unwrap(), reject);
        assert_eq!(provider.evaluate_clusters(&review).unwrap(), reject);
        assert_eq!(provider.evaluate_calls(), 2);
        assert_eq!(provider.reviewed_preferences(), vec![-0.2, -0.2]);

        let accepting = MockProvider::new();
        assert!(accepting.evaluate_clusters(&review).unwrap().is_satisfactory);
    }

    #[test]
    fn test_mock_failure_injection() {
        let provider = MockProvider::new().failing(ServiceFailure::Timeout);
        let err = provider.embed(&["a".to_string()], None).unwrap_err();
        assert!(matches!(
            err,
            CanonizeError::Service {
                kind: ServiceFailure::Timeout,
                ..
            }
        ));
    }
}
