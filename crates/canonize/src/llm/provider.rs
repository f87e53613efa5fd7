//! Provider traits and shared request/response types.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CanonizeError, Result, ServiceFailure};
use crate::similarity::SimilarityStats;

/// One unordered value pair sent for scoring.
///
/// `index` is the position of the pair inside its batch, not a value index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuePair {
    pub index: usize,
    pub a: String,
    pub b: String,
}

/// Score returned for one pair of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairScore {
    /// Batch-local pair index, as sent in [`ValuePair::index`].
    pub index: usize,
    /// Similarity in `[0, 1]`.
    pub similarity: f64,
}

/// Scoring rubric used for reasoning-based similarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningMode {
    /// Binary scoring: 1.0 when both values denote the same quantity or
    /// entity (unit conversions allowed), otherwise 0.0.
    Strict,
    /// Graded 0-1 rubric from "definitely different" to "definitely same".
    #[default]
    Graded,
}

impl FromStr for ReasoningMode {
    type Err = CanonizeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "strict" | "binary" => Ok(ReasoningMode::Strict),
            "graded" | "fast" | "reliable" => Ok(ReasoningMode::Graded),
            _ => Err(CanonizeError::Configuration(format!(
                "Unknown reasoning mode: {}. Use: strict or graded.",
                s
            ))),
        }
    }
}

impl fmt::Display for ReasoningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReasoningMode::Strict => write!(f, "strict"),
            ReasoningMode::Graded => write!(f, "graded"),
        }
    }
}

/// Everything a provider needs to score one batch of pairs.
#[derive(Debug, Clone, Copy)]
pub struct ScoringRequest<'a> {
    /// Free-text description of the column, e.g. "Country where respondents work".
    pub context: &'a str,
    pub mode: ReasoningMode,
    /// Model override; `None` uses the provider's configured model.
    pub model: Option<&'a str>,
}

/// One affinity propagation result sent back for review.
#[derive(Debug, Clone, Copy)]
pub struct ClusterReview<'a> {
    /// Member values of every cluster, clusters in label order.
    pub clusters: &'a [Vec<String>],
    /// Preference the clusters were produced with.
    pub preference: f64,
    pub stats: SimilarityStats,
    pub context: &'a str,
    /// Model override; `None` uses the provider's configured model.
    pub model: Option<&'a str>,
}

/// Verdict on a [`ClusterReview`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterEvaluation {
    pub is_satisfactory: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    /// Preference to try next. More negative gives fewer clusters.
    pub suggested_preference: f64,
    #[serde(default)]
    pub reasoning: String,
}

/// Configuration for LLM and embedding providers.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Chat model used for pair scoring and canonical selection.
    pub model: String,

    /// Embedding model (ignored by providers without embeddings).
    pub embedding_model: String,

    /// Maximum tokens in a chat response.
    pub max_tokens: usize,

    /// Sampling temperature. Kept at 0.0 so repeated runs agree.
    pub temperature: f64,

    /// Seed passed to providers that support deterministic sampling.
    pub seed: u64,

    /// HTTP timeout per request.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4.1-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            max_tokens: 4096,
            temperature: 0.0,
            seed: 42,
            timeout_secs: 60,
        }
    }
}

/// Turns texts into vectors.
///
/// Implementations must be thread-safe (Send + Sync) so one provider can be
/// shared by every pass of a pipeline.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed every text, returning one vector per input in input order.
    fn embed(&self, texts: &[String], model: Option<&str>) -> Result<Vec<Vec<f64>>>;

    /// Model used when `embed` gets no override.
    fn embedding_model(&self) -> &str;

    /// Get the name of this provider (for logging/debugging).
    fn name(&self) -> &str;
}

/// External reasoning service used for pair scoring and canonical selection.
pub trait ReasoningProvider: Send + Sync {
    /// Score a batch of value pairs.
    ///
    /// Returns `(index, similarity)` items; callers verify that every pair of
    /// the batch was answered.
    fn score_pairs(
        &self,
        pairs: &[ValuePair],
        request: &ScoringRequest<'_>,
    ) -> Result<Vec<PairScore>>;

    /// Pick the best canonical form among `candidates`.
    ///
    /// Returns the 1-based position the service chose, unvalidated. A payload
    /// without a usable index is a malformed-response service error.
    fn select_canonical(
        &self,
        candidates: &[String],
        context: &str,
        model: Option<&str>,
    ) -> Result<i64>;

    /// Judge whether a set of clusters groups the values well and suggest
    /// the preference for the next affinity propagation round.
    fn evaluate_clusters(&self, review: &ClusterReview<'_>) -> Result<ClusterEvaluation>;

    /// Get the configuration for this provider.
    fn config(&self) -> &LlmConfig;

    /// Get the name of this provider (for logging/debugging).
    fn name(&self) -> &str;
}

/// Parse JSON from an LLM response, handling markdown code blocks.
pub(crate) fn parse_json_response<T: for<'de> Deserialize<'de>>(
    provider: &str,
    response: &str,
) -> Result<T> {
    let json_str = if response.contains("```json") {
        response
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .unwrap_or(response)
    } else if response.contains("```") {
        response
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .unwrap_or(response)
    } else {
        response.trim()
    };

    serde_json::from_str(json_str).map_err(|e| {
        CanonizeError::malformed(provider, format!("Failed to parse LLM JSON response: {}", e))
    })
}

/// Turn a non-success HTTP response into a service error.
pub(crate) fn ensure_success(
    provider: &str,
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let kind = if status.as_u16() == 429 {
        ServiceFailure::RateLimited
    } else {
        ServiceFailure::Status(status.as_u16())
    };
    let error_text = response.text().unwrap_or_default();
    Err(CanonizeError::service(
        provider,
        kind,
        format!("API error ({}): {}", status, error_text),
    ))
}

#[derive(Debug, Deserialize)]
struct PairScoresResponse {
    scores: Vec<PairScore>,
}

#[derive(Debug, Deserialize)]
struct CanonicalIndexResponse {
    index: i64,
}

static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"-?\d+").expect("valid regex"));

/// Parse a `{"scores": [{"index": .., "similarity": ..}]}` payload.
pub(crate) fn parse_pair_scores(provider: &str, response: &str) -> Result<Vec<PairScore>> {
    let parsed: PairScoresResponse = parse_json_response(provider, response)?;
    Ok(parsed.scores)
}

/// Parse a `{"index": n}` payload, falling back to the first integer in a
/// plain-text answer.
pub(crate) fn parse_canonical_index(provider: &str, response: &str) -> Result<i64> {
    if let Ok(parsed) = parse_json_response::<CanonicalIndexResponse>(provider, response) {
        return Ok(parsed.index);
    }
    INTEGER
        .find(response)
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .ok_or_else(|| {
            CanonizeError::malformed(
                provider,
                format!("No candidate number in response: {}", response.trim()),
            )
        })
}

/// Parse a cluster evaluation; a non-finite suggested preference is a
/// malformed response.
pub(crate) fn parse_cluster_evaluation(provider: &str, response: &str) -> Result<ClusterEvaluation> {
    let evaluation: ClusterEvaluation = parse_json_response(provider, response)?;
    if !evaluation.suggested_preference.is_finite() {
        return Err(CanonizeError::malformed(
            provider,
            format!(
                "Suggested preference is not a number: {}",
                evaluation.suggested_preference
            ),
        ));
    }
    Ok(evaluation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scores_from_markdown() {
        let response = r#"```json
{"scores": [{"index": 0, "similarity": 0.9}, {"index": 1, "similarity": 0.1}]}
```"#;
        let scores = parse_pair_scores("test", response).unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[1], PairScore { index: 1, similarity: 0.1 });
    }

    #[test]
    fn test_parse_scores_malformed() {
        let err = parse_pair_scores("test", "I think they are similar").unwrap_err();
        assert!(err.is_malformed_response());
    }

    #[test]
    fn test_parse_canonical_index() {
        assert_eq!(parse_canonical_index("test", r#"{"index": 2}"#).unwrap(), 2);
        assert_eq!(parse_canonical_index("test", "The best is number 3.").unwrap(), 3);
        assert!(
            parse_canonical_index("test", "none of them")
                .unwrap_err()
                .is_malformed_response()
        );
    }

    #[test]
    fn test_parse_cluster_evaluation() {
        let response = r#"{"is_satisfactory": false, "issues": ["NYC split from New York"],
            "suggested_preference": -0.6, "reasoning": "too many clusters"}"#;
        let evaluation = parse_cluster_evaluation("test", response).unwrap();
        assert!(!evaluation.is_satisfactory);
        assert_eq!(evaluation.issues.len(), 1);
        assert_eq!(evaluation.suggested_preference, -0.6);

        let minimal = r#"{"is_satisfactory": true, "suggested_preference": -0.3}"#;
        assert!(parse_cluster_evaluation("test", minimal).unwrap().is_satisfactory);

        let missing = r#"{"is_satisfactory": false}"#;
        assert!(
            parse_cluster_evaluation("test", missing)
                .unwrap_err()
                .is_malformed_response()
        );
    }

    #[test]
    fn test_reasoning_mode_aliases() {
        assert_eq!("strict".parse::<ReasoningMode>().unwrap(), ReasoningMode::Strict);
        assert_eq!("reliable".parse::<ReasoningMode>().unwrap(), ReasoningMode::Graded);
        assert!("creative".parse::<ReasoningMode>().is_err());
    }
}
