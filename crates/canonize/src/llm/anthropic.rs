//! Anthropic Claude API provider implementation.
//!
//! Anthropic has no embeddings endpoint, so this provider only covers
//! reasoning-based similarity and canonical selection.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;

use crate::error::{CanonizeError, Result};

use super::prompts;
use super::provider::{
    ClusterEvaluation, ClusterReview, LlmConfig, PairScore, ReasoningProvider, ScoringRequest,
    ValuePair, ensure_success, parse_canonical_index, parse_cluster_evaluation, parse_pair_scores,
};

/// Anthropic API endpoint.
const API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic API version.
const API_VERSION: &str = "2023-06-01";

const PROVIDER: &str = "anthropic";

/// Anthropic Claude provider.
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    config: LlmConfig,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let config = LlmConfig {
            model: "claude-sonnet-4-20250514".to_string(),
            ..LlmConfig::default()
        };
        Self::with_config(api_key, config)
    }

    /// Create a new Anthropic provider with custom configuration.
    pub fn with_config(api_key: impl Into<String>, config: LlmConfig) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(CanonizeError::Configuration(
                "Anthropic API key is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                CanonizeError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    /// Create from environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            CanonizeError::Configuration(
                "ANTHROPIC_API_KEY environment variable not set".to_string(),
            )
        })?;
        Self::new(api_key)
    }

    /// Build headers for API requests.
    fn build_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| CanonizeError::Configuration(format!("Invalid API key: {}", e)))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        Ok(headers)
    }

    /// Send a message to the Claude API.
    ///
    /// The messages API has no seed parameter; temperature 0 is the
    /// determinism lever here.
    fn send_message(&self, system: &str, user: &str, model: Option<&str>) -> Result<String> {
        let body = json!({
            "model": model.unwrap_or(&self.config.model),
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "system": system,
            "messages": [
                { "role": "user", "content": user }
            ]
        });

        let response = self
            .client
            .post(API_URL)
            .headers(self.build_headers()?)
            .json(&body)
            .send()
            .map_err(|e| CanonizeError::from_transport(PROVIDER, e))?;
        let response = ensure_success(PROVIDER, response)?;

        let api_response: ApiResponse = response.json().map_err(|e| {
            CanonizeError::malformed(PROVIDER, format!("Failed to parse API response: {}", e))
        })?;

        // Extract text from response
        api_response
            .content
            .into_iter()
            .find_map(|block| {
                if block.content_type == "text" {
                    Some(block.text)
                } else {
                    None
                }
            })
            .ok_or_else(|| CanonizeError::malformed(PROVIDER, "No text in API response"))
    }
}

impl ReasoningProvider for AnthropicProvider {
    fn score_pairs(
        &self,
        pairs: &[ValuePair],
        request: &ScoringRequest<'_>,
    ) -> Result<Vec<PairScore>> {
        let system = format!(
            "{}\n\n{}",
            prompts::system_prompt(),
            prompts::pair_scoring_prompt(request.mode, request.context)
        );
        let response = self.send_message(&system, &prompts::pairs_payload(pairs), request.model)?;
        parse_pair_scores(PROVIDER, &response)
    }

    fn select_canonical(
        &self,
        candidates: &[String],
        context: &str,
        model: Option<&str>,
    ) -> Result<i64> {
        let system = format!(
            "{}\n\n{}",
            prompts::system_prompt(),
            prompts::canonical_selection_prompt(context)
        );
        let response =
            self.send_message(&system, &prompts::numbered_candidates(candidates), model)?;
        parse_canonical_index(PROVIDER, &response)
    }

    fn evaluate_clusters(&self, review: &ClusterReview<'_>) -> Result<ClusterEvaluation> {
        let system = format!(
            "{}\n\n{}",
            prompts::system_prompt(),
            prompts::cluster_evaluation_prompt(review.context)
        );
        let response = self.send_message(
            &system,
            &prompts::cluster_review_payload(review),
            review.model,
        )?;
        parse_cluster_evaluation(PROVIDER, &response)
    }

    fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

/// Anthropic API response structure.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

/// Content block in API response.
#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}
