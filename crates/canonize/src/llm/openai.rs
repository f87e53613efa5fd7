//! OpenAI API provider: chat completions and embeddings.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;

use crate::error::{CanonizeError, Result};

use super::prompts;
use super::provider::{
    ClusterEvaluation, ClusterReview, EmbeddingProvider, LlmConfig, PairScore, ReasoningProvider,
    ScoringRequest, ValuePair, ensure_success, parse_canonical_index, parse_cluster_evaluation,
    parse_pair_scores,
};

/// OpenAI chat completions endpoint.
const CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI embeddings endpoint.
const EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

const PROVIDER: &str = "openai";

/// OpenAI provider for embeddings and reasoning.
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    config: LlmConfig,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(api_key, LlmConfig::default())
    }

    /// Create a new OpenAI provider with custom configuration.
    pub fn with_config(api_key: impl Into<String>, config: LlmConfig) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(CanonizeError::Configuration(
                "OpenAI API key is empty".to_string(),
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
        Self::from_env_with_config(LlmConfig::default())
    }

    /// Create from environment variable with custom configuration.
    pub fn from_env_with_config(config: LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            CanonizeError::Configuration("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        Self::with_config(api_key, config)
    }

    /// Build headers for API requests.
    fn build_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| CanonizeError::Configuration(format!("Invalid API key: {}", e)))?,
        );
        Ok(headers)
    }

    /// Send one chat request and return the message text.
    fn send_message(&self, system: &str, user: &str, model: Option<&str>) -> Result<String> {
        let body = json!({
            "model": model.unwrap_or(&self.config.model),
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "seed": self.config.seed,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ]
        });

        let response = self
            .client
            .post(CHAT_URL)
            .headers(self.build_headers()?)
            .json(&body)
            .send()
            .map_err(|e| CanonizeError::from_transport(PROVIDER, e))?;
        let response = ensure_success(PROVIDER, response)?;

        let api_response: ChatResponse = response.json().map_err(|e| {
            CanonizeError::malformed(PROVIDER, format!("Failed to parse API response: {}", e))
        })?;

        api_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| CanonizeError::malformed(PROVIDER, "No choices in response"))
    }
}

impl EmbeddingProvider for OpenAIProvider {
    fn embed(&self, texts: &[String], model: Option<&str>) -> Result<Vec<Vec<f64>>> {
        let body = json!({
            "model": model.unwrap_or(&self.config.embedding_model),
            "input": texts,
        });

        let response = self
            .client
            .post(EMBEDDINGS_URL)
            .headers(self.build_headers()?)
            .json(&body)
            .send()
            .map_err(|e| CanonizeError::from_transport(PROVIDER, e))?;
        let response = ensure_success(PROVIDER, response)?;

        let mut api_response: EmbeddingResponse = response.json().map_err(|e| {
            CanonizeError::malformed(PROVIDER, format!("Failed to parse embeddings: {}", e))
        })?;

        // The API documents input order, but each item carries its index anyway.
        api_response.data.sort_by_key(|item| item.index);
        Ok(api_response
            .data
            .into_iter()
            .map(|item| item.embedding)
            .collect())
    }

    fn embedding_model(&self) -> &str {
        &self.config.embedding_model
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

impl ReasoningProvider for OpenAIProvider {
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

/// OpenAI chat response structure.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: String,
}

/// OpenAI embeddings response structure.
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f64>,
}
