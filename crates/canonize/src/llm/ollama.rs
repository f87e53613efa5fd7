//! Ollama local LLM provider implementation.
//!
//! Ollama allows running chat and embedding models locally without API keys.
//! Install from: https://ollama.ai

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;

use crate::error::{CanonizeError, Result, ServiceFailure};

use super::prompts;
use super::provider::{
    ClusterEvaluation, ClusterReview, EmbeddingProvider, LlmConfig, PairScore, ReasoningProvider,
    ScoringRequest, ValuePair, parse_canonical_index, parse_cluster_evaluation, parse_pair_scores,
};

/// Default Ollama host.
const DEFAULT_HOST: &str = "http://localhost:11434";

const PROVIDER: &str = "ollama";

/// Ollama local provider for embeddings and reasoning.
pub struct OllamaProvider {
    client: Client,
    host: String,
    config: LlmConfig,
}

impl OllamaProvider {
    /// Create a new Ollama provider with default settings.
    ///
    /// Uses `llama3.2` for chat and `nomic-embed-text` for embeddings. Make
    /// sure they are pulled: `ollama pull llama3.2 && ollama pull nomic-embed-text`
    pub fn new() -> Result<Self> {
        Self::with_config(Self::default_config())
    }

    /// Create with a specific chat model.
    pub fn with_model(model: impl Into<String>) -> Result<Self> {
        let config = LlmConfig {
            model: model.into(),
            ..Self::default_config()
        };
        Self::with_config(config)
    }

    /// Create with custom configuration.
    pub fn with_config(config: LlmConfig) -> Result<Self> {
        let client = Client::builder()
            // Local models can be slower
            .timeout(Duration::from_secs(config.timeout_secs.max(120)))
            .build()
            .map_err(|e| {
                CanonizeError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        let host = std::env::var("OLLAMA_HOST")
            .map(|host| host.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| DEFAULT_HOST.to_string());

        Ok(Self {
            client,
            host,
            config,
        })
    }

    fn default_config() -> LlmConfig {
        LlmConfig {
            model: "llama3.2".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            ..LlmConfig::default()
        }
    }

    /// POST a JSON body to an Ollama endpoint.
    fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
        model: &str,
    ) -> Result<reqwest::blocking::Response> {
        let response = self
            .client
            .post(format!("{}{}", self.host, path))
            .json(body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    CanonizeError::service(
                        PROVIDER,
                        ServiceFailure::Request,
                        "Failed to connect to Ollama. Is it running? Start with: ollama serve",
                    )
                } else {
                    CanonizeError::from_transport(PROVIDER, e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();

            // Check for model not found error
            if error_text.contains("not found") {
                return Err(CanonizeError::Configuration(format!(
                    "Model '{}' not found. Pull it with: ollama pull {}",
                    model, model
                )));
            }

            return Err(CanonizeError::service(
                PROVIDER,
                ServiceFailure::Status(status.as_u16()),
                format!("Ollama error ({}): {}", status, error_text),
            ));
        }

        Ok(response)
    }

    /// Send a chat message to Ollama in JSON mode.
    fn send_message(&self, system: &str, user: &str, model: Option<&str>) -> Result<String> {
        let model = model.unwrap_or(&self.config.model);
        let body = json!({
            "model": model,
            "stream": false,
            "format": "json",
            "options": {
                "temperature": self.config.temperature,
                "seed": self.config.seed,
                "num_predict": self.config.max_tokens
            },
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ]
        });

        let response = self.post("/api/chat", &body, model)?;
        let api_response: ChatResponse = response.json().map_err(|e| {
            CanonizeError::malformed(PROVIDER, format!("Failed to parse Ollama response: {}", e))
        })?;

        Ok(api_response.message.content)
    }
}

impl EmbeddingProvider for OllamaProvider {
    fn embed(&self, texts: &[String], model: Option<&str>) -> Result<Vec<Vec<f64>>> {
        let model = model.unwrap_or(&self.config.embedding_model);
        let body = json!({ "model": model, "input": texts });

        let response = self.post("/api/embed", &body, model)?;
        let api_response: EmbedResponse = response.json().map_err(|e| {
            CanonizeError::malformed(PROVIDER, format!("Failed to parse embeddings: {}", e))
        })?;

        Ok(api_response.embeddings)
    }

    fn embedding_model(&self) -> &str {
        &self.config.embedding_model
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

impl ReasoningProvider for OllamaProvider {
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

/// Ollama chat response structure.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// Ollama embed response structure.
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f64>>,
}
