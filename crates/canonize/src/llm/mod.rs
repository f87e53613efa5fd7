//! External embedding and reasoning providers.
//!
//! Embedding-based similarity needs an [`EmbeddingProvider`]; reasoning-based
//! similarity, LLM canonical selection and the affinity preference search
//! need a [`ReasoningProvider`].
//! Character-based similarity with frequency selection needs neither.
//!
//! # Supported Providers
//!
//! - **OpenAI** - chat + embeddings via API (requires `OPENAI_API_KEY`)
//! - **Anthropic** - Claude chat models via API (requires `ANTHROPIC_API_KEY`)
//! - **Ollama** - local chat + embedding models, no API key needed
//! - **Mock** - deterministic, offline; for tests
//!
//! # Example
//!
//! ```no_run
//! use canonize::{Normalizer, OpenAIProvider};
//! use std::sync::Arc;
//!
//! let openai = Arc::new(OpenAIProvider::from_env().unwrap());
//! let normalizer = Normalizer::new()
//!     .with_embedding_provider(openai.clone())
//!     .with_reasoning_provider(openai);
//! ```

mod anthropic;
mod mock;
mod ollama;
mod openai;
mod prompts;
mod provider;

pub use anthropic::AnthropicProvider;
pub use mock::{MockCanonicalResponse, MockProvider};
pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;
pub use provider::{
    ClusterEvaluation, ClusterReview, EmbeddingProvider, LlmConfig, PairScore, ReasoningMode,
    ReasoningProvider, ScoringRequest, ValuePair,
};
