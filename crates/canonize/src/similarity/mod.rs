//! Pairwise similarity between the unique values of a column.
//!
//! Three strategies produce the same [`SimilarityMatrix`]:
//!
//! - [`SimilarityMethod::Character`] - token-sort ratio, local and pure
//! - [`SimilarityMethod::Embedding`] - cosine over provider embeddings
//! - [`SimilarityMethod::Reasoning`] - batched pair scoring by a language model

mod character;
mod embedding;
mod matrix;
mod reasoning;

use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{CanonizeError, Result};
use crate::llm::{EmbeddingProvider, ReasoningMode, ReasoningProvider, ScoringRequest};

pub use character::{character_similarity, token_sort_ratio};
pub use embedding::embedding_similarity;
pub use matrix::{SimilarityMatrix, SimilarityStats};
pub use reasoning::{batch_size, reasoning_similarity};

/// Default number of reasoning batches in flight.
pub const DEFAULT_MAX_CONCURRENT_BATCHES: usize = 4;

fn default_max_concurrent_batches() -> usize {
    DEFAULT_MAX_CONCURRENT_BATCHES
}

/// How pairwise similarity is computed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum SimilarityMethod {
    /// Token-sort ratio on case-folded strings.
    #[default]
    Character,

    /// Cosine similarity of provider embeddings.
    Embedding {
        /// Embedding model override.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },

    /// Pair scoring by a reasoning provider.
    Reasoning {
        /// Chat model override.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default)]
        mode: ReasoningMode,
        #[serde(default = "default_max_concurrent_batches")]
        max_concurrent_batches: usize,
    },
}

impl SimilarityMethod {
    /// Reasoning similarity with default settings.
    pub fn reasoning() -> Self {
        SimilarityMethod::Reasoning {
            model: None,
            mode: ReasoningMode::default(),
            max_concurrent_batches: DEFAULT_MAX_CONCURRENT_BATCHES,
        }
    }

    /// Method name, as used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            SimilarityMethod::Character => "character",
            SimilarityMethod::Embedding { .. } => "embedding",
            SimilarityMethod::Reasoning { .. } => "reasoning",
        }
    }

    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if let SimilarityMethod::Reasoning {
            max_concurrent_batches,
            ..
        } = self
        {
            if *max_concurrent_batches == 0 {
                return Err(CanonizeError::Configuration(
                    "max_concurrent_batches must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl FromStr for SimilarityMethod {
    type Err = CanonizeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "character" | "rapidfuzz" | "fuzzy" => Ok(SimilarityMethod::Character),
            "embedding" | "embeddings" => Ok(SimilarityMethod::Embedding { model: None }),
            "reasoning" | "llm" => Ok(SimilarityMethod::reasoning()),
            _ => Err(CanonizeError::Configuration(format!(
                "Unknown similarity method: {}. Use: character, embedding, or reasoning.",
                s
            ))),
        }
    }
}

impl fmt::Display for SimilarityMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Computes similarity matrices with whichever providers are available.
#[derive(Default, Clone, Copy)]
pub struct SimilarityComputer<'a> {
    embedding: Option<&'a dyn EmbeddingProvider>,
    reasoning: Option<&'a dyn ReasoningProvider>,
}

impl<'a> SimilarityComputer<'a> {
    /// Computer that can only run character similarity.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_embedding_provider(mut self, provider: &'a dyn EmbeddingProvider) -> Self {
        self.embedding = Some(provider);
        self
    }

    pub fn with_reasoning_provider(mut self, provider: &'a dyn ReasoningProvider) -> Self {
        self.reasoning = Some(provider);
        self
    }

    /// Fail with a configuration error if `method` cannot run.
    ///
    /// Called before any external request is made.
    pub fn check(&self, method: &SimilarityMethod) -> Result<()> {
        method.validate()?;
        match method {
            SimilarityMethod::Character => Ok(()),
            SimilarityMethod::Embedding { .. } => self.embedding_provider().map(|_| ()),
            SimilarityMethod::Reasoning { .. } => self.reasoning_provider().map(|_| ()),
        }
    }

    /// Build the similarity matrix of `values`.
    ///
    /// `context` describes the column and is only used by reasoning
    /// similarity. No partial matrix is ever returned.
    pub fn compute(
        &self,
        values: &[String],
        method: &SimilarityMethod,
        context: &str,
    ) -> Result<SimilarityMatrix> {
        self.check(method)?;
        debug!("Computing {} similarity for {} values", method, values.len());

        match method {
            SimilarityMethod::Character => Ok(character_similarity(values)),
            SimilarityMethod::Embedding { model } => {
                embedding_similarity(values, self.embedding_provider()?, model.as_deref())
            }
            SimilarityMethod::Reasoning {
                model,
                mode,
                max_concurrent_batches,
            } => {
                let request = ScoringRequest {
                    context,
                    mode: *mode,
                    model: model.as_deref(),
                };
                reasoning_similarity(
                    values,
                    self.reasoning_provider()?,
                    &request,
                    *max_concurrent_batches,
                )
            }
        }
    }

    fn embedding_provider(&self) -> Result<&'a dyn EmbeddingProvider> {
        self.embedding.ok_or_else(|| {
            CanonizeError::Configuration(
                "Embedding similarity requires an embedding provider".to_string(),
            )
        })
    }

    fn reasoning_provider(&self) -> Result<&'a dyn ReasoningProvider> {
        self.reasoning.ok_or_else(|| {
            CanonizeError::Configuration(
                "Reasoning similarity requires a reasoning provider".to_string(),
            )
        })
    }
}
