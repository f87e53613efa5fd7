//! Canonize: cluster noisy categorical values and replace them with one
//! canonical form.
//!
//! A column holding `"New York"`, `"new york"` and `"NYC"` usually means one
//! city. A normalization pass groups the distinct values of a column that
//! denote the same entity and rewrites every member of a group to its
//! canonical form. Each pass composes three swappable strategies:
//!
//! - **Similarity** - character (token-sort ratio), embedding (cosine), or
//!   reasoning (language model pair scoring)
//! - **Clustering** - hierarchical (average linkage), connected components,
//!   or affinity propagation, optionally with a reviewed preference search
//! - **Canonical selection** - most frequent member, or language model choice
//!
//! Passes chain: each runs over the previous pass's output and leaves an
//! immutable [`PassReport`] in a [`PassHistory`].
//!
//! # Core Principles
//!
//! - **Total**: every distinct value maps to a member of its own cluster
//! - **Idempotent**: running a mapping twice changes nothing the second time
//! - **All or nothing**: a failed pass leaves the column untouched
//!
//! # Example
//!
//! ```
//! use canonize::{ClusteringMethod, Normalizer, PassConfig, PassHistory};
//!
//! let column: Vec<String> = ["Boston", "boston", "BOSTON", "Chicago"]
//!     .iter()
//!     .map(|s| s.to_string())
//!     .collect();
//!
//! let pass = PassConfig::new("city").with_clustering(ClusteringMethod::Hierarchical {
//!     similarity_threshold: 0.85,
//! });
//!
//! let mut history = PassHistory::new();
//! let cleaned = Normalizer::new()
//!     .run_passes(&column, &[pass], &mut history)
//!     .unwrap();
//!
//! assert_eq!(cleaned, vec!["Boston", "Boston", "Boston", "Chicago"]);
//! assert_eq!(history.reports()[0].unique_after(), 2);
//! ```

pub mod canonical;
pub mod clustering;
pub mod error;
pub mod input;
pub mod llm;
pub mod pipeline;
pub mod similarity;

mod normalizer;

pub use canonical::{CanonicalMethod, Degraded, Selection};
pub use clustering::{
    ClusterAssignment, ClusterOutcome, ClusteringMethod, Convergence, PreferenceSearch, SearchRound,
};
pub use error::{CanonizeError, Result, ServiceFailure};
pub use input::{ColumnStore, DataTable, Parser, write_table};
pub use llm::{
    AnthropicProvider, ClusterEvaluation, ClusterReview, EmbeddingProvider, LlmConfig,
    MockProvider, OllamaProvider, OpenAIProvider, ReasoningMode, ReasoningProvider,
};
pub use normalizer::{Normalizer, PassResult};
pub use pipeline::{
    CanonicalMapping, ClusterReport, MemberCount, PassConfig, PassHistory, PassReport,
    PassStage, PipelineConfig, ProviderUsage,
};
pub use similarity::{SimilarityComputer, SimilarityMatrix, SimilarityMethod, SimilarityStats};
