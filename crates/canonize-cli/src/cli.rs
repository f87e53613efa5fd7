//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use canonize::{
    CanonicalMethod, ClusteringMethod, PassConfig, PreferenceSearch, ReasoningMode,
    SimilarityMethod,
};

/// Canonize: cluster noisy categorical values into canonical forms
#[derive(Parser)]
#[command(name = "canonize")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output (debug logging unless RUST_LOG is set)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run normalization passes and write the cleaned table
    Normalize {
        /// Path to the data file (CSV/TSV)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Pipeline file with one or more passes (overrides the pass options)
        #[arg(short, long)]
        pipeline: Option<PathBuf>,

        #[command(flatten)]
        pass: PassArgs,

        /// Output path for the cleaned table (default: <file>.canonized.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output path for the pass history (default: <file>.history.json)
        #[arg(long)]
        history: Option<PathBuf>,

        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// Show the clusters one pass would produce without writing anything
    Preview {
        /// Path to the data file (CSV/TSV)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[command(flatten)]
        pass: PassArgs,

        /// Also list values that stay on their own
        #[arg(long)]
        all: bool,

        /// Output the pass report as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// List the most similar value pairs of a column
    Similarity {
        /// Path to the data file (CSV/TSV)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Column to inspect
        #[arg(short, long)]
        column: String,

        /// Similarity method (character, embedding, reasoning)
        #[arg(short, long, default_value = "character")]
        similarity: SimilarityMethod,

        /// Only show pairs at or above this score
        #[arg(long, default_value = "0.5")]
        min: f64,

        /// Maximum number of pairs to show
        #[arg(short = 'n', long, default_value = "20")]
        top: usize,

        /// Free-text description of the column for language model prompts
        #[arg(long)]
        context: Option<String>,

        #[command(flatten)]
        provider: ProviderArgs,
    },
}

/// Options describing a single pass.
#[derive(Args, Debug, Clone)]
pub struct PassArgs {
    /// Column to normalize
    #[arg(short, long)]
    pub column: Option<String>,

    /// Similarity method (character, embedding, reasoning)
    #[arg(short, long, default_value = "character")]
    pub similarity: SimilarityMethod,

    /// Clustering method (hierarchical, connected_components, affinity_propagation)
    #[arg(short = 'm', long, default_value = "hierarchical")]
    pub clustering: ClusteringMethod,

    /// Similarity threshold for hierarchical and connected components
    #[arg(short, long)]
    pub threshold: Option<f64>,

    /// Affinity propagation preference (default: median similarity)
    #[arg(long)]
    pub preference: Option<f64>,

    /// Let the reasoning provider review affinity propagation for up to this
    /// many rounds, adjusting the preference
    #[arg(long, value_name = "ROUNDS")]
    pub preference_search: Option<usize>,

    /// Canonical selection (frequency, llm)
    #[arg(long, default_value = "frequency")]
    pub canonical: CanonicalMethod,

    /// Reasoning rubric (strict, graded)
    #[arg(long, default_value = "graded")]
    pub mode: ReasoningMode,

    /// Free-text description of the column for language model prompts
    #[arg(long)]
    pub context: Option<String>,
}

impl PassArgs {
    /// Build the pass configuration, applying overrides to the method defaults.
    pub fn to_config(&self, provider: &ProviderArgs) -> Result<PassConfig, String> {
        let column = self
            .column
            .clone()
            .ok_or("--column is required unless --pipeline is given")?;

        let model = provider.model.clone();
        let similarity = match self.similarity.clone() {
            SimilarityMethod::Character => SimilarityMethod::Character,
            SimilarityMethod::Embedding { .. } => SimilarityMethod::Embedding {
                model: provider.embedding_model.clone(),
            },
            SimilarityMethod::Reasoning {
                max_concurrent_batches,
                ..
            } => SimilarityMethod::Reasoning {
                model: model.clone(),
                mode: self.mode,
                max_concurrent_batches,
            },
        };

        let mut clustering = self.clustering.clone();
        match &mut clustering {
            ClusteringMethod::Hierarchical {
                similarity_threshold,
            }
            | ClusteringMethod::ConnectedComponents {
                similarity_threshold,
            } => {
                if let Some(t) = self.threshold {
                    *similarity_threshold = t;
                }
            }
            ClusteringMethod::AffinityPropagation {
                preference,
                preference_search,
                ..
            } => {
                if self.preference.is_some() {
                    *preference = self.preference;
                }
                if let Some(max_rounds) = self.preference_search {
                    *preference_search = Some(PreferenceSearch {
                        max_rounds,
                        model: model.clone(),
                    });
                }
            }
        }
        if self.preference_search.is_some() && clustering.preference_search().is_none() {
            return Err("--preference-search needs --clustering affinity_propagation".to_string());
        }

        let canonical = match self.canonical {
            CanonicalMethod::Frequency => CanonicalMethod::Frequency,
            CanonicalMethod::Llm { .. } => CanonicalMethod::Llm { model },
        };

        let mut config = PassConfig::new(column)
            .with_similarity(similarity)
            .with_clustering(clustering)
            .with_canonical(canonical);
        if let Some(context) = &self.context {
            config = config.with_context(context.clone());
        }
        Ok(config)
    }
}

/// Provider selection shared by every command.
#[derive(Args, Debug, Clone)]
pub struct ProviderArgs {
    /// Embedding/reasoning provider (none, openai, anthropic, ollama, mock)
    #[arg(long, default_value = "none")]
    pub provider: ProviderChoice,

    /// Chat model to use (provider-specific, e.g., "gpt-4.1-mini", "llama3.2")
    #[arg(long)]
    pub model: Option<String>,

    /// Embedding model to use (e.g., "text-embedding-3-small", "nomic-embed-text")
    #[arg(long)]
    pub embedding_model: Option<String>,
}

/// Provider used for embedding and reasoning calls
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProviderChoice {
    /// No provider - character similarity and frequency selection only
    #[default]
    None,
    /// OpenAI API (requires OPENAI_API_KEY)
    OpenAI,
    /// Anthropic API (requires ANTHROPIC_API_KEY), reasoning only
    Anthropic,
    /// Ollama local models (requires Ollama running)
    Ollama,
    /// Deterministic mock provider for testing
    Mock,
}

impl std::str::FromStr for ProviderChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(ProviderChoice::None),
            "openai" | "gpt" => Ok(ProviderChoice::OpenAI),
            "anthropic" | "claude" => Ok(ProviderChoice::Anthropic),
            "ollama" | "local" => Ok(ProviderChoice::Ollama),
            "mock" | "test" => Ok(ProviderChoice::Mock),
            _ => Err(format!(
                "Unknown provider: {}. Use: none, openai, anthropic, ollama, or mock.",
                s
            )),
        }
    }
}

impl std::fmt::Display for ProviderChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderChoice::None => write!(f, "none"),
            ProviderChoice::OpenAI => write!(f, "openai"),
            ProviderChoice::Anthropic => write!(f, "anthropic"),
            ProviderChoice::Ollama => write!(f, "ollama"),
            ProviderChoice::Mock => write!(f, "mock"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass_args() -> PassArgs {
        PassArgs {
            column: Some("city".to_string()),
            similarity: SimilarityMethod::Character,
            clustering: ClusteringMethod::default(),
            threshold: None,
            preference: None,
            preference_search: None,
            canonical: CanonicalMethod::Frequency,
            mode: ReasoningMode::Graded,
            context: None,
        }
    }

    fn no_provider() -> ProviderArgs {
        ProviderArgs {
            provider: ProviderChoice::None,
            model: None,
            embedding_model: None,
        }
    }

    #[test]
    fn test_threshold_override() {
        let args = PassArgs {
            clustering: "cc".parse().unwrap(),
            threshold: Some(0.7),
            ..pass_args()
        };
        let config = args.to_config(&no_provider()).unwrap();
        assert_eq!(config.clustering.threshold(), Some(0.7));
        assert_eq!(config.clustering.name(), "connected_components");
    }

    #[test]
    fn test_model_flows_into_methods() {
        let args = PassArgs {
            similarity: SimilarityMethod::reasoning(),
            canonical: CanonicalMethod::Llm { model: None },
            mode: ReasoningMode::Strict,
            ..pass_args()
        };
        let provider = ProviderArgs {
            provider: ProviderChoice::Ollama,
            model: Some("llama3.2".to_string()),
            embedding_model: None,
        };
        let config = args.to_config(&provider).unwrap();
        match config.similarity {
            SimilarityMethod::Reasoning { model, mode, .. } => {
                assert_eq!(model.as_deref(), Some("llama3.2"));
                assert_eq!(mode, ReasoningMode::Strict);
            }
            other => panic!("unexpected similarity {:?}", other),
        }
        assert_eq!(
            config.canonical,
            CanonicalMethod::Llm {
                model: Some("llama3.2".to_string())
            }
        );
    }

    #[test]
    fn test_preference_search_flag() {
        let args = PassArgs {
            clustering: "ap".parse().unwrap(),
            preference_search: Some(3),
            ..pass_args()
        };
        let provider = ProviderArgs {
            provider: ProviderChoice::OpenAI,
            model: Some("gpt-4.1".to_string()),
            embedding_model: None,
        };
        let config = args.to_config(&provider).unwrap();
        let search = config.clustering.preference_search().unwrap();
        assert_eq!(search.max_rounds, 3);
        assert_eq!(search.model.as_deref(), Some("gpt-4.1"));

        let hierarchical = PassArgs {
            preference_search: Some(3),
            ..pass_args()
        };
        assert!(hierarchical.to_config(&no_provider()).is_err());
    }

    #[test]
    fn test_column_required() {
        let args = PassArgs {
            column: None,
            ..pass_args()
        };
        assert!(args.to_config(&no_provider()).is_err());
    }

    #[test]
    fn test_provider_aliases() {
        assert_eq!("claude".parse::<ProviderChoice>(), Ok(ProviderChoice::Anthropic));
        assert_eq!("LOCAL".parse::<ProviderChoice>(), Ok(ProviderChoice::Ollama));
        assert!("bard".parse::<ProviderChoice>().is_err());
    }
}
