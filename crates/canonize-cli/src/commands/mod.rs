//! CLI command implementations.

pub mod normalize;
pub mod preview;
pub mod similarity;

use std::path::Path;
use std::sync::Arc;

use canonize::{
    AnthropicProvider, DataTable, MockProvider, Normalizer, OllamaProvider, OpenAIProvider, Parser,
};

use crate::cli::{ProviderArgs, ProviderChoice};

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Wire the chosen provider into a normalizer.
pub fn build_normalizer(args: &ProviderArgs) -> canonize::Result<Normalizer> {
    let normalizer = Normalizer::new();
    Ok(match args.provider {
        ProviderChoice::None => normalizer,
        ProviderChoice::OpenAI => {
            let provider = Arc::new(OpenAIProvider::from_env()?);
            normalizer
                .with_embedding_provider(provider.clone())
                .with_reasoning_provider(provider)
        }
        // Anthropic has no embedding endpoint.
        ProviderChoice::Anthropic => {
            normalizer.with_reasoning_provider(Arc::new(AnthropicProvider::from_env()?))
        }
        ProviderChoice::Ollama => {
            let provider = Arc::new(OllamaProvider::new()?);
            normalizer
                .with_embedding_provider(provider.clone())
                .with_reasoning_provider(provider)
        }
        ProviderChoice::Mock => {
            let provider = Arc::new(MockProvider::new());
            normalizer
                .with_embedding_provider(provider.clone())
                .with_reasoning_provider(provider)
        }
    })
}

/// Read a table, failing early with a readable message when it is absent.
pub fn read_table(file: &Path) -> Result<DataTable, Box<dyn std::error::Error>> {
    if !file.exists() {
        return Err(format!("File not found: {}", file.display()).into());
    }
    let table = Parser::new().parse_file(file)?;
    Ok(table)
}
