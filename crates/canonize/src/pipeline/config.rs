//! Pass and pipeline configuration, loadable from JSON.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::canonical::CanonicalMethod;
use crate::clustering::{ClusteringMethod, DEFAULT_HIERARCHICAL_THRESHOLD};
use crate::error::{CanonizeError, Result};
use crate::similarity::SimilarityMethod;

/// Configuration of one normalization pass over one column.
///
/// ```
/// use canonize::{ClusteringMethod, PassConfig};
///
/// let config = PassConfig::new("city")
///     .with_clustering(ClusteringMethod::ConnectedComponents {
///         similarity_threshold: 0.9,
///     })
///     .with_context("US city names");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassConfig {
    /// Column to normalize.
    pub column: String,
    #[serde(default)]
    pub similarity: SimilarityMethod,
    #[serde(default)]
    pub clustering: ClusteringMethod,
    #[serde(default)]
    pub canonical: CanonicalMethod,
    /// Free-text description of the column for embedding and reasoning
    /// providers, e.g. "Country where respondents work".
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub context: String,
}

impl PassConfig {
    /// Character similarity, hierarchical clustering, frequency selection.
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            similarity: SimilarityMethod::Character,
            clustering: ClusteringMethod::Hierarchical {
                similarity_threshold: DEFAULT_HIERARCHICAL_THRESHOLD,
            },
            canonical: CanonicalMethod::Frequency,
            context: String::new(),
        }
    }

    pub fn with_similarity(mut self, similarity: SimilarityMethod) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn with_clustering(mut self, clustering: ClusteringMethod) -> Self {
        self.clustering = clustering;
        self
    }

    pub fn with_canonical(mut self, canonical: CanonicalMethod) -> Self {
        self.canonical = canonical;
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Check every parameter range.
    pub fn validate(&self) -> Result<()> {
        if self.column.trim().is_empty() {
            return Err(CanonizeError::Configuration(
                "Pass column name is empty".to_string(),
            ));
        }
        self.similarity.validate()?;
        self.clustering.validate()
    }

    /// One-line description, e.g. `character/hierarchical(0.82)/frequency`.
    pub fn describe(&self) -> String {
        let clustering = match (self.clustering.threshold(), self.clustering.preference_search()) {
            (Some(t), _) => format!("{}({})", self.clustering, t),
            (None, Some(search)) => format!("{}(search:{})", self.clustering, search.max_rounds),
            (None, None) => self.clustering.to_string(),
        };
        format!("{}/{}/{}", self.similarity, clustering, self.canonical)
    }
}

/// An ordered list of passes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub passes: Vec<PassConfig>,
}

impl PipelineConfig {
    pub fn new(passes: Vec<PassConfig>) -> Self {
        Self { passes }
    }

    /// Parse a JSON pipeline. Unknown method names are configuration errors.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json).map_err(|e| {
            CanonizeError::Configuration(format!("Invalid pipeline configuration: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a pipeline from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| CanonizeError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: PipelineConfig =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| {
                CanonizeError::Configuration(format!(
                    "Invalid pipeline configuration '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Save the pipeline as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| CanonizeError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let file = File::create(path).map_err(|e| CanonizeError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Validate every pass.
    pub fn validate(&self) -> Result<()> {
        if self.passes.is_empty() {
            return Err(CanonizeError::Configuration(
                "Pipeline has no passes".to_string(),
            ));
        }
        self.passes.iter().try_for_each(PassConfig::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_from_minimal_json() {
        let config = PipelineConfig::from_json(r#"{"passes": [{"column": "city"}]}"#).unwrap();
        assert_eq!(config.passes[0], PassConfig::new("city"));
    }

    #[test]
    fn test_full_pass_json() {
        let json = r#"{"passes": [{
            "column": "country",
            "similarity": {"method": "embedding", "model": "text-embedding-3-large"},
            "clustering": {"method": "connected_components", "similarity_threshold": 0.73},
            "canonical": {"method": "llm"},
            "context": "Country where respondents work"
        }]}"#;
        let config = PipelineConfig::from_json(json).unwrap();
        let pass = &config.passes[0];
        assert_eq!(pass.describe(), "embedding/connected_components(0.73)/llm");
        assert_eq!(pass.context, "Country where respondents work");
    }

    #[test]
    fn test_unknown_method_is_configuration_error() {
        let json = r#"{"passes": [{"column": "c", "clustering": {"method": "kmeans"}}]}"#;
        assert!(matches!(
            PipelineConfig::from_json(json),
            Err(CanonizeError::Configuration(_))
        ));
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let json = r#"{"passes": [{"column": "c",
            "clustering": {"method": "hierarchical", "similarity_threshold": -0.1}}]}"#;
        assert!(matches!(
            PipelineConfig::from_json(json),
            Err(CanonizeError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_pipeline_rejected() {
        assert!(PipelineConfig::from_json(r#"{"passes": []}"#).is_err());
    }

    #[test]
    fn test_save_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("pipeline.json");
        let config = PipelineConfig::new(vec![
            PassConfig::new("city"),
            PassConfig::new("city")
                .with_similarity(SimilarityMethod::reasoning())
                .with_clustering(ClusteringMethod::affinity_propagation()),
        ]);
        config.save(&path).unwrap();
        assert_eq!(PipelineConfig::load(&path).unwrap(), config);
    }
}
