//! The pass orchestrator.

use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::canonical::{self, CanonicalMethod, Degraded};
use crate::clustering::{self, ClusterOutcome, SearchRound};
use crate::error::{CanonizeError, Result};
use crate::input::ColumnStore;
use crate::llm::{EmbeddingProvider, ReasoningProvider};
use crate::pipeline::{
    CanonicalMapping, ClusterReport, MemberCount, PassConfig, PassHistory, PassOutcome,
    PassReport, PassStage, PipelineConfig, ProviderUsage, ValueCounts,
};
use crate::similarity::{SimilarityComputer, SimilarityMatrix, SimilarityMethod};

/// Output of one pass: the rewritten column and its report.
#[derive(Debug, Clone)]
pub struct PassResult {
    pub column: Vec<String>,
    pub report: PassReport,
}

/// Runs normalization passes.
///
/// Character similarity with frequency selection needs no providers.
/// Embedding similarity needs an embedding provider; reasoning similarity,
/// LLM selection and the affinity preference search need a reasoning
/// provider. Missing providers are
/// configuration errors raised before anything is computed.
///
/// # Example
///
/// ```
/// use canonize::{Normalizer, PassConfig};
///
/// let column: Vec<String> = ["Boston", "boston", "BOSTON", "Chicago"]
///     .iter()
///     .map(|s| s.to_string())
///     .collect();
///
/// let result = Normalizer::new()
///     .run_pass(&column, &PassConfig::new("city"), 0)
///     .unwrap();
/// assert_eq!(result.column, vec!["Boston", "Boston", "Boston", "Chicago"]);
/// assert_eq!(result.report.unique_after(), 2);
/// ```
#[derive(Default, Clone)]
pub struct Normalizer {
    embedding: Option<Arc<dyn EmbeddingProvider>>,
    reasoning: Option<Arc<dyn ReasoningProvider>>,
}

impl Normalizer {
    /// Normalizer without providers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider for embedding similarity.
    pub fn with_embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding = Some(provider);
        self
    }

    /// Add a provider for reasoning similarity and LLM canonical selection.
    pub fn with_reasoning_provider(mut self, provider: Arc<dyn ReasoningProvider>) -> Self {
        self.reasoning = Some(provider);
        self
    }

    /// Similarity computer backed by this normalizer's providers.
    pub fn similarity_computer(&self) -> SimilarityComputer<'_> {
        let mut computer = SimilarityComputer::new();
        if let Some(provider) = &self.embedding {
            computer = computer.with_embedding_provider(provider.as_ref());
        }
        if let Some(provider) = &self.reasoning {
            computer = computer.with_reasoning_provider(provider.as_ref());
        }
        computer
    }

    /// Fail with a configuration error if `config` cannot run with the
    /// providers at hand.
    pub fn check(&self, config: &PassConfig) -> Result<()> {
        config.validate()?;
        self.similarity_computer().check(&config.similarity)?;
        if config.canonical.requires_reasoning() && self.reasoning.is_none() {
            return Err(CanonizeError::Configuration(
                "LLM canonical selection requires a reasoning provider".to_string(),
            ));
        }
        if config.clustering.preference_search().is_some() && self.reasoning.is_none() {
            return Err(CanonizeError::Configuration(
                "Affinity preference search requires a reasoning provider".to_string(),
            ));
        }
        Ok(())
    }

    /// Provider and effective model of every stage of `config` that calls
    /// out, in stage order.
    pub fn provider_usage(&self, config: &PassConfig) -> Vec<ProviderUsage> {
        let mut usage = Vec::new();
        let reasoning = |stage: PassStage, model: Option<&String>| {
            self.reasoning.as_deref().map(|p| ProviderUsage {
                stage,
                provider: p.name().to_string(),
                model: model.cloned().unwrap_or_else(|| p.config().model.clone()),
            })
        };

        match &config.similarity {
            SimilarityMethod::Character => {}
            SimilarityMethod::Embedding { model } => {
                usage.extend(self.embedding.as_deref().map(|p| ProviderUsage {
                    stage: PassStage::Similarity,
                    provider: p.name().to_string(),
                    model: model.clone().unwrap_or_else(|| p.embedding_model().to_string()),
                }));
            }
            SimilarityMethod::Reasoning { model, .. } => {
                usage.extend(reasoning(PassStage::Similarity, model.as_ref()));
            }
        }
        if let Some(search) = config.clustering.preference_search() {
            usage.extend(reasoning(PassStage::Cluster, search.model.as_ref()));
        }
        if let CanonicalMethod::Llm { model } = &config.canonical {
            usage.extend(reasoning(PassStage::Canonical, model.as_ref()));
        }
        usage
    }

    /// Run one pass over a column.
    ///
    /// The input is never modified; on error nothing is returned but the
    /// error itself. Missing cells keep their position and value.
    pub fn run_pass(
        &self,
        column: &[String],
        config: &PassConfig,
        pass_index: usize,
    ) -> Result<PassResult> {
        let values = in_stage(pass_index, PassStage::Init, || {
            self.check(config)?;
            let values = ValueCounts::from_column(column);
            if values.is_empty() {
                return Err(CanonizeError::Validation(format!(
                    "Column '{}' has no non-missing values",
                    config.column
                )));
            }
            Ok(values)
        })?;

        if values.len() == 1 {
            return self.trivial_pass(column, config, pass_index, values);
        }

        let matrix = in_stage(pass_index, PassStage::Similarity, || {
            self.similarity_computer()
                .compute(&values.values(), &config.similarity, &config.context)
        })?;

        let (outcome, preference_search) = in_stage(pass_index, PassStage::Cluster, || {
            self.cluster(&matrix, &values, config)
        })?;

        let clusters = in_stage(pass_index, PassStage::Canonical, || {
            self.select_canonicals(&values, &outcome, config)
        })?;

        let mapping = in_stage(pass_index, PassStage::Mapping, || {
            Ok(build_mapping(&values, &outcome, &clusters))
        })?;

        let (rewritten, changed_cells) =
            in_stage(pass_index, PassStage::Apply, || Ok(mapping.apply(column)))?;

        let report = in_stage(pass_index, PassStage::Report, || {
            PassReport::new(PassOutcome {
                pass_index,
                config: config.clone(),
                values,
                changed_cells,
                mapping,
                clusters,
                convergence: outcome.convergence,
                preference_search,
                providers: self.provider_usage(config),
                skipped_reason: None,
            })
        })?;

        log_summary(&report);
        debug!("Pass {}: {}", pass_index, PassStage::Done);
        Ok(PassResult {
            column: rewritten,
            report,
        })
    }

    /// A single distinct value is its own canonical form; no similarity or
    /// provider work is done.
    fn trivial_pass(
        &self,
        column: &[String],
        config: &PassConfig,
        pass_index: usize,
        values: ValueCounts,
    ) -> Result<PassResult> {
        let value = values.value(0).to_string();
        let cluster = ClusterReport {
            id: 0,
            canonical: value.clone(),
            members: vec![MemberCount {
                value: value.clone(),
                count: values.count(0),
            }],
            degraded: Vec::new(),
        };
        let report = PassReport::new(PassOutcome {
            pass_index,
            config: config.clone(),
            values,
            changed_cells: 0,
            mapping: CanonicalMapping::from_pairs([(value.clone(), value)]),
            clusters: vec![cluster],
            convergence: None,
            preference_search: Vec::new(),
            providers: Vec::new(),
            skipped_reason: Some("single unique value".to_string()),
        })?;

        info!(
            "Pass {} on '{}': single unique value, nothing to merge",
            pass_index, config.column
        );
        Ok(PassResult {
            column: column.to_vec(),
            report,
        })
    }

    /// Cluster with the configured method, running the reviewed preference
    /// search when one is set.
    fn cluster(
        &self,
        matrix: &SimilarityMatrix,
        values: &ValueCounts,
        config: &PassConfig,
    ) -> Result<(ClusterOutcome, Vec<SearchRound>)> {
        let method = &config.clustering;
        let search = method.preference_search().zip(method.affinity_params());
        match (search, self.reasoning.as_deref()) {
            (Some((search, params)), Some(reviewer)) => {
                method.validate()?;
                clustering::search_preference(
                    matrix,
                    &values.values(),
                    &params,
                    search,
                    reviewer,
                    &config.context,
                )
            }
            (Some(_), None) => Err(CanonizeError::Configuration(
                "Affinity preference search requires a reasoning provider".to_string(),
            )),
            (None, _) => Ok((clustering::cluster(matrix, method)?, Vec::new())),
        }
    }

    fn select_canonicals(
        &self,
        values: &ValueCounts,
        outcome: &ClusterOutcome,
        config: &PassConfig,
    ) -> Result<Vec<ClusterReport>> {
        let clustering_flags: Vec<Degraded> = match outcome.convergence {
            Some(c) if c.exemplars == 0 => vec![Degraded::NoExemplars],
            Some(c) if !c.converged => vec![Degraded::NotConverged],
            _ => Vec::new(),
        };

        outcome
            .assignment
            .clusters()
            .into_iter()
            .enumerate()
            .map(|(id, indices)| {
                let members: Vec<String> =
                    indices.iter().map(|&i| values.value(i).to_string()).collect();
                let counts: Vec<usize> = indices.iter().map(|&i| values.count(i)).collect();

                let selection = canonical::select(
                    &members,
                    &counts,
                    &config.canonical,
                    &config.context,
                    self.reasoning.as_deref(),
                )?;

                let mut degraded = clustering_flags.clone();
                degraded.extend(selection.degraded);
                Ok(ClusterReport {
                    id,
                    canonical: selection.value,
                    members: members
                        .into_iter()
                        .zip(counts)
                        .map(|(value, count)| MemberCount { value, count })
                        .collect(),
                    degraded,
                })
            })
            .collect()
    }

    /// Run passes in order, each over the previous pass's output.
    ///
    /// Every pass is checked before the first one runs. Reports are appended
    /// to `history` only once all passes have succeeded.
    pub fn run_passes(
        &self,
        column: &[String],
        passes: &[PassConfig],
        history: &mut PassHistory,
    ) -> Result<Vec<String>> {
        passes.iter().try_for_each(|config| self.check(config))?;

        let mut current = column.to_vec();
        let mut reports = Vec::with_capacity(passes.len());
        for config in passes {
            let result = self.run_pass(&current, config, history.len() + reports.len())?;
            current = result.column;
            reports.push(result.report);
        }

        for report in reports {
            history.push(report);
        }
        Ok(current)
    }

    /// Run a pipeline against the columns of a store.
    ///
    /// Passes may target different columns; passes on the same column chain.
    /// Columns are written back only after every pass has succeeded, so a
    /// failed pipeline leaves the store untouched.
    pub fn normalize_column(
        &self,
        store: &mut impl ColumnStore,
        pipeline: &PipelineConfig,
        history: &mut PassHistory,
    ) -> Result<()> {
        pipeline.validate()?;
        pipeline
            .passes
            .iter()
            .try_for_each(|config| self.check(config))?;

        let mut working: IndexMap<String, Vec<String>> = IndexMap::new();
        let mut reports = Vec::with_capacity(pipeline.passes.len());
        for config in &pipeline.passes {
            if !working.contains_key(&config.column) {
                let values = store.get_column(&config.column)?;
                working.insert(config.column.clone(), values);
            }
            let current = &working[&config.column];
            let result = self.run_pass(current, config, history.len() + reports.len())?;
            working.insert(config.column.clone(), result.column);
            reports.push(result.report);
        }

        store.set_columns(working)?;
        for report in reports {
            history.push(report);
        }
        Ok(())
    }
}

/// Run one stage, logging entry and failure.
fn in_stage<T>(pass: usize, stage: PassStage, f: impl FnOnce() -> Result<T>) -> Result<T> {
    debug!("Pass {}: {}", pass, stage);
    f().inspect_err(|e| warn!("Pass {} aborted in {} stage: {}", pass, stage, e))
}

/// Map every value to the canonical form of its cluster.
fn build_mapping(
    values: &ValueCounts,
    outcome: &ClusterOutcome,
    clusters: &[ClusterReport],
) -> CanonicalMapping {
    CanonicalMapping::from_pairs(
        outcome
            .assignment
            .labels()
            .iter()
            .enumerate()
            .map(|(i, &label)| (values.value(i).to_string(), clusters[label].canonical.clone())),
    )
}

fn log_summary(report: &PassReport) {
    info!(
        "Pass {} on '{}' ({}): {} -> {} unique values, {} cells changed",
        report.pass_index(),
        report.column(),
        report.config().describe(),
        report.unique_before(),
        report.unique_after(),
        report.changed_cells()
    );
    for cluster in report.degraded_clusters() {
        let flags: Vec<String> = cluster.degraded.iter().map(|d| d.to_string()).collect();
        warn!(
            "Pass {} cluster {} ('{}') degraded: {}",
            report.pass_index(),
            cluster.id,
            cluster.canonical,
            flags.join(", ")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::{ClusteringMethod, PreferenceSearch};
    use crate::llm::{ClusterEvaluation, MockProvider};

    fn column(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_column_is_validation_error() {
        let result = Normalizer::new().run_pass(&column(&["", "NA"]), &PassConfig::new("c"), 0);
        assert!(matches!(result, Err(CanonizeError::Validation(_))));
    }

    #[test]
    fn test_missing_cells_pass_through() {
        let input = column(&["Boston", "", "boston", "NA"]);
        let result = Normalizer::new()
            .run_pass(&input, &PassConfig::new("city"), 0)
            .unwrap();
        assert_eq!(result.column, column(&["Boston", "", "Boston", "NA"]));
        assert_eq!(result.report.changed_cells(), 1);
    }

    #[test]
    fn test_missing_provider_rejected_before_work() {
        let config = PassConfig::new("city").with_similarity(SimilarityMethod::reasoning());
        let result = Normalizer::new().run_pass(&column(&["a", "b"]), &config, 0);
        assert!(matches!(result, Err(CanonizeError::Configuration(_))));
    }

    #[test]
    fn test_run_passes_chains_and_appends() {
        let mock = Arc::new(MockProvider::new().with_alias("NYC", "New York"));
        let normalizer = Normalizer::new().with_reasoning_provider(mock.clone());
        let passes = vec![
            PassConfig::new("city"),
            PassConfig::new("city").with_similarity(SimilarityMethod::reasoning()),
        ];
        let mut history = PassHistory::new();
        let out = normalizer
            .run_passes(
                &column(&["New York", "new york", "NYC", "NYC"]),
                &passes,
                &mut history,
            )
            .unwrap();

        assert_eq!(out, column(&["New York", "New York", "New York", "New York"]));
        assert_eq!(history.len(), 2);
        assert_eq!(history.reports()[1].pass_index(), 1);
        assert_eq!(history.reports()[1].unique_before(), 2);
    }

    #[test]
    fn test_report_names_providers_and_models() {
        let mock = Arc::new(MockProvider::new());
        let normalizer = Normalizer::new()
            .with_embedding_provider(mock.clone())
            .with_reasoning_provider(mock);
        let config = PassConfig::new("city")
            .with_similarity(SimilarityMethod::Embedding { model: None })
            .with_canonical(CanonicalMethod::Llm {
                model: Some("picker".to_string()),
            });
        let result = normalizer
            .run_pass(&column(&["Boston", "boston", "Chicago"]), &config, 0)
            .unwrap();

        let providers = result.report.providers();
        assert_eq!(providers.len(), 2);
        assert_eq!(providers[0].stage, PassStage::Similarity);
        assert_eq!(providers[0].provider, "mock");
        assert_eq!(providers[0].model, "mock-embedder");
        assert_eq!(providers[1].stage, PassStage::Canonical);
        assert_eq!(providers[1].model, "picker");
    }

    #[test]
    fn test_character_pass_uses_no_provider() {
        let result = Normalizer::new()
            .run_pass(&column(&["a", "A", "b"]), &PassConfig::new("c"), 0)
            .unwrap();
        assert!(result.report.providers().is_empty());
        assert!(result.report.preference_search().is_empty());
    }

    #[test]
    fn test_preference_search_needs_reasoning_provider() {
        let config = PassConfig::new("city")
            .with_clustering(ClusteringMethod::affinity_search(PreferenceSearch::default()));
        let result = Normalizer::new().run_pass(&column(&["a", "b"]), &config, 0);
        assert!(matches!(result, Err(CanonizeError::Configuration(_))));
    }

    #[test]
    fn test_preference_search_rounds_in_report() {
        let mock = Arc::new(MockProvider::new().with_evaluations(vec![
            ClusterEvaluation {
                is_satisfactory: false,
                issues: vec!["Boston split".to_string()],
                suggested_preference: -0.7,
                reasoning: "too many clusters".to_string(),
            },
            ClusterEvaluation {
                is_satisfactory: true,
                issues: Vec::new(),
                suggested_preference: -0.7,
                reasoning: String::new(),
            },
        ]));
        let normalizer = Normalizer::new().with_reasoning_provider(mock.clone());
        let config = PassConfig::new("city")
            .with_clustering(ClusteringMethod::affinity_search(PreferenceSearch::default()));
        let input = column(&["Boston", "boston", "BOSTON", "Chicago", "chicago"]);
        let result = normalizer.run_pass(&input, &config, 0).unwrap();

        let rounds = result.report.preference_search();
        assert_eq!(rounds.len(), 2);
        assert!(!rounds[0].satisfactory);
        assert_eq!(rounds[1].preference, -0.7);
        assert_eq!(mock.evaluate_calls(), 2);
        assert_eq!(mock.score_calls(), 0);

        let providers = result.report.providers();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].stage, PassStage::Cluster);
        assert_eq!(providers[0].model, "mock-reasoner");
    }
}
