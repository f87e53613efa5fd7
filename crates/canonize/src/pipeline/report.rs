//! Audit records of normalization passes.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::canonical::Degraded;
use crate::clustering::{Convergence, SearchRound};
use crate::error::{CanonizeError, Result};

use super::config::PassConfig;
use super::mapping::CanonicalMapping;
use super::values::ValueCounts;

/// Stages of a pass, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassStage {
    Init,
    Similarity,
    Cluster,
    Canonical,
    Mapping,
    Apply,
    Report,
    Done,
}

impl fmt::Display for PassStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PassStage::Init => "init",
            PassStage::Similarity => "similarity",
            PassStage::Cluster => "cluster",
            PassStage::Canonical => "canonical",
            PassStage::Mapping => "mapping",
            PassStage::Apply => "apply",
            PassStage::Report => "report",
            PassStage::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// A cluster member and how often it occurred in the column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberCount {
    pub value: String,
    pub count: usize,
}

/// One cluster of a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterReport {
    /// Dense cluster id, `0..k-1` by first appearance.
    pub id: usize,
    pub canonical: String,
    /// Members in first-appearance order.
    pub members: Vec<MemberCount>,
    /// Empty unless the result needs a second look.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<Degraded>,
}

impl ClusterReport {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    /// Total occurrences of all members.
    pub fn total_count(&self) -> usize {
        self.members.iter().map(|m| m.count).sum()
    }
}

/// Which external provider and model a stage used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUsage {
    pub stage: PassStage,
    /// Provider name, e.g. `openai`.
    pub provider: String,
    /// Effective model: the pass's override, else the provider's default.
    pub model: String,
}

/// Immutable record of one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassReport {
    pass_index: usize,
    column: String,
    config: PassConfig,
    unique_before: usize,
    unique_after: usize,
    changed_cells: usize,
    mapping: CanonicalMapping,
    clusters: Vec<ClusterReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    convergence: Option<Convergence>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    preference_search: Vec<SearchRound>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    providers: Vec<ProviderUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    skipped_reason: Option<String>,
    fingerprint: String,
    created_at: DateTime<Utc>,
}

/// Everything a pass produced, turned into a [`PassReport`] at the end.
pub(crate) struct PassOutcome {
    pub pass_index: usize,
    pub config: PassConfig,
    pub values: ValueCounts,
    pub changed_cells: usize,
    pub mapping: CanonicalMapping,
    pub clusters: Vec<ClusterReport>,
    pub convergence: Option<Convergence>,
    pub preference_search: Vec<SearchRound>,
    pub providers: Vec<ProviderUsage>,
    pub skipped_reason: Option<String>,
}

impl PassReport {
    pub(crate) fn new(outcome: PassOutcome) -> Result<Self> {
        let fingerprint = fingerprint(&outcome.config, &outcome.providers, &outcome.values)?;
        Ok(Self {
            pass_index: outcome.pass_index,
            column: outcome.config.column.clone(),
            unique_before: outcome.values.len(),
            unique_after: outcome.mapping.canonical_count(),
            config: outcome.config,
            changed_cells: outcome.changed_cells,
            mapping: outcome.mapping,
            clusters: outcome.clusters,
            convergence: outcome.convergence,
            preference_search: outcome.preference_search,
            providers: outcome.providers,
            skipped_reason: outcome.skipped_reason,
            fingerprint,
            created_at: Utc::now(),
        })
    }

    /// Position of the pass in its history, starting at 0.
    pub fn pass_index(&self) -> usize {
        self.pass_index
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    /// Full configuration the pass ran with.
    pub fn config(&self) -> &PassConfig {
        &self.config
    }

    /// Distinct non-missing values before the pass.
    pub fn unique_before(&self) -> usize {
        self.unique_before
    }

    /// Distinct non-missing values after the pass.
    pub fn unique_after(&self) -> usize {
        self.unique_after
    }

    /// Cells whose value was rewritten.
    pub fn changed_cells(&self) -> usize {
        self.changed_cells
    }

    pub fn mapping(&self) -> &CanonicalMapping {
        &self.mapping
    }

    pub fn clusters(&self) -> &[ClusterReport] {
        &self.clusters
    }

    /// Clusters with more than one member.
    pub fn merged_clusters(&self) -> impl Iterator<Item = &ClusterReport> {
        self.clusters.iter().filter(|c| c.members.len() > 1)
    }

    /// Affinity propagation convergence record.
    pub fn convergence(&self) -> Option<&Convergence> {
        self.convergence.as_ref()
    }

    /// Reviewed affinity propagation rounds, empty without a preference
    /// search.
    pub fn preference_search(&self) -> &[SearchRound] {
        &self.preference_search
    }

    /// Providers the pass called, one entry per stage that used one.
    pub fn providers(&self) -> &[ProviderUsage] {
        &self.providers
    }

    /// Why the pass did not run its strategies, if it short-circuited.
    pub fn skipped_reason(&self) -> Option<&str> {
        self.skipped_reason.as_deref()
    }

    /// `sha256:` digest of the configuration, the providers used and the
    /// input value counts.
    ///
    /// Two passes with the same fingerprint saw the same input under the
    /// same configuration and models.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// True if any cluster is flagged degraded.
    pub fn is_degraded(&self) -> bool {
        self.clusters.iter().any(ClusterReport::is_degraded)
    }

    /// Clusters flagged degraded.
    pub fn degraded_clusters(&self) -> impl Iterator<Item = &ClusterReport> {
        self.clusters.iter().filter(|c| c.is_degraded())
    }
}

/// Digest of the configuration, provider usage and the ordered value counts.
fn fingerprint(
    config: &PassConfig,
    providers: &[ProviderUsage],
    values: &ValueCounts,
) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(config)?);
    hasher.update(serde_json::to_vec(providers)?);
    for (value, count) in values.iter() {
        hasher.update(value.as_bytes());
        hasher.update(b"\t");
        hasher.update(count.to_string().as_bytes());
        hasher.update(b"\n");
    }
    Ok(format!("sha256:{:x}", hasher.finalize()))
}

/// Append-only sequence of pass reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PassHistory {
    reports: Vec<PassReport>,
}

impl PassHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a report.
    pub fn push(&mut self, report: PassReport) {
        self.reports.push(report);
    }

    /// All reports in pass order.
    pub fn reports(&self) -> &[PassReport] {
        &self.reports
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn last(&self) -> Option<&PassReport> {
        self.reports.last()
    }

    /// Cells changed across all passes.
    pub fn total_changed_cells(&self) -> usize {
        self.reports.iter().map(PassReport::changed_cells).sum()
    }

    /// Save the history as pretty JSON, creating parent directories.
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

    /// Load a history saved with [`PassHistory::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| CanonizeError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn report(pass_index: usize, degraded: Vec<Degraded>) -> PassReport {
        report_with_providers(pass_index, degraded, Vec::new())
    }

    fn report_with_providers(
        pass_index: usize,
        degraded: Vec<Degraded>,
        providers: Vec<ProviderUsage>,
    ) -> PassReport {
        let column: Vec<String> = ["a", "A", "b"].iter().map(|s| s.to_string()).collect();
        PassReport::new(PassOutcome {
            pass_index,
            config: PassConfig::new("letters"),
            values: ValueCounts::from_column(&column),
            changed_cells: 1,
            mapping: CanonicalMapping::from_pairs(vec![
                ("a".to_string(), "a".to_string()),
                ("A".to_string(), "a".to_string()),
                ("b".to_string(), "b".to_string()),
            ]),
            clusters: vec![
                ClusterReport {
                    id: 0,
                    canonical: "a".to_string(),
                    members: vec![
                        MemberCount {
                            value: "a".to_string(),
                            count: 1,
                        },
                        MemberCount {
                            value: "A".to_string(),
                            count: 1,
                        },
                    ],
                    degraded,
                },
                ClusterReport {
                    id: 1,
                    canonical: "b".to_string(),
                    members: vec![MemberCount {
                        value: "b".to_string(),
                        count: 1,
                    }],
                    degraded: Vec::new(),
                },
            ],
            convergence: None,
            preference_search: Vec::new(),
            providers,
            skipped_reason: None,
        })
        .unwrap()
    }

    fn usage(stage: PassStage, model: &str) -> ProviderUsage {
        ProviderUsage {
            stage,
            provider: "openai".to_string(),
            model: model.to_string(),
        }
    }

    #[test]
    fn test_report_counts() {
        let r = report(0, Vec::new());
        assert_eq!(r.column(), "letters");
        assert_eq!(r.unique_before(), 3);
        assert_eq!(r.unique_after(), 2);
        assert_eq!(r.merged_clusters().count(), 1);
        assert!(!r.is_degraded());
        assert!(r.fingerprint().starts_with("sha256:"));
    }

    #[test]
    fn test_fingerprint_ignores_time() {
        assert_eq!(
            report(0, Vec::new()).fingerprint(),
            report(1, Vec::new()).fingerprint()
        );
    }

    #[test]
    fn test_fingerprint_covers_models() {
        let mini = report_with_providers(0, Vec::new(), vec![usage(PassStage::Canonical, "mini")]);
        let full = report_with_providers(0, Vec::new(), vec![usage(PassStage::Canonical, "full")]);
        assert_ne!(mini.fingerprint(), full.fingerprint());
        assert_eq!(mini.providers()[0].model, "mini");
        assert!(report(0, Vec::new()).providers().is_empty());
    }

    #[test]
    fn test_degraded_flags() {
        let r = report(0, vec![Degraded::IndexOutOfRange]);
        assert!(r.is_degraded());
        assert_eq!(r.degraded_clusters().count(), 1);
    }

    #[test]
    fn test_history_is_append_only() {
        let mut history = PassHistory::new();
        history.push(report(0, Vec::new()));
        history.push(report(1, Vec::new()));
        assert_eq!(history.len(), 2);
        assert_eq!(history.reports()[1].pass_index(), 1);
        assert_eq!(history.total_changed_cells(), 2);
    }

    #[test]
    fn test_history_save_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        let mut history = PassHistory::new();
        history.push(report(0, vec![Degraded::NotConverged]));
        history.push(report_with_providers(
            1,
            Vec::new(),
            vec![usage(PassStage::Similarity, "text-embedding-3-small")],
        ));
        history.save(&path).unwrap();
        assert_eq!(PassHistory::load(&path).unwrap(), history);
    }
}
