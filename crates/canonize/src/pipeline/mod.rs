//! Pass configuration, value bookkeeping, mappings and audit reports.

mod config;
mod mapping;
mod report;
mod values;

pub use config::{PassConfig, PipelineConfig};
pub use mapping::CanonicalMapping;
pub use report::{ClusterReport, MemberCount, PassHistory, PassReport, PassStage, ProviderUsage};
pub use values::ValueCounts;

pub(crate) use report::PassOutcome;
