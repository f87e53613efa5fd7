//! Choosing the canonical form of a cluster.

use std::fmt;
use std::str::FromStr;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{CanonizeError, Result};
use crate::llm::ReasoningProvider;

/// How the canonical form of a multi-member cluster is chosen.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum CanonicalMethod {
    /// Most frequent member; ties keep the first-encountered member.
    #[default]
    Frequency,

    /// Ask a reasoning provider to pick the most standard member.
    Llm {
        /// Chat model override.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
}

impl CanonicalMethod {
    /// Method name, as used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            CanonicalMethod::Frequency => "frequency",
            CanonicalMethod::Llm { .. } => "llm",
        }
    }

    /// True if selection needs a reasoning provider.
    pub fn requires_reasoning(&self) -> bool {
        matches!(self, CanonicalMethod::Llm { .. })
    }
}

impl FromStr for CanonicalMethod {
    type Err = CanonizeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "frequency" | "most_frequent" | "most-frequent" => Ok(CanonicalMethod::Frequency),
            "llm" | "llm_selection" | "reasoning" => Ok(CanonicalMethod::Llm { model: None }),
            _ => Err(CanonizeError::Configuration(format!(
                "Unknown canonical method: {}. Use: frequency or llm.",
                s
            ))),
        }
    }
}

impl fmt::Display for CanonicalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Why a cluster's result should be double-checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Degraded {
    /// The provider chose an index outside the candidate list.
    IndexOutOfRange,
    /// The provider answer held no usable index.
    UnparseableResponse,
    /// Affinity propagation did not converge.
    NotConverged,
    /// Affinity propagation found no exemplars; the cluster is a fallback
    /// singleton.
    NoExemplars,
}

impl fmt::Display for Degraded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degraded::IndexOutOfRange => write!(f, "canonical index out of range"),
            Degraded::UnparseableResponse => write!(f, "unparseable canonical response"),
            Degraded::NotConverged => write!(f, "clustering did not converge"),
            Degraded::NoExemplars => write!(f, "clustering found no exemplars"),
        }
    }
}

/// The canonical form chosen for one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub value: String,
    pub degraded: Option<Degraded>,
}

impl Selection {
    fn exact(value: &str) -> Self {
        Self {
            value: value.to_string(),
            degraded: None,
        }
    }
}

/// Pick the canonical member of a cluster.
///
/// `members` are in first-appearance order and `counts` are aligned with
/// them. Single-member clusters never reach a strategy.
pub fn select(
    members: &[String],
    counts: &[usize],
    method: &CanonicalMethod,
    context: &str,
    provider: Option<&dyn ReasoningProvider>,
) -> Result<Selection> {
    let first = members.first().ok_or_else(|| {
        CanonizeError::Validation("Cannot select a canonical form of an empty cluster".to_string())
    })?;
    if members.len() == 1 {
        return Ok(Selection::exact(first));
    }

    match method {
        CanonicalMethod::Frequency => Ok(Selection::exact(most_frequent(members, counts))),
        CanonicalMethod::Llm { model } => {
            let provider = provider.ok_or_else(|| {
                CanonizeError::Configuration(
                    "LLM canonical selection requires a reasoning provider".to_string(),
                )
            })?;
            select_with_llm(members, context, provider, model.as_deref())
        }
    }
}

/// Member with the highest count, first-encountered on ties.
pub fn most_frequent<'a>(members: &'a [String], counts: &[usize]) -> &'a str {
    let mut best = 0;
    for i in 1..members.len() {
        if counts.get(i).copied().unwrap_or(0) > counts.get(best).copied().unwrap_or(0) {
            best = i;
        }
    }
    &members[best]
}

fn select_with_llm(
    members: &[String],
    context: &str,
    provider: &dyn ReasoningProvider,
    model: Option<&str>,
) -> Result<Selection> {
    let fallback = |degraded: Degraded| Selection {
        value: members[0].clone(),
        degraded: Some(degraded),
    };

    match provider.select_canonical(members, context, model) {
        Ok(index) if index >= 1 && (index as usize) <= members.len() => {
            Ok(Selection::exact(&members[index as usize - 1]))
        }
        Ok(index) => {
            warn!(
                "{} chose canonical index {} for {} candidates; keeping '{}'",
                provider.name(),
                index,
                members.len(),
                members[0]
            );
            Ok(fallback(Degraded::IndexOutOfRange))
        }
        Err(e) if e.is_malformed_response() => {
            warn!("Unusable canonical answer ({}); keeping '{}'", e, members[0]);
            Ok(fallback(Degraded::UnparseableResponse))
        }
        Err(e) => Err(e),
    }
}
