//! Prompt templates for LLM interactions.

use super::provider::{ClusterReview, ReasoningMode, ValuePair};

/// Shared system prompt for every reasoning request.
pub fn system_prompt() -> &'static str {
    "You are a data cleaning assistant. You compare categorical values from a \
     tabular dataset and decide which ones denote the same real-world entity. \
     Always answer with JSON only, exactly in the requested shape."
}

/// Build the instructions for scoring a batch of pairs.
pub fn pair_scoring_prompt(mode: ReasoningMode, context: &str) -> String {
    let context = if context.trim().is_empty() {
        "No additional context provided."
    } else {
        context.trim()
    };

    let rubric = match mode {
        ReasoningMode::Strict => {
            r#"For each pair (a vs b): do these two values represent the same quantity or entity?

Similarity scoring:
- 1.0 = Same quantity or entity (different format or unit allowed)
- 0.0 = Different

Convert to a common base unit if needed, then compare."#
        }
        ReasoningMode::Graded => {
            r#"Score the similarity of each pair (a vs b).

Scoring:
- 1.0 = Definitely same entity
- 0.8-0.9 = Very likely same
- 0.5-0.7 = Possibly related
- 0.1-0.4 = Weak relation
- 0.0 = Definitely different

Be precise: scoring different entities too high is worse than scoring the same entity too low."#
        }
    };

    format!(
        r#"{rubric}

## Context
{context}

## Task
Return one score for every pair, using the pair index exactly as given.

Respond with a JSON object:
{{
  "scores": [{{"index": 0, "similarity": 0.0-1.0}}, ...]
}}"#
    )
}

/// Serialize a batch of pairs as the user message.
pub fn pairs_payload(pairs: &[ValuePair]) -> String {
    serde_json::to_string(pairs).unwrap_or_else(|_| "[]".to_string())
}

/// Build the instructions for choosing a canonical form.
pub fn canonical_selection_prompt(context: &str) -> String {
    let context = if context.trim().is_empty() {
        "No additional context provided."
    } else {
        context.trim()
    };

    format!(
        r#"The numbered values below all refer to the same entity.
Select the best canonical name from the list and return its number.

Consider: correct spelling, completeness, readability, standard format, proper casing.
Prefer full names over abbreviations.

## Context
{context}

Respond with a JSON object:
{{
  "index": <number of the selected value, starting at 1>
}}"#
    )
}

/// Number candidates starting at 1, one per line.
pub fn numbered_candidates(candidates: &[String]) -> String {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {}", i + 1, c))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the instructions for judging an affinity propagation result.
pub fn cluster_evaluation_prompt(context: &str) -> String {
    let context = if context.trim().is_empty() {
        "No additional context provided."
    } else {
        context.trim()
    };

    format!(
        r#"The values of a column were clustered with affinity propagation. Values in
one cluster will be replaced by a single canonical form.

Check whether:
1. Each cluster only holds values that denote the same entity
2. Values that denote the same entity share a cluster
3. The number of clusters makes sense for the data

Preference rules:
- The preference ranges from -1.0 to 0.0
- More negative gives fewer, larger clusters
- Less negative gives more, smaller clusters

## Context
{context}

Respond with a JSON object:
{{
  "is_satisfactory": true or false,
  "issues": ["<problem>", ...],
  "suggested_preference": <number between -1.0 and 0.0>,
  "reasoning": "<short explanation>"
}}"#
    )
}

/// Describe the clusters, current preference and similarity spread of a
/// review as the user message.
pub fn cluster_review_payload(review: &ClusterReview<'_>) -> String {
    let mut lines: Vec<String> = review
        .clusters
        .iter()
        .enumerate()
        .map(|(i, members)| {
            let quoted: Vec<String> = members.iter().map(|m| format!("{:?}", m)).collect();
            format!("Cluster {}: [{}]", i + 1, quoted.join(", "))
        })
        .collect();
    lines.push(String::new());
    lines.push(format!("Current preference: {:.3}", review.preference));
    lines.push(format!(
        "Similarity range: {:.3} to {:.3} (median {:.3})",
        review.stats.min, review.stats.max, review.stats.median
    ));
    lines.join("\n")
}
