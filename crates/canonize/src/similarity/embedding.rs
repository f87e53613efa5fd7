//! Embedding-based similarity: cosine over provider vectors.

use log::debug;

use crate::error::{CanonizeError, Result};
use crate::llm::EmbeddingProvider;

use super::SimilarityMatrix;

/// Embed every value in one request and compare the vectors pairwise.
///
/// Vectors are normalized locally, so providers that already return unit
/// vectors and ones that don't give the same matrix. Negative cosines clip to
/// `0.0`, zero vectors are dissimilar to everything.
pub fn embedding_similarity(
    values: &[String],
    provider: &dyn EmbeddingProvider,
    model: Option<&str>,
) -> Result<SimilarityMatrix> {
    debug!(
        "Embedding {} values with {} (model: {})",
        values.len(),
        provider.name(),
        model.unwrap_or("default")
    );
    let vectors = provider.embed(values, model)?;
    let unit = normalize_vectors(provider.name(), values.len(), vectors)?;

    Ok(SimilarityMatrix::from_pairs(values.len(), |i, j| {
        match (&unit[i], &unit[j]) {
            (Some(a), Some(b)) => dot(a, b),
            _ => 0.0,
        }
    }))
}

/// Validate the provider answer and scale every vector to unit length.
///
/// Zero vectors come back as `None`.
fn normalize_vectors(
    provider: &str,
    expected: usize,
    vectors: Vec<Vec<f64>>,
) -> Result<Vec<Option<Vec<f64>>>> {
    if vectors.len() != expected {
        return Err(CanonizeError::malformed(
            provider,
            format!(
                "Expected {} embedding vectors, received {}",
                expected,
                vectors.len()
            ),
        ));
    }

    let dimension = vectors.first().map(Vec::len).unwrap_or(0);
    if expected > 0 && dimension == 0 {
        return Err(CanonizeError::malformed(provider, "Embedding vectors are empty"));
    }

    vectors
        .into_iter()
        .enumerate()
        .map(|(i, vector)| {
            if vector.len() != dimension {
                return Err(CanonizeError::malformed(
                    provider,
                    format!(
                        "Embedding {} has dimension {}, expected {}",
                        i,
                        vector.len(),
                        dimension
                    ),
                ));
            }
            if vector.iter().any(|x| !x.is_finite()) {
                return Err(CanonizeError::malformed(
                    provider,
                    format!("Embedding {} contains non-finite values", i),
                ));
            }

            let norm = dot(&vector, &vector).sqrt();
            if norm == 0.0 {
                Ok(None)
            } else {
                Ok(Some(vector.into_iter().map(|x| x / norm).collect()))
            }
        })
        .collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
