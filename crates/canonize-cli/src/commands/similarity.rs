//! Similarity command - list the closest value pairs of a column.

use std::path::PathBuf;

use canonize::pipeline::ValueCounts;
use canonize::{ColumnStore, SimilarityMatrix, SimilarityMethod};
use colored::Colorize;

use super::{CommandResult, build_normalizer, read_table};
use crate::cli::ProviderArgs;

pub fn run(
    file: PathBuf,
    column: String,
    similarity: SimilarityMethod,
    min: f64,
    top: usize,
    context: Option<String>,
    provider: ProviderArgs,
) -> CommandResult {
    let table = read_table(&file)?;
    let values = ValueCounts::from_column(&table.get_column(&column)?);
    if values.len() < 2 {
        println!(
            "{} '{}' has {} distinct values; nothing to compare.",
            "Note:".yellow(),
            column,
            values.len()
        );
        return Ok(());
    }

    let normalizer = build_normalizer(&provider)?;
    let names = values.values();
    let matrix = normalizer.similarity_computer().compute(
        &names,
        &similarity,
        context.as_deref().unwrap_or_default(),
    )?;

    println!(
        "{} {} similarity for {} ({} distinct values)",
        "Computed".cyan().bold(),
        similarity,
        column.white().bold(),
        values.len()
    );
    println!();

    let pairs = closest_pairs(&matrix, min, top);
    if pairs.is_empty() {
        println!("No pairs at or above {:.2}.", min);
        return Ok(());
    }
    for (score, i, j) in pairs {
        println!(
            "  {:.3}  {:30} {}",
            score,
            format!("{:?}", names[i]),
            format!("{:?}", names[j])
        );
    }
    Ok(())
}

/// Pairs with score `>= min`, highest first; ties by lowest pair.
fn closest_pairs(matrix: &SimilarityMatrix, min: f64, top: usize) -> Vec<(f64, usize, usize)> {
    let n = matrix.len();
    let mut pairs: Vec<(f64, usize, usize)> = (0..n)
        .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
        .map(|(i, j)| (matrix.get(i, j), i, j))
        .filter(|(score, _, _)| *score >= min)
        .collect();
    pairs.sort_by(|a, b| b.0.total_cmp(&a.0).then((a.1, a.2).cmp(&(b.1, b.2))));
    pairs.truncate(top);
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closest_pairs_order() {
        let matrix = SimilarityMatrix::from_rows(vec![
            vec![1.0, 0.9, 0.2],
            vec![0.9, 1.0, 0.9],
            vec![0.2, 0.9, 1.0],
        ])
        .unwrap();

        assert_eq!(
            closest_pairs(&matrix, 0.5, 10),
            vec![(0.9, 0, 1), (0.9, 1, 2)]
        );
        assert_eq!(closest_pairs(&matrix, 0.0, 1), vec![(0.9, 0, 1)]);
    }
}
