//! Normalize command - run passes and write the cleaned table.

use std::path::{Path, PathBuf};

use canonize::{PassHistory, PassReport, PipelineConfig, write_table};
use colored::Colorize;
use log::debug;

use super::{CommandResult, build_normalizer, read_table};
use crate::cli::{PassArgs, ProviderArgs};

pub fn run(
    file: PathBuf,
    pipeline: Option<PathBuf>,
    pass: PassArgs,
    output: Option<PathBuf>,
    history: Option<PathBuf>,
    provider: ProviderArgs,
) -> CommandResult {
    let pipeline = match pipeline {
        Some(path) => PipelineConfig::load(&path)?,
        None => PipelineConfig::new(vec![pass.to_config(&provider)?]),
    };

    let mut table = read_table(&file)?;
    let normalizer = build_normalizer(&provider)?;

    println!(
        "{} {} ({} passes)",
        "Normalizing".cyan().bold(),
        file.display().to_string().white(),
        pipeline.passes.len()
    );

    // Earlier runs on the same file keep their reports; new ones append.
    let history_path = history.unwrap_or_else(|| sibling(&file, "history.json"));
    let mut history = if history_path.exists() {
        debug!("Appending to history at {}", history_path.display());
        PassHistory::load(&history_path)?
    } else {
        PassHistory::new()
    };
    let first_new = history.len();

    normalizer.normalize_column(&mut table, &pipeline, &mut history)?;

    println!();
    for report in &history.reports()[first_new..] {
        print_pass(report);
    }

    let ext = if table.delimiter == b'\t' { "tsv" } else { "csv" };
    let output_path = output.unwrap_or_else(|| sibling(&file, &format!("canonized.{}", ext)));
    write_table(&table, &output_path)?;
    history.save(&history_path)?;

    println!();
    println!(
        "{} {}",
        "Saved to".green().bold(),
        output_path.display().to_string().white()
    );
    println!(
        "{} {}",
        "History".green().bold(),
        history_path.display().to_string().white()
    );

    Ok(())
}

fn print_pass(report: &PassReport) {
    let status = if report.is_degraded() {
        "degraded".yellow()
    } else {
        "ok".green()
    };
    println!(
        "  Pass {} {:16} {:40} {} -> {} values, {} cells changed [{}]",
        report.pass_index(),
        report.column(),
        report.config().describe(),
        report.unique_before(),
        report.unique_after().to_string().white().bold(),
        report.changed_cells(),
        status
    );
    if let Some(reason) = report.skipped_reason() {
        println!("         {}", reason.dimmed());
    }
}

/// `data/survey.csv` + `history.json` -> `data/survey.history.json`.
fn sibling(file: &Path, suffix: &str) -> PathBuf {
    let stem = file.file_stem().unwrap_or_default().to_string_lossy();
    file.with_file_name(format!("{}.{}", stem, suffix))
}
