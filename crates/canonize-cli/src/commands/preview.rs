//! Preview command - show the clusters of one pass without writing.

use std::path::PathBuf;

use canonize::{ClusterReport, ColumnStore};
use colored::Colorize;

use super::{CommandResult, build_normalizer, read_table};
use crate::cli::{PassArgs, ProviderArgs};

pub fn run(
    file: PathBuf,
    pass: PassArgs,
    all: bool,
    json_output: bool,
    provider: ProviderArgs,
    verbose: bool,
) -> CommandResult {
    let config = pass.to_config(&provider)?;
    let table = read_table(&file)?;
    let column = table.get_column(&config.column)?;

    let normalizer = build_normalizer(&provider)?;
    let result = normalizer.run_pass(&column, &config, 0)?;
    let report = &result.report;

    if json_output {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!(
        "{} {} in {}",
        "Preview of".cyan().bold(),
        config.column.white().bold(),
        file.display()
    );
    println!("Pass: {}", config.describe());
    if verbose {
        println!("Fingerprint: {}", report.fingerprint().dimmed());
    }
    for usage in report.providers() {
        println!("  {} stage: {} ({})", usage.stage, usage.provider, usage.model.dimmed());
    }
    println!();

    if let Some(reason) = report.skipped_reason() {
        println!("{} {}", "Nothing to cluster:".yellow(), reason);
        return Ok(());
    }

    let mut shown = 0;
    for cluster in report.clusters() {
        if cluster.members.len() > 1 || all {
            print_cluster(cluster);
            shown += 1;
        }
    }
    if shown == 0 {
        println!("{}", "No values would be merged.".green());
    }

    if let Some(convergence) = report.convergence() {
        println!();
        println!(
            "Affinity propagation: {} after {} iterations, {} exemplars",
            if convergence.converged {
                "converged".green()
            } else {
                "did not converge".yellow()
            },
            convergence.iterations,
            convergence.exemplars
        );
    }
    for round in report.preference_search() {
        let verdict = if round.satisfactory {
            "accepted".green()
        } else {
            "rejected".yellow()
        };
        println!(
            "  Round {}: preference {:.3} -> {} clusters, {}",
            round.round, round.preference, round.clusters, verdict
        );
        for issue in &round.issues {
            println!("    - {}", issue.dimmed());
        }
    }

    println!();
    println!(
        "{} -> {} unique values, {} cells would change",
        report.unique_before(),
        report.unique_after().to_string().white().bold(),
        report.changed_cells().to_string().white().bold()
    );
    if report.is_degraded() {
        println!(
            "{} {} clusters used a fallback; check them before applying",
            "Warning:".yellow().bold(),
            report.degraded_clusters().count()
        );
    }

    Ok(())
}

fn print_cluster(cluster: &ClusterReport) {
    let flags: Vec<String> = cluster.degraded.iter().map(|d| d.to_string()).collect();
    let suffix = if flags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", flags.join(", ")).yellow().to_string()
    };
    println!(
        "  {} {} ({} rows){}",
        format!("#{}", cluster.id).dimmed(),
        cluster.canonical.green().bold(),
        cluster.total_count(),
        suffix
    );
    for member in &cluster.members {
        let marker = if member.value == cluster.canonical {
            "="
        } else {
            "<-"
        };
        println!("      {:2} {:30} x{}", marker, format!("{:?}", member.value), member.count);
    }
}
