//! Canonize CLI - categorical value normalization.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let result = match cli.command {
        Commands::Normalize {
            file,
            pipeline,
            pass,
            output,
            history,
            provider,
        } => commands::normalize::run(file, pipeline, pass, output, history, provider),

        Commands::Preview {
            file,
            pass,
            all,
            json,
            provider,
        } => commands::preview::run(file, pass, all, json, provider, cli.verbose),

        Commands::Similarity {
            file,
            column,
            similarity,
            min,
            top,
            context,
            provider,
        } => commands::similarity::run(file, column, similarity, min, top, context, provider),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
