#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use divcon_common::logging::{init_logging, spawn_progress_writer};
use divcon_common::{Config, Validate};
use divcon_core::{load_opinions, load_results, ResultWriter, StageCoordinator, SummaryReport};
use divcon_oracle::LlmOracle;
use tracing::info;

/// `divcon` - map the axes of disagreement in a collection of opinions.
#[derive(Parser, Debug)]
#[command(name = "divcon")]
#[command(version)]
#[command(about = "Discover topics and axes of disagreement in public opinions.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full pipeline and write every result file
    Run {
        /// Opinions CSV (needs `id` and `comment` columns)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Config file (default: ./divcon.json when present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Seed for reproducible sampling
        #[arg(long)]
        seed: Option<u64>,

        /// Concurrent workers per stage
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Print the statistics summary of a previous run (no oracle calls)
    Summary {
        /// Output directory of the run
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Opinions CSV used for the run, for the opinion count
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Config file (default: ./divcon.json when present)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the effective configuration and check it
    Config {
        /// Config file (default: ./divcon.json when present)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input,
            output,
            config,
            seed,
            workers,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(input) = input {
                config.input.opinions_path = input;
            }
            if let Some(output) = output {
                config.output.dir = output;
            }
            if seed.is_some() {
                config.pipeline.seed = seed;
            }
            if let Some(workers) = workers {
                config.pipeline.workers = workers;
            }
            run(config).await
        }
        Commands::Summary {
            output,
            input,
            config,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(output) = output {
                config.output.dir = output;
            }
            if let Some(input) = input {
                config.input.opinions_path = input;
            }
            summary(&config)
        }
        Commands::Config { config } => show_config(config.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    Config::load_with_env(path).context("Failed to load configuration")
}

async fn run(config: Config) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );
    info!("DivCon v{}", env!("CARGO_PKG_VERSION"));

    let oracle = LlmOracle::from_config(&config.oracle).context("Failed to set up the oracle")?;

    let opinions = load_opinions(&config.input.opinions_path).with_context(|| {
        format!(
            "Failed to load opinions from {}",
            config.input.opinions_path.display()
        )
    })?;
    info!(
        opinions = opinions.len(),
        path = %config.input.opinions_path.display(),
        "Loaded opinions"
    );

    let (sink, writer) = spawn_progress_writer();
    let mut coordinator =
        StageCoordinator::new(Arc::new(oracle), config.pipeline.clone()).with_progress(sink);
    let run_id = coordinator.run_id().to_string();

    let outcome = coordinator.run(opinions).await;
    // The coordinator holds the last sink; the writer drains once it is gone.
    drop(coordinator);
    writer.finish().await;

    let run = outcome.with_context(|| format!("Analysis run {run_id} failed"))?;

    let summary = SummaryReport::from_run(&run).render();
    let result_writer = ResultWriter::new(&config.output.dir);
    let written = result_writer
        .write_run(&run, &summary)
        .context("Failed to write results")?;

    info!(
        run_id = %run.run_id,
        elapsed_secs = run.elapsed.as_secs_f64(),
        files = written.len(),
        dir = %result_writer.dir().display(),
        "Results written"
    );

    println!("{summary}");
    Ok(())
}

fn summary(config: &Config) -> Result<()> {
    let dir = &config.output.dir;
    let saved =
        load_results(dir).with_context(|| format!("Failed to load results from {}", dir.display()))?;

    // The opinion count comes from the input when it is still around.
    let opinion_count = match load_opinions(&config.input.opinions_path) {
        Ok(opinions) => opinions.len(),
        Err(_) => saved
            .scores
            .iter()
            .map(|s| s.opinion_id.as_str())
            .collect::<HashSet<_>>()
            .len(),
    };

    let report = SummaryReport::new(opinion_count, &saved.topics, &saved.axes, &saved.scores);
    println!("{report}");
    Ok(())
}

fn show_config(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;

    let json = serde_json::to_string_pretty(&config.redacted())
        .context("Failed to serialize configuration")?;
    println!("{json}");
    println!();

    match config.validate() {
        Ok(()) => println!("Configuration is valid."),
        Err(e) => {
            println!("Configuration has problems:");
            for error in e.into_vec() {
                println!("  - {error}");
            }
        }
    }
    if let Err(e) = config.oracle.require_api_key() {
        println!("  - {e}");
    }

    Ok(())
}
