//! TJK Prophet CLI
//!
//! Train, predict and walk-forward evaluation for race programs.

mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tjk_prophet=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            program,
            workouts,
            val_date,
            artifact,
            meta_out,
        } => cli::run_train(program, workouts, val_date, artifact, meta_out),
        Commands::Predict {
            program,
            workouts,
            artifact,
            out,
        } => cli::run_predict(program, workouts, artifact, out),
        Commands::Backtest {
            program,
            workouts,
            splits,
        } => cli::run_backtest(program, workouts, splits),
    }
}
