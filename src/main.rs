//! trpo: trust-region policy optimization for continuous control
//!
//! - `train`     -- Run independent training sessions
//! - `evaluate`  -- Score a checkpointed policy with deterministic actions

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use trpo::{
    config::{EnvKind, TrpoConfig},
    session::{evaluate_checkpoint, run_sessions, RunOptions},
};

type Backend = Autodiff<NdArray>;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// Trust-region policy optimization on continuous-control tasks
#[derive(Parser)]
#[command(name = "trpo", version, about)]
struct Cli {
    /// Path to a JSON configuration file (uses defaults if not provided).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Which environment to use (overrides the config file).
    #[arg(long, global = true)]
    env: Option<EnvChoice>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum EnvChoice {
    Pendulum,
    Lqr,
}

impl From<EnvChoice> for EnvKind {
    fn from(choice: EnvChoice) -> Self {
        match choice {
            EnvChoice::Pendulum => EnvKind::Pendulum,
            EnvChoice::Lqr => EnvKind::Lqr,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Train one or more independent sessions.
    Train {
        /// Number of sessions.
        #[arg(long)]
        sessions: Option<usize>,

        /// Iterations per session.
        #[arg(long)]
        iterations: Option<usize>,

        /// Directory for per-iteration diagnostics (JSON lines).
        #[arg(long)]
        logdir: Option<PathBuf>,

        /// Directory for checkpoints.
        #[arg(long, default_value = "save_model")]
        checkpoint_dir: PathBuf,

        /// Checkpoint to resume every session from.
        #[arg(long)]
        load_model: Option<PathBuf>,

        /// Record diagnostics every N iterations.
        #[arg(long)]
        plot_freq: Option<usize>,
    },

    /// Run a checkpointed policy deterministically and report its score.
    Evaluate {
        /// Checkpoint file written by `train`.
        checkpoint: PathBuf,

        /// Number of episodes.
        #[arg(long)]
        episodes: Option<usize>,
    },
}

// ---------------------------------------------------------------------------
// Entrypoint
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // Initialise tracing (reads RUST_LOG env var, defaults to info).
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => TrpoConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => TrpoConfig::default(),
    };
    if let Some(env) = cli.env {
        config.run.env = env.into();
    }

    let device = NdArrayDevice::default();

    match cli.command {
        Commands::Train {
            sessions,
            iterations,
            logdir,
            checkpoint_dir,
            load_model,
            plot_freq,
        } => {
            if let Some(sessions) = sessions {
                config.run.sessions = sessions;
            }
            if let Some(iterations) = iterations {
                config.run.iterations = iterations;
            }
            if let Some(plot_freq) = plot_freq {
                config.run.plot_freq = plot_freq;
            }
            let options = RunOptions {
                logdir,
                checkpoint_dir: Some(checkpoint_dir),
                load_model,
            };
            cmd_train(&config, &options, &device)
        }
        Commands::Evaluate { checkpoint, episodes } => {
            let episodes = episodes.unwrap_or(config.run.eval_episodes);
            cmd_evaluate(&config, &checkpoint, episodes, &device)
        }
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_train(config: &TrpoConfig, options: &RunOptions, device: &NdArrayDevice) -> Result<()> {
    tracing::info!(
        env = config.run.env.name(),
        sessions = config.run.sessions,
        iterations = config.run.iterations,
        "Starting training"
    );

    let summaries = run_sessions::<Backend>(config, options, device)?;
    for summary in &summaries {
        println!(
            "session {:>2}: {} iterations, {} accepted, last score {:.3}, best score {:.3}",
            summary.session,
            summary.iterations,
            summary.accepted_updates,
            summary.last_score,
            summary.best_score
        );
    }
    Ok(())
}

fn cmd_evaluate(config: &TrpoConfig, checkpoint: &Path, episodes: usize, device: &NdArrayDevice) -> Result<()> {
    let scores = evaluate_checkpoint::<Backend>(config, checkpoint, episodes, device)
        .with_context(|| format!("Failed to evaluate {}", checkpoint.display()))?;
    let mean = if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f32>() / scores.len() as f32
    };
    println!("{} episodes, mean score {:.3}", scores.len(), mean);
    Ok(())
}
