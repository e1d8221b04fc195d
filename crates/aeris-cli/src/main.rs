//! Command-line entry point for Aeris channel simulations.

mod config;
mod runner;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "aeris-cli")]
#[command(about = "Aeris: split-step simulator for optical links through turbulence")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trial loop described by a job file
    Run {
        /// Path to the TOML job file
        config: PathBuf,

        /// Output directory (overrides the job file)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Restore saved records before running more trials
        #[arg(long)]
        resume: bool,
    },
    /// Check a job file without running any trials
    Validate {
        /// Path to the TOML job file
        config: PathBuf,
    },
    /// Print closed-form link statistics for a job file
    Theory {
        /// Path to the TOML job file
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            output,
            resume,
        } => {
            println!("Aeris Channel Simulator");
            println!("=======================");
            let job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());
            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));
            let outcome = runner::run_simulation(&job, &out_dir, resume)?;
            println!("Results: {}", outcome.results_path.display());
            println!("Simulation complete.");
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            runner::build_simulation(&job)?;
            println!("Configuration is valid: {}", config.display());
        }
        Commands::Theory { config } => {
            let job = config::load_config(&config)?;
            runner::print_theory(&job)?;
        }
    }

    Ok(())
}
