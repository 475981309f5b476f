//! raya-weave
//!
//! Offline driver for the metrics weaver: rewrites a tree of class units
//! according to a weaving configuration, and disassembles units for
//! inspection.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "raya-weave")]
#[command(about = "Metrics weaving for Raya class units", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Weave class units according to a metrics configuration
    Weave {
        /// Weaving configuration (TOML)
        #[arg(short, long)]
        config: PathBuf,
        /// Directories holding class units; searched for supertypes too
        #[arg(long = "classpath", required = true)]
        classpath: Vec<PathBuf>,
        /// Output directory for rewritten units
        #[arg(short, long, default_value = "woven")]
        out: PathBuf,
        /// Worker threads (defaults to the number of CPUs)
        #[arg(short, long)]
        jobs: Option<usize>,
        /// Units to weave instead of the whole classpath
        units: Vec<PathBuf>,
    },

    /// Print the header and disassembled methods of a class unit
    Inspect {
        /// Unit file
        unit: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Weave {
            config,
            classpath,
            out,
            jobs,
            units,
        } => commands::weave::execute(config, classpath, out, jobs, units),

        Commands::Inspect { unit } => {
            commands::init_logging(false);
            commands::inspect::execute(unit)
        }
    }
}
