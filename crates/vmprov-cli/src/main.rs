//! vmprov CLI tool.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "vmprov")]
#[command(about = "Inspect and validate VM provisioner configuration", long_about = None)]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, env = "VMPROV_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a provisioner configuration
    Validate {
        /// Path to the configuration file
        #[arg(default_value = "provision.kdl")]
        path: String,
        /// Validate the effective provisioners of this machine
        #[arg(long)]
        machine: Option<String>,
    },
    /// Show the effective provisioners
    Show {
        /// Path to the configuration file
        #[arg(default_value = "provision.kdl")]
        path: String,
        /// Show the effective provisioners of this machine
        #[arg(long)]
        machine: Option<String>,
    },
    /// List the provisioner kinds this build knows about
    Kinds,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Validate { path, machine } => {
            commands::validate(&path, machine.as_deref())?;
        }
        Commands::Show { path, machine } => {
            commands::show(&path, machine.as_deref())?;
        }
        Commands::Kinds => {
            commands::kinds();
        }
    }

    Ok(())
}
