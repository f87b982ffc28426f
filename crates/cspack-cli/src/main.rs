mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cspack", about = "Package cloud services into deployable .cspkg files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the service package, overwriting any existing one
    Package {
        /// Service root directory (contains cspack.toml)
        #[arg(long, short = 'p', default_value = ".")]
        path: PathBuf,
    },
    /// Write the service definition and configuration documents only
    Manifest {
        /// Service root directory (contains cspack.toml)
        #[arg(long, short = 'p', default_value = ".")]
        path: PathBuf,
    },
    /// List the parts of a service or role package
    Inspect {
        /// Package file to inspect
        file: PathBuf,
        /// Also list the parts of each nested role container
        #[arg(long, short = 'r')]
        roles: bool,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Package { path } => commands::package(&path)?,
        Commands::Manifest { path } => commands::manifest(&path)?,
        Commands::Inspect { file, roles, json } => commands::inspect(&file, roles, json)?,
    }

    Ok(())
}
