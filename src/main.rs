//! Command line tools for the replication backlog monitor.
//!
//! The remote health-report transport is supplied by the embedding
//! application, so the binary works with configuration and topology files
//! only: it validates configs and shows which connections a polling round
//! would query.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use clap::{Parser, Subcommand};

use dfsr_monitor::config::{load_config, ObservabilityConfig};
use dfsr_monitor::observability::logging::init_logging;
use dfsr_monitor::topology::{connections, load_domain, Target};

#[derive(Parser)]
#[command(name = "dfsr-monitor")]
#[command(about = "Replication backlog monitor tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file and print the effective settings
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List the enabled connections of a topology file
    Connections {
        #[arg(short, long)]
        topology: PathBuf,

        /// Only show connections of this replication group
        #[arg(short, long)]
        group: Option<String>,

        /// Only show connections to or from this host
        #[arg(short, long)]
        member: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&ObservabilityConfig::default()) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let result = match cli.command {
        Commands::Check { config } => check(&config),
        Commands::Connections {
            topology,
            group,
            member,
            json,
        } => list_connections(&topology, group.as_deref(), member.as_deref(), json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn check(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path)?;
    tracing::debug!(path = ?path, "Configuration valid");
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn list_connections(
    path: &Path,
    group: Option<&str>,
    member: Option<&str>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let domain = load_domain(path)?;
    let targets: Vec<Target> = connections(&domain)
        .into_iter()
        .filter(|t| group.map_or(true, |g| t.group_name.eq_ignore_ascii_case(g)))
        .filter(|t| {
            member.map_or(true, |m| {
                t.from.eq_ignore_ascii_case(m) || t.to.eq_ignore_ascii_case(m)
            })
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&targets)?);
        return Ok(());
    }

    println!("Domain: {}", domain.name);
    for target in &targets {
        println!(
            "  {:<30} {:>40} -> {:<40} folders: {}",
            target.group_name,
            target.from,
            target.to,
            target.folders.len()
        );
    }
    println!("Connections: {}", targets.len());
    Ok(())
}
