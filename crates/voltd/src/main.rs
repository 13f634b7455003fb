//! voltd — the VoltGrid canary deployment daemon.
//!
//! Single binary that wires the orchestrator to file-backed reference
//! collaborators:
//! - Deployment store (JSON record file)
//! - Edge inventory (JSON file, re-read on every poll so an external
//!   telemetry writer can feed live samples)
//! - Dry-run OTA publisher (logs commands instead of touching a broker)
//!
//! # Usage
//!
//! ```text
//! voltd init --data-dir /var/lib/voltgrid
//! voltd deploy --version 2.4.0 --checksum sha256:<hex> --follow
//! voltd status [<deployment-id>]
//! voltd list
//! ```

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use voltgrid_canary::CanaryOrchestrator;
use voltgrid_fleet::{DryRunPublisher, FileInventory, InventoryFile};
use voltgrid_state::{DeploymentStatus, DeploymentStore, StageStatus, UpdateVersion, epoch_ms};

use config::VoltConfig;

#[derive(Parser)]
#[command(
    name = "voltd",
    about = "VoltGrid — canary deployment orchestrator for battery-storage fleets",
    version
)]
struct Cli {
    /// Path to voltgrid.toml.
    #[arg(long, global = true, default_value = "voltgrid.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a scaffold voltgrid.toml and an empty fleet inventory.
    Init {
        /// Data directory for the store and inventory files.
        #[arg(long, default_value = "/var/lib/voltgrid")]
        data_dir: PathBuf,
    },
    /// Start a staged rollout and drive it to a terminal status.
    Deploy {
        /// Semantic version to roll out, e.g. 2.4.0.
        #[arg(long)]
        version: String,
        /// Artifact digest, sha256:<64 hex chars>.
        #[arg(long)]
        checksum: String,
        /// Release notes recorded on the deployment.
        #[arg(long)]
        notes: Option<String>,
        /// Print lifecycle events as JSON lines while the rollout runs.
        #[arg(long)]
        follow: bool,
    },
    /// Show one deployment record (default: the most recently started).
    Status {
        /// Deployment id; latest when omitted.
        deployment_id: Option<String>,
    },
    /// List all deployment records, oldest first.
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,voltd=debug,voltgrid=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Init { data_dir } => init(&cli.config, &data_dir),
        Command::Deploy {
            version,
            checksum,
            notes,
            follow,
        } => deploy(&cli.config, version, checksum, notes, follow).await,
        Command::Status { deployment_id } => status(&cli.config, deployment_id.as_deref()),
        Command::List => list(&cli.config),
    }
}

fn init(config_path: &Path, data_dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;

    let config = VoltConfig::scaffold(data_dir);
    std::fs::write(config_path, config.to_toml_string()?)?;
    println!("✓ Generated {}", config_path.display());

    if !config.fleet.inventory.exists() {
        let empty = serde_json::to_string_pretty(&InventoryFile::default())?;
        std::fs::write(&config.fleet.inventory, empty)?;
        println!("✓ Generated empty inventory {}", config.fleet.inventory.display());
    }
    Ok(())
}

async fn deploy(
    config_path: &Path,
    version: String,
    checksum: String,
    notes: Option<String>,
    follow: bool,
) -> anyhow::Result<()> {
    let config = VoltConfig::from_file(config_path)
        .with_context(|| format!("reading {}", config_path.display()))?;

    let store = DeploymentStore::open(&config.store.path)?;
    // No cross-deployment lock exists; flag the overlap and leave the
    // call to the operator.
    if let Some(latest) = store.get_latest_deployment()
        && latest.status == DeploymentStatus::InProgress
    {
        warn!(
            deployment_id = %latest.deployment_id,
            version = %latest.version.version,
            "another deployment is still in progress"
        );
    }

    let repository = Arc::new(FileInventory::new(&config.fleet.inventory));
    let publisher = Arc::new(DryRunPublisher::new());
    let orchestrator = CanaryOrchestrator::new(store, repository, publisher, config.rollout)?;

    let mut events = orchestrator.subscribe();
    let update = UpdateVersion {
        version,
        checksum,
        signature: None,
        release_notes: notes,
        released_at: epoch_ms(),
    };
    let state = orchestrator.start_deployment(update).await?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    info!(
        deployment_id = %state.deployment_id,
        "rollout running; voltd stays attached until a terminal status"
    );

    if follow {
        let waiter = orchestrator.wait_for(&state.deployment_id);
        tokio::pin!(waiter);
        let mut done = false;
        while !done {
            tokio::select! {
                result = &mut waiter => {
                    result?;
                    done = true;
                }
                event = events.recv() => {
                    if let Ok(event) = event {
                        println!("{}", serde_json::to_string(&event)?);
                    }
                }
            }
        }
        // Drain events published just before the driver exited.
        while let Ok(event) = events.try_recv() {
            println!("{}", serde_json::to_string(&event)?);
        }
    } else {
        orchestrator.wait_for(&state.deployment_id).await?;
    }

    let final_state = orchestrator
        .store()
        .get_deployment(&state.deployment_id)
        .context("deployment record missing after rollout")?;
    println!("{}", serde_json::to_string_pretty(&final_state)?);
    Ok(())
}

fn status(config_path: &Path, deployment_id: Option<&str>) -> anyhow::Result<()> {
    let config = VoltConfig::from_file(config_path)
        .with_context(|| format!("reading {}", config_path.display()))?;
    let store = DeploymentStore::open(&config.store.path)?;

    let record = match deployment_id {
        Some(id) => Some(
            store
                .get_deployment(id)
                .with_context(|| format!("deployment not found: {id}"))?,
        ),
        None => store.get_latest_deployment(),
    };
    match record {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        None => println!("no deployments recorded"),
    }
    Ok(())
}

fn list(config_path: &Path) -> anyhow::Result<()> {
    let config = VoltConfig::from_file(config_path)
        .with_context(|| format!("reading {}", config_path.display()))?;
    let store = DeploymentStore::open(&config.store.path)?;

    let records = store.list_deployments();
    if records.is_empty() {
        println!("no deployments recorded");
        return Ok(());
    }
    for record in records {
        let passed = record
            .stages
            .iter()
            .filter(|s| s.status == StageStatus::Passed)
            .count();
        println!(
            "{}  v{}  {:?}  stages {}/{}  updated {}  rolled_back {}",
            record.deployment_id,
            record.version.version,
            record.status,
            passed,
            record.stages.len(),
            record.updated_edge_ids.len(),
            record.rolled_back_edge_ids.len(),
        );
    }
    Ok(())
}
