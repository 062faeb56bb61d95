use clap::{Parser, Subcommand};
use murmur_crypto::hash_to_field_bytes;
use murmur_crypto::identity::Identity;
use murmur_crypto::zk::{MembershipProver, MembershipVerifier};
use murmur_types::{
    Commitment, ExternalNullifier, GroupAction, GroupId, GroupName, MurmurError, MurmurResult,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use murmur_daemon::artifacts::{ArtifactClient, ArtifactKind};
use murmur_daemon::config::{default_data_dir, DaemonConfig};
use murmur_daemon::log::{EventLog, HttpEventLog, MemoryEventLog};
use murmur_daemon::prover::ProofEngine;
use murmur_daemon::registry::GroupRegistry;
use murmur_daemon::signal::{RejectReason, SignalAttempt};
use murmur_daemon::storage::SignalStorage;
use murmur_daemon::sync::EventSync;
use murmur_daemon::tasks::CancellationToken;
use murmur_daemon::verifier::SignalVerifier;

const BUILD_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "murmur")]
#[command(version = BUILD_VERSION)]
#[command(about = "Murmur - anonymous group signaling daemon")]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(short, long, global = true, value_name = "FILE", help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[arg(short = 'd', long, global = true, value_name = "DIR", env = "MURMUR_DATA_DIR", help = "Data directory path")]
    pub data_dir: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true, help = "Increase verbosity (-v, -vv, -vvv)")]
    pub verbose: u8,

    #[arg(short, long, global = true, help = "Suppress non-error output")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Start the daemon")]
    Run,

    #[command(about = "Write a default configuration file")]
    Init {
        #[arg(short, long, help = "Overwrite existing configuration")]
        force: bool,
    },

    #[command(about = "Manage identities")]
    Identity {
        #[command(subcommand)]
        action: IdentityAction,
    },

    #[command(about = "Manage groups on the event log")]
    Group {
        #[command(subcommand)]
        action: GroupCommand,
    },

    #[command(about = "Prove membership and submit an anonymous signal")]
    Signal {
        #[arg(long, value_name = "SECRET", help = "Identity export string")]
        identity: String,
        #[arg(long, value_name = "ID")]
        group: u64,
        #[arg(long, value_name = "CONTEXT", help = "External nullifier context tag")]
        context: String,
        #[arg(long, value_name = "PAYLOAD")]
        signal: String,
    },
}

#[derive(Subcommand)]
pub enum IdentityAction {
    #[command(about = "Generate a new identity")]
    New,
    #[command(about = "Show the commitment of an identity export")]
    Show {
        #[arg(long, value_name = "SECRET")]
        identity: String,
    },
}

#[derive(Subcommand)]
pub enum GroupCommand {
    #[command(about = "Create a group")]
    Create {
        #[arg(long)]
        name: String,
    },
    #[command(about = "Register a member commitment")]
    AddMember {
        #[arg(long, value_name = "ID")]
        group: u64,
        #[arg(long, value_name = "HEX")]
        commitment: String,
    },
}

pub fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "info,murmur_daemon=debug",
            2 => "debug",
            _ => "trace",
        }
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(cli.verbose >= 2))
        .init();
}

pub fn resolve_paths(cli: &Cli) -> (PathBuf, PathBuf) {
    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| data_dir.join("config.toml"));
    (config_path, data_dir)
}

fn load_config(config_path: &Path, data_dir: &Path) -> MurmurResult<DaemonConfig> {
    let mut config = DaemonConfig::load_or_default(config_path)?;
    config.data_dir = data_dir.to_path_buf();
    config.validate()?;
    Ok(config)
}

fn event_log_client(config: &DaemonConfig) -> MurmurResult<Arc<dyn EventLog>> {
    if config.event_log.endpoints.is_empty() {
        warn!("No event log endpoints configured; using in-process log");
        Ok(Arc::new(MemoryEventLog::new()))
    } else {
        Ok(Arc::new(HttpEventLog::new(
            config.event_log.endpoints.clone(),
            Duration::from_millis(config.event_log.poll_interval_ms),
            Duration::from_secs(config.event_log.submit_timeout_secs),
        )?))
    }
}

pub fn init_config(config_path: &Path, data_dir: &Path, force: bool) -> MurmurResult<()> {
    if config_path.exists() && !force {
        return Err(MurmurError::Config(format!(
            "{:?} already exists (use --force to overwrite)",
            config_path
        )));
    }
    let mut config = DaemonConfig::default();
    config.data_dir = data_dir.to_path_buf();
    config.save(config_path)?;
    println!("Wrote {}", config_path.display());
    Ok(())
}

pub async fn run_daemon(config_path: &Path, data_dir: &Path) -> MurmurResult<()> {
    let config = load_config(config_path, data_dir)?;

    let storage = Arc::new(SignalStorage::open(&config.data_dir.join("db"))?);
    let registry = GroupRegistry::shared(config.tree_depth);
    let log = event_log_client(&config)?;
    let sync = Arc::new(EventSync::new(registry.clone(), log, storage.clone()));

    let (cancel_tx, cancel) = CancellationToken::new();
    let sync_handle = {
        let sync = Arc::clone(&sync);
        tokio::spawn(async move { sync.run(cancel).await })
    };

    let checkpoint = storage.checkpoint()?;
    info!(checkpoint, depth = config.tree_depth, "Murmur daemon running");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| MurmurError::Internal(format!("Signal handler failed: {}", e)))?;
    info!("Shutting down");

    let _ = cancel_tx.send(true);
    match sync_handle.await {
        Ok(result) => result?,
        Err(e) => warn!("Sync task panicked: {}", e),
    }
    storage.flush()?;
    Ok(())
}

pub fn handle_identity(action: IdentityAction) -> MurmurResult<()> {
    match action {
        IdentityAction::New => {
            let identity = Identity::generate();
            println!("commitment: {}", identity.commitment());
            println!("secret:     {}", identity.export());
            println!();
            println!("Keep the secret private; only the commitment is registered.");
        }
        IdentityAction::Show { identity } => {
            let identity = Identity::import(&identity)?;
            println!("commitment: {}", identity.commitment());
        }
    }
    Ok(())
}

pub async fn handle_group(
    config_path: &Path,
    data_dir: &Path,
    action: GroupCommand,
) -> MurmurResult<()> {
    let config = load_config(config_path, data_dir)?;
    let log = event_log_client(&config)?;

    let receipt = match action {
        GroupCommand::Create { name } => {
            log.submit(GroupAction::CreateGroup {
                name: GroupName::new(name)?,
            })
            .await?
        }
        GroupCommand::AddMember { group, commitment } => {
            log.submit(GroupAction::AddMember {
                group_id: GroupId(group),
                commitment: Commitment::from_hex(&commitment)?,
            })
            .await?
        }
    };

    println!("Finalized at sequence {}", receipt.sequence);
    Ok(())
}

/// Full signaling flow: catch the registry up, generate a proof, and
/// submit it to the verifier, reporting the outcome.
pub async fn handle_signal(
    config_path: &Path,
    data_dir: &Path,
    identity: String,
    group: u64,
    context: String,
    signal: String,
) -> MurmurResult<()> {
    let config = load_config(config_path, data_dir)?;
    let identity = Identity::import(&identity)?;
    let group_id = GroupId(group);
    let external_nullifier = ExternalNullifier::from_bytes(hash_to_field_bytes(context.as_bytes()));

    let storage = Arc::new(SignalStorage::open(&config.data_dir.join("db"))?);
    let registry = GroupRegistry::shared(config.tree_depth);
    let log = event_log_client(&config)?;
    let sync = EventSync::new(registry.clone(), log, storage.clone());
    sync.catch_up(Duration::from_millis(500)).await?;

    let (prover, membership_verifier) = load_keys(&config).await?;
    let engine = ProofEngine::new(Arc::new(prover));
    let verifier = SignalVerifier::new(registry.clone(), membership_verifier, storage)?;

    let mut attempt = SignalAttempt::new(group_id, external_nullifier);
    attempt.request_proof()?;

    let snapshot = registry.read().await.snapshot(group_id)?;
    let proof = engine
        .generate(&identity, &snapshot, external_nullifier, signal.into_bytes())
        .await?;
    attempt.proof_generated()?;

    attempt.submitted()?;
    let report = verifier.verify(group_id, &proof).await?;

    if report.accepted {
        attempt.accepted()?;
        println!("accepted (nullifier {})", proof.nullifier_hash.to_hex());
    } else {
        let reason = report.reason.unwrap_or(RejectReason::InvalidProof);
        attempt.rejected(reason)?;
        println!("not accepted ({:?})", reason);
    }
    Ok(())
}

/// Load proving/verifying keys from the artifact endpoint, falling
/// back to a local development setup when none is configured.
async fn load_keys(config: &DaemonConfig) -> MurmurResult<(MembershipProver, MembershipVerifier)> {
    if config.artifacts.base_urls.is_empty() {
        warn!("No artifact endpoints configured; running local key setup");
        return MembershipProver::setup(config.tree_depth);
    }

    let client = ArtifactClient::new(
        config.artifacts.base_urls.clone(),
        config.data_dir.join("artifacts"),
        config.artifacts.vk_hash.clone(),
    )?;

    let pk_bytes = client.fetch(ArtifactKind::ProvingKey).await?;
    let vk_bytes = client.fetch(ArtifactKind::VerifyingKey).await?;

    Ok((
        MembershipProver::from_key_bytes(&pk_bytes, config.tree_depth)?,
        MembershipVerifier::from_key_bytes(&vk_bytes)?,
    ))
}
