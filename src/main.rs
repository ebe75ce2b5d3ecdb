use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use dbplane::config::EngineConfig;
use dbplane::controller::{
    cancellation, Applied, ApplyAction, CancelHandle, Drift, Reconciler, ResourceLeases,
    TracingSink,
};
use dbplane::model::{Manifest, ResourceDocument, ResourceSnapshot};
use dbplane::Error;
use futures::future::join_all;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Engine configuration file (TOML)
    #[arg(long, global = true, env = "DBPLANE_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, env = "DBPLANE_LOG_FORMAT", value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a manifest without contacting the API
    Validate(ManifestArgs),
    /// Create or update every resource in a manifest
    Apply(RunArgs),
    /// Delete every resource in a manifest, in reverse dependency order
    Delete(RunArgs),
    /// Print the JSON schema of the manifest format
    Schema,
    /// Show version information
    Version,
}

#[derive(Parser, Debug)]
struct ManifestArgs {
    /// Resource manifest (YAML)
    manifest: PathBuf,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Resource manifest (YAML)
    manifest: PathBuf,

    /// File holding the last settled state of each resource
    #[arg(long, env = "DBPLANE_STATE", default_value = "dbplane-state.json")]
    state: PathBuf,

    /// API base URL, overrides the configuration file
    #[arg(long, env = "DBPLANE_API_URL")]
    api_url: Option<String>,

    /// API key, overrides the configuration file
    #[arg(long, env = "DBPLANE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, env = "DBPLANE_ACCOUNT_ID")]
    account_id: Option<String>,

    #[arg(long, env = "DBPLANE_PROJECT_ID")]
    project_id: Option<String>,
}

type StateFile = BTreeMap<String, ResourceSnapshot>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match args.command {
        Commands::Version => {
            println!("dbplane v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Schema => {
            let schema = schemars::schema_for!(Manifest);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
        Commands::Validate(manifest_args) => {
            let manifest = load_manifest(&manifest_args.manifest)?;
            validate(&manifest, &config)?;
            println!("{} resource(s) are valid", manifest.resources.len());
            Ok(())
        }
        Commands::Apply(run_args) => run_apply(run_args, config).await,
        Commands::Delete(run_args) => run_delete(run_args, config).await,
    }
}

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    let registry = tracing_subscriber::registry().with(env_filter);

    // stdout is reserved for command output
    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

fn load_manifest(path: &Path) -> anyhow::Result<Manifest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    serde_yaml::from_str(&raw)
        .map_err(Error::from)
        .with_context(|| format!("failed to parse manifest {}", path.display()))
}

fn validate(manifest: &Manifest, config: &EngineConfig) -> anyhow::Result<()> {
    if let Err(issues) = manifest.validate(&config.features) {
        for issue in &issues {
            eprintln!("{}: {}\n  fix: {}", issue.field, issue.message, issue.how_to_fix);
        }
        bail!("manifest has {} problem(s)", issues.len());
    }
    Ok(())
}

fn load_state(path: &Path) -> anyhow::Result<StateFile> {
    if !path.exists() {
        return Ok(StateFile::new());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read state file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("state file {} is corrupt", path.display()))
}

fn save_state(path: &Path, state: &StateFile) -> anyhow::Result<()> {
    let raw = serde_json::to_string_pretty(state)?;
    std::fs::write(path, raw)
        .with_context(|| format!("failed to write state file {}", path.display()))
}

fn engine(args: &RunArgs, mut config: EngineConfig) -> anyhow::Result<(Reconciler, CancelHandle)> {
    if let Some(url) = &args.api_url {
        config.api.base_url = url.clone();
    }
    if let Some(key) = &args.api_key {
        config.api.api_key = key.clone();
    }
    if let Some(account) = &args.account_id {
        config.api.account_id = account.clone();
    }
    if let Some(project) = &args.project_id {
        config.api.project_id = project.clone();
    }
    if config.api.base_url.is_empty() || config.api.api_key.is_empty() {
        bail!("an API URL and API key are required (--api-url/--api-key or the [api] config section)");
    }

    let (handle, signal) = cancellation();
    let reconciler = Reconciler::from_config(&config, Arc::new(TracingSink), signal)?;
    Ok((reconciler, handle))
}

fn cancel_on_ctrl_c(handle: CancelHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight operations");
            handle.cancel();
        }
    });
}

struct Outcome {
    snapshot: ResourceSnapshot,
    action: ApplyAction,
    drifts: Vec<Drift>,
}

fn outcome<S>(applied: Applied<S>, wrap: fn(S) -> ResourceSnapshot) -> Outcome {
    Outcome {
        snapshot: wrap(applied.state),
        action: applied.action,
        drifts: applied.drifts,
    }
}

async fn apply_document(
    reconciler: &Reconciler,
    doc: &ResourceDocument,
    prior: Option<&ResourceSnapshot>,
) -> Result<Outcome, Error> {
    Ok(match doc {
        ResourceDocument::Vpc { spec, .. } => {
            let prior = match prior {
                Some(ResourceSnapshot::Vpc(s)) => Some(s),
                _ => None,
            };
            outcome(reconciler.apply_vpc(spec, prior).await?, ResourceSnapshot::Vpc)
        }
        ResourceDocument::AllowList { spec, .. } => {
            let prior = match prior {
                Some(ResourceSnapshot::AllowList(s)) => Some(s),
                _ => None,
            };
            outcome(
                reconciler.apply_allow_list(spec, prior).await?,
                ResourceSnapshot::AllowList,
            )
        }
        ResourceDocument::Integration { spec, .. } => {
            let prior = match prior {
                Some(ResourceSnapshot::Integration(s)) => Some(s),
                _ => None,
            };
            outcome(
                reconciler.apply_integration(spec, prior).await?,
                ResourceSnapshot::Integration,
            )
        }
        ResourceDocument::Cluster { spec, .. } => {
            let prior = match prior {
                Some(ResourceSnapshot::Cluster(s)) => Some(s),
                _ => None,
            };
            outcome(
                reconciler.apply_cluster(spec, prior).await?,
                ResourceSnapshot::Cluster,
            )
        }
        ResourceDocument::ReadReplicas { spec, .. } => {
            let prior = match prior {
                Some(ResourceSnapshot::ReadReplicas(s)) => Some(s),
                _ => None,
            };
            outcome(
                reconciler.apply_read_replicas(spec, prior).await?,
                ResourceSnapshot::ReadReplicas,
            )
        }
        ResourceDocument::Backup { spec, .. } => {
            let prior = match prior {
                Some(ResourceSnapshot::Backup(s)) => Some(s),
                _ => None,
            };
            outcome(
                reconciler.apply_backup(spec, prior).await?,
                ResourceSnapshot::Backup,
            )
        }
        ResourceDocument::AuditLog { spec, .. } => {
            let prior = match prior {
                Some(ResourceSnapshot::AuditLog(s)) => Some(s),
                _ => None,
            };
            outcome(
                reconciler.apply_audit_log(spec, prior).await?,
                ResourceSnapshot::AuditLog,
            )
        }
    })
}

async fn delete_snapshot(reconciler: &Reconciler, snapshot: &ResourceSnapshot) -> Result<(), Error> {
    match snapshot {
        ResourceSnapshot::Vpc(s) => reconciler.delete_vpc(&s.vpc_id).await,
        ResourceSnapshot::AllowList(s) => reconciler.delete_allow_list(&s.allow_list_id).await,
        ResourceSnapshot::Integration(s) => {
            reconciler.delete_integration(&s.integration_id).await
        }
        ResourceSnapshot::Cluster(s) => reconciler.delete_cluster(&s.cluster_id).await,
        ResourceSnapshot::ReadReplicas(s) => {
            reconciler.delete_read_replicas(&s.primary_cluster_id).await
        }
        ResourceSnapshot::Backup(s) => reconciler.delete_backup(&s.backup_id).await,
        ResourceSnapshot::AuditLog(s) => {
            reconciler.delete_audit_log(&s.cluster_id, &s.config_id).await
        }
    }
}

async fn run_apply(args: RunArgs, config: EngineConfig) -> anyhow::Result<()> {
    let manifest = load_manifest(&args.manifest)?;
    validate(&manifest, &config)?;
    let (reconciler, handle) = engine(&args, config)?;
    cancel_on_ctrl_c(handle);

    let mut state = load_state(&args.state)?;
    let leases = ResourceLeases::new();
    let mut failures = 0;

    info!("Applying {} resource(s)", manifest.resources.len());
    for stage in manifest.stages() {
        let passes = stage.iter().map(|doc| {
            let reconciler = &reconciler;
            let leases = &leases;
            let prior = state.get(&doc.key());
            async move {
                let _lease = leases.acquire(doc.key()).await;
                (doc.key(), apply_document(reconciler, doc, prior).await)
            }
        });
        let results = join_all(passes).await;

        for (key, result) in results {
            match result {
                Ok(outcome) => {
                    println!("{key}: {}", outcome.action);
                    for drift in &outcome.drifts {
                        println!("  {drift}");
                    }
                    state.insert(key, outcome.snapshot);
                }
                Err(e) => {
                    error!("{key}: {}: {e}", e.title());
                    failures += 1;
                }
            }
        }
        save_state(&args.state, &state)?;

        // Later stages reference resources from this one
        if failures > 0 {
            break;
        }
    }

    if failures > 0 {
        bail!("{failures} resource(s) failed to apply");
    }
    Ok(())
}

async fn run_delete(args: RunArgs, config: EngineConfig) -> anyhow::Result<()> {
    let manifest = load_manifest(&args.manifest)?;
    let (reconciler, handle) = engine(&args, config)?;
    cancel_on_ctrl_c(handle);

    let mut state = load_state(&args.state)?;
    let leases = ResourceLeases::new();
    let mut failures = 0;

    for stage in manifest.stages().into_iter().rev() {
        let passes = stage.iter().filter_map(|doc| {
            let key = doc.key();
            let Some(snapshot) = state.get(&key) else {
                warn!("{key} has no recorded state, skipping");
                return None;
            };
            let reconciler = &reconciler;
            let leases = &leases;
            Some(async move {
                let _lease = leases.acquire(key.clone()).await;
                let result = delete_snapshot(reconciler, snapshot).await;
                (key, result)
            })
        });
        let results = join_all(passes).await;

        for (key, result) in results {
            match result {
                Ok(()) => {
                    println!("{key}: deleted");
                    state.remove(&key);
                }
                Err(e) => {
                    error!("{key}: {}: {e}", e.title());
                    failures += 1;
                }
            }
        }
        save_state(&args.state, &state)?;

        if failures > 0 {
            break;
        }
    }

    if failures > 0 {
        bail!("{failures} resource(s) failed to delete");
    }
    Ok(())
}
