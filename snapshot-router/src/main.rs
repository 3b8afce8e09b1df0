use clap::{Parser, Subcommand};
use rebuilder::config::Config;
use rebuilder::engine::Rebuilder;
use rebuilder::invalidation::LogInvalidator;
use rebuilder::snapshot::FilesystemSnapshotStore;
use rebuilder::upstream::UpstreamClient;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tag_index::{FilesystemTagIndexStore, TagIndex};

#[derive(Parser)]
#[command(name = "snapshot-router", about = "Precomputes static route snapshots and keeps the dependency tag index and CDN in sync")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run one rebuild: full without a payload, partial with one.
    Rebuild {
        /// JSON file with the changed-dependency payload.
        #[arg(long)]
        payload: Option<PathBuf>,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

/// Install the statsd exporter when STATSD_ADDR (host:port) is set.
fn init_metrics() {
    let Ok(addr) = std::env::var("STATSD_ADDR") else {
        return;
    };
    let Some((host, port)) = addr.rsplit_once(':') else {
        tracing::warn!(%addr, "STATSD_ADDR is not host:port, metrics disabled");
        return;
    };
    let Ok(port) = port.parse::<u16>() else {
        tracing::warn!(%addr, "STATSD_ADDR port is not numeric, metrics disabled");
        return;
    };

    match metrics_exporter_statsd::StatsdBuilder::from(host, port).build(Some("snapshot_router")) {
        Ok(recorder) => match metrics::set_global_recorder(recorder) {
            Ok(()) => shared::metrics_defs::describe_all(rebuilder::metrics_defs::ALL_METRICS),
            Err(err) => tracing::warn!("metrics recorder already installed: {err}"),
        },
        Err(err) => tracing::warn!("statsd exporter not started: {err}"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    init_metrics();

    let cli = Cli::parse();
    match cli.command {
        CliCommand::Rebuild { payload } => rebuild(payload).await,
    }
}

async fn rebuild(payload: Option<PathBuf>) -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let payload = match payload {
        Some(path) => match std::fs::read_to_string(&path) {
            Ok(raw) => Some(raw),
            Err(err) => {
                eprintln!("could not read payload {}: {err}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    let snapshot_dir = std::env::var("SNAPSHOT_DIR").unwrap_or_else(|_| "snapshots".into());
    let index_path = std::env::var("TAG_INDEX_PATH").unwrap_or_else(|_| "tag-index.json".into());

    let engine = Rebuilder::new(
        config.clone(),
        UpstreamClient::new(&config),
        Arc::new(FilesystemSnapshotStore::new(snapshot_dir)),
        TagIndex::new(Arc::new(FilesystemTagIndexStore::new(index_path))),
        Arc::new(LogInvalidator),
    );

    let report = engine.run(payload.as_deref()).await;

    // The report is the contract: the caller always gets the full log, even
    // when the run completed with errors.
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("could not serialize run report: {err}"),
    }
    ExitCode::SUCCESS
}
