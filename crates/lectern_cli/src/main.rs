//! CLI entry point for inspecting and maintaining lectern datasets.
//!
//! # Responsibility
//! - Drive `lectern_core` dataset lifecycle from a terminal: provisioning,
//!   migrations, health, backup and restore.
//! - Keep output line-oriented and deterministic for scripting.

use clap::{Parser, Subcommand};
use lectern_core::config::BundleConfig;
use lectern_core::{load_config, DatasetManager, SearchOptions, StoreConfig};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "lectern", about = "Inspect and maintain bundled reader datasets", version)]
struct Cli {
    /// Path to a TOML config file. Overrides the directory flags below.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Application data root; datasets live under `<data-dir>/databases`.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Directory holding the bundled dataset files.
    #[arg(long, global = true)]
    bundle_dir: Option<PathBuf>,

    /// Bundled asset mapping, `NAME=FILE`. Repeatable.
    #[arg(long = "asset", global = true, value_parser = parse_asset)]
    assets: Vec<(String, String)>,

    /// Dataset to operate on; falls back to the configured default.
    #[arg(long, global = true)]
    dataset: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print core ping and version.
    Ping,
    /// List datasets the bundle can provision.
    Datasets,
    /// Open the dataset and print row counts.
    Stats,
    /// Open the dataset and run its health check.
    Health,
    /// Substring search over passage text.
    Search {
        text: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long)]
        case_sensitive: bool,
        #[arg(long)]
        whole_words: bool,
        #[arg(long)]
        document: Option<i64>,
    },
    /// Copy the live dataset file next to itself with a timestamp suffix.
    Backup,
    /// Replace the live dataset file with a previous backup.
    Restore { path: PathBuf },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Commands::Ping = cli.command {
        println!("lectern_core ping={}", lectern_core::ping());
        println!("lectern_core version={}", lectern_core::core_version());
        return ExitCode::SUCCESS;
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let config = resolve_config(&cli)?;
    let manager = DatasetManager::from_config(config).map_err(|err| err.to_string())?;

    if let Commands::Datasets = cli.command {
        for name in manager.available_datasets() {
            println!("{name}");
        }
        return Ok(());
    }

    let store = match cli.dataset.as_deref() {
        Some(name) => manager.switch_active(name).await,
        None => manager.active_or_default().await,
    }
    .map_err(|err| err.to_string())?;

    let outcome = match cli.command {
        Commands::Stats => store.stats().await.map(|stats| {
            println!("dataset={}", store.name());
            println!("documents={}", stats.documents);
            println!("passages={}", stats.passages);
            println!("annotations={}", stats.annotations);
            println!("prefaces={}", stats.prefaces);
            println!("schema_version={}", stats.schema_version);
        }),
        Commands::Health => {
            let report = store.health_check().await;
            println!("healthy={} {}", report.healthy, report.details);
            Ok(())
        }
        Commands::Search {
            text,
            limit,
            case_sensitive,
            whole_words,
            document,
        } => {
            let options = SearchOptions {
                case_sensitive,
                whole_words,
                document_filter: document,
                ..SearchOptions::with_limit(limit)
            };
            store.search(&text, &options).await.map(|hits| {
                for hit in hits {
                    let name = hit.document_short_name.as_deref().unwrap_or("?");
                    println!("{name} {}:{}\t{}", hit.section, hit.item, hit.text);
                }
            })
        }
        Commands::Backup => store
            .backup()
            .await
            .map(|path| println!("backup={}", path.display())),
        Commands::Restore { path } => store
            .restore(&path)
            .await
            .map(|()| println!("restored={}", store.path().display())),
        Commands::Ping | Commands::Datasets => Ok(()),
    };

    let closed = manager.close_all().await;
    outcome.map_err(|err| err.to_string())?;
    closed.map_err(|err| err.to_string())
}

fn resolve_config(cli: &Cli) -> Result<StoreConfig, String> {
    if let Some(path) = cli.config.as_deref() {
        return load_config(path).map_err(|err| err.to_string());
    }

    let data_dir = cli
        .data_dir
        .clone()
        .ok_or_else(|| "either --config or --data-dir is required".to_string())?;
    let root = cli
        .bundle_dir
        .clone()
        .ok_or_else(|| "--bundle-dir is required without --config".to_string())?;
    let assets: BTreeMap<String, String> = cli.assets.iter().cloned().collect();

    Ok(StoreConfig {
        bundle: Some(BundleConfig { root, assets }),
        ..StoreConfig::new(data_dir)
    })
}

fn parse_asset(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, file)) if !name.trim().is_empty() && !file.trim().is_empty() => {
            Ok((name.trim().to_string(), file.trim().to_string()))
        }
        _ => Err(format!("expected NAME=FILE, got `{raw}`")),
    }
}
