//! ---
//! mfe_section: "01-core-functionality"
//! mfe_subsection: "binary"
//! mfe_type: "source"
//! mfe_scope: "code"
//! mfe_description: "Binary entrypoint for the micro-frontend host."
//! mfe_version: "v0.0.0-prealpha"
//! mfe_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mfe_common::config::AppConfig;
use mfe_common::logging::init_tracing;
use mfe_core::{
    AssetLoader, HttpFetcher, InertEvaluator, Location, MemoryDocument, MemoryHistory,
    MicroAppSpec, NavigationSource, Orchestrator, RouteMatcher, StartOptions,
};
use serde_json::json;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Micro-frontend host",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Print the micro-app matched for each path")]
    Routes {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    #[command(about = "Fetch an entry and list its scripts in execution order")]
    Inspect { entry: String },
    #[command(about = "Start the orchestrator and replay a navigation sequence")]
    Run {
        #[arg(long, default_value = "/", help = "Location the host starts on")]
        initial: String,
        #[arg(long = "navigate", value_name = "PATH", help = "Path pushed after start; repeatable")]
        navigate: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/portal.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let config = loaded.config;
    init_tracing("mfed", &config.logging)?;
    info!(config = %loaded.source.display(), apps = config.apps.len(), "configuration loaded");

    match cli.command.unwrap_or(Commands::Run {
        initial: "/".to_owned(),
        navigate: Vec::new(),
    }) {
        Commands::Routes { paths } => routes(&config, &paths),
        Commands::Inspect { entry } => inspect(&config, &entry).await,
        Commands::Run { initial, navigate } => run(&config, &initial, &navigate).await,
    }
}

fn app_specs(config: &AppConfig) -> Result<Vec<MicroAppSpec>> {
    config
        .apps
        .iter()
        .map(|app| MicroAppSpec::try_from(app).with_context(|| format!("invalid app {}", app.name)))
        .collect()
}

fn build_loader(config: &AppConfig) -> Result<AssetLoader> {
    let fetcher = HttpFetcher::new(config.orchestrator.fetch_timeout)
        .context("failed to construct http fetcher")?;
    Ok(AssetLoader::new(Arc::new(fetcher), Arc::new(InertEvaluator))
        .with_default_scheme(config.orchestrator.default_scheme.clone()))
}

fn routes(config: &AppConfig, paths: &[String]) -> Result<()> {
    let registry = mfe_core::AppRegistry::new();
    registry.register(app_specs(config)?)?;
    for path in paths {
        let location = Location::parse(path);
        match RouteMatcher::find_match(&location, &registry) {
            Some(app) => println!(
                "{path} -> {} (basename {})",
                app.name,
                app.active_rule.basename(&location)
            ),
            None => println!("{path} -> -"),
        }
    }
    Ok(())
}

async fn inspect(config: &AppConfig, entry: &str) -> Result<()> {
    let loader = build_loader(config)?;
    let assets = loader
        .fetch_assets(entry)
        .await
        .with_context(|| format!("failed to load entry {entry}"))?;
    println!("entry: {}", assets.entry);
    println!("markup: {} bytes", assets.markup.len());
    for script in &assets.scripts {
        println!("  [{}] {} ({} bytes)", script.index, script.label(), script.body.len());
    }
    for skipped in &assets.skipped {
        println!("  [{}] {} skipped: {}", skipped.index, skipped.url, skipped.error);
    }
    Ok(())
}

async fn run(config: &AppConfig, initial: &str, navigate: &[String]) -> Result<()> {
    let document = Arc::new(MemoryDocument::new());
    for app in &config.apps {
        document.add_region(&app.container);
    }
    let orchestrator = Arc::new(Orchestrator::new(build_loader(config)?, document));
    orchestrator.register_micro_apps(app_specs(config)?)?;
    mfe_state::init_global_state(config.global_state.clone());

    let history = Arc::new(MemoryHistory::new(initial));
    let source: Arc<dyn NavigationSource> = history.clone();
    let options = StartOptions::from(&config.orchestrator);
    let Some(task) = orchestrator.start(source, options).await else {
        warn!("orchestrator was already running");
        return Ok(());
    };

    for (index, path) in navigate.iter().enumerate() {
        history.push_state(path);
        if !task.wait_for_navigations(index as u64 + 1).await {
            warn!(path = %path, "navigation listener stopped early");
            break;
        }
        info!(path = %path, active = ?orchestrator.active_app(), "navigation processed");
    }
    task.shutdown().await;

    let report = json!({
        "location": history.current_location().href(),
        "active": orchestrator.active_app(),
        "apps": orchestrator.registry().snapshot(),
        "global_state": mfe_state::global().keys(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
