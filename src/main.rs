//! jvm-gc-exporter binary entry point.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use jvm_gc_exporter::cache::AttributeCache;
use jvm_gc_exporter::cli::{Args, Commands, ConfigFormat};
use jvm_gc_exporter::collector::Collector;
use jvm_gc_exporter::commands::{command_check, command_config, command_once, render_config};
use jvm_gc_exporter::config::{resolve_config, validate_effective_config, Config, Mode};
use jvm_gc_exporter::health_stats::HealthStats;
use jvm_gc_exporter::lifecycle::{
    run_pull_server, run_push_loop, shutdown_signal, Lifecycle, LifecycleState, PushSettings,
};
use jvm_gc_exporter::logging::setup_logging;
use jvm_gc_exporter::push::GatewayPusher;
use jvm_gc_exporter::registry::ServiceRegistry;
use jvm_gc_exporter::state::AppState;
use jvm_gc_exporter::tools::{DiagnosticTools, JdkTools};

fn show_config(config: &Config, format: &ConfigFormat) -> anyhow::Result<()> {
    print!("{}", render_config(config, format)?);
    Ok(())
}

/// Resolves and validates the effective config, exiting 1 when invalid.
fn effective_config(args: &Args) -> Config {
    let config = match resolve_config(args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("Configuration invalid: {}", e);
        std::process::exit(1);
    }
    config
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = effective_config(&args);
        if args.check_config {
            println!("Configuration is valid");
            return Ok(());
        }
        return show_config(&config, &args.config_format);
    }

    let config = effective_config(&args);
    setup_logging(&config)?;

    // Handle subcommands
    if let Some(command) = &args.command {
        return match command {
            Commands::Check => command_check(&config),
            Commands::Config {
                output,
                format,
                commented,
            } => command_config(output.clone(), format.clone(), *commented),
            Commands::Once { verbose } => {
                let verbose = *verbose;
                tokio::task::spawn_blocking(move || command_once(&config, verbose)).await?
            }
        };
    }

    info!(
        "Starting jvm-gc-exporter {} in {:?} mode",
        env!("CARGO_PKG_VERSION"),
        config.mode()
    );

    let config = Arc::new(config);
    let lifecycle = Lifecycle::new();

    let tools: Arc<dyn DiagnosticTools> = Arc::new(JdkTools::from_config(&config));
    let collector = Arc::new(
        Collector::from_config(tools, Arc::new(AttributeCache::new()), &config)
            .context("failed to build extraction thread pool")?,
    );

    match config.mode() {
        Mode::Pull => run_pull(config, collector, lifecycle).await?,
        Mode::Push => run_push(config, collector, lifecycle).await?,
    }

    info!("jvm-gc-exporter stopped gracefully");
    Ok(())
}

async fn run_pull(
    config: Arc<Config>,
    collector: Arc<Collector>,
    lifecycle: Lifecycle,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.bind(), config.port())
        .parse()
        .context("invalid bind address")?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("jvm-gc-exporter listening on http://{}", addr);

    let registry = match ServiceRegistry::from_config(&config).await {
        Ok(registry) => registry,
        Err(e) => {
            warn!("Service discovery client unavailable: {}", e);
            None
        }
    };

    let state = Arc::new(AppState::new(collector, config, lifecycle));
    if let Err(e) = run_pull_server(state, listener, registry, shutdown_signal()).await {
        error!("Server error: {}", e);
        return Err(e.into());
    }
    Ok(())
}

async fn run_push(
    config: Arc<Config>,
    collector: Arc<Collector>,
    lifecycle: Lifecycle,
) -> anyhow::Result<()> {
    let pusher = GatewayPusher::from_config(&config).context("failed to build HTTP client")?;
    info!("Pushing to {}", pusher.url());

    let settings = PushSettings {
        interval: config.push_interval(),
        instance: config.instance(),
    };

    let signal_lifecycle = lifecycle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_lifecycle.transition(LifecycleState::Draining);
    });

    let health = Arc::new(HealthStats::new());
    run_push_loop(collector, pusher, settings, lifecycle.clone(), health).await;
    lifecycle.transition(LifecycleState::Stopped);
    Ok(())
}
