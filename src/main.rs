mod collector;
mod command;
mod config;
mod error;
mod export;
mod http;
mod lag;
mod metrics;
mod queue;
#[cfg(test)]
mod test_strategies;

use crate::collector::manager::CollectorManager;
use crate::config::Config;
use crate::export::plaintext::PlaintextExporter;
use crate::http::server::HttpServer;
use crate::metrics::registry::MetricsRegistry;
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "lagscope")]
#[command(about = "Kafka consumer lag and Sidekiq queue depth collector with Graphite output")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Run one cycle of every collector, print the metrics and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!("Starting lagscope");

    let config = Config::load(Some(args.config.as_str()))?;
    info!(
        collectors = config.collectors.len(),
        poll_interval = ?config.exporter.poll_interval,
        "Configuration loaded"
    );

    // Stale after three missed polls
    let registry = Arc::new(MetricsRegistry::with_staleness_threshold(
        config.exporter.poll_interval * 3,
    ));

    let mut managers = Vec::new();
    for collector_config in &config.collectors {
        let collector = collector::build(collector_config, &config.exporter)?;
        info!(
            collector = collector_config.name(),
            kind = collector_config.kind(),
            path = collector_config.path(),
            "Collector configured"
        );
        managers.push(CollectorManager::new(
            collector,
            collector_config.path(),
            Arc::clone(&registry),
            &config.exporter,
        ));
    }

    if args.once {
        return run_once(&managers, &registry, &config).await;
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let mut handles = Vec::new();
    for manager in managers {
        let shutdown_rx = shutdown_tx.subscribe();
        handles.push(tokio::spawn(manager.run(shutdown_rx)));
    }

    let http_server = HttpServer::new(
        &config.exporter.http_host,
        config.exporter.http_port,
        PlaintextExporter::new(Arc::clone(&registry), None),
        Arc::clone(&registry),
    )?;

    let shutdown_rx = shutdown_tx.subscribe();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = http_server.run(shutdown_rx).await {
            error!(error = %e, "HTTP server error");
        }
    });

    if config.exporter.graphite.enabled {
        let registry = Arc::clone(&registry);
        let graphite_config = config.exporter.graphite.clone();
        let shutdown_rx = shutdown_tx.subscribe();

        tokio::spawn(async move {
            if let Err(e) =
                crate::export::graphite::run_graphite_exporter(registry, graphite_config, shutdown_rx)
                    .await
            {
                error!(error = %e, "Graphite exporter error");
            }
        });
    }

    shutdown_signal().await;
    info!("Shutdown signal received, stopping...");

    let _ = shutdown_tx.send(());

    let _ = server_handle.await;

    let shutdown_timeout = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        futures::future::join_all(handles),
    );

    match shutdown_timeout.await {
        Ok(_) => info!("All collectors stopped"),
        Err(_) => error!("Timeout waiting for collectors to stop"),
    }

    info!("lagscope stopped");
    Ok(())
}

/// Collect once per collector and write the plaintext rendering to stdout.
async fn run_once(
    managers: &[CollectorManager],
    registry: &Arc<MetricsRegistry>,
    config: &Config,
) -> anyhow::Result<()> {
    let mut failures = 0usize;
    for manager in managers {
        if let Err(e) = manager.collect_once().await {
            warn!(manager = ?manager, error = %e, "Collection failed");
            failures += 1;
        }
    }

    let exporter = PlaintextExporter::new(Arc::clone(registry), config.exporter.graphite.prefix.clone());
    print!("{}", exporter.render_metrics());

    if failures == managers.len() && !managers.is_empty() {
        anyhow::bail!("every collector failed");
    }
    Ok(())
}

fn init_logging(level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
