use crate::config::GraphiteConfig;
use crate::error::{LagscopeError, Result};
use crate::export::plaintext::PlaintextExporter;
use crate::metrics::registry::MetricsRegistry;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Push the rendered registry to a carbon endpoint every `export_interval`
/// until shutdown. A failed push is logged and retried on the next tick.
pub async fn run_graphite_exporter(
    registry: Arc<MetricsRegistry>,
    config: GraphiteConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    info!(endpoint = %config.endpoint, "Starting Graphite exporter");

    let exporter = PlaintextExporter::new(registry, config.prefix.clone());
    let mut interval = tokio::time::interval(config.export_interval);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match push_once(&exporter, &config.endpoint).await {
                    Ok(lines) => debug!(lines, "Pushed metrics to Graphite"),
                    Err(e) => warn!(error = %e, "Graphite push failed"),
                }
            }
            _ = shutdown.recv() => {
                info!("Graphite exporter shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// Write one snapshot over a fresh connection; returns the number of lines sent.
pub async fn push_once(exporter: &PlaintextExporter, endpoint: &str) -> Result<usize> {
    let payload = exporter.render_metrics();

    let mut stream = TcpStream::connect(endpoint)
        .await
        .map_err(|e| LagscopeError::Export(format!("connect to {endpoint}: {e}")))?;
    stream.write_all(payload.as_bytes()).await?;
    stream.shutdown().await?;

    Ok(payload.lines().count())
}
