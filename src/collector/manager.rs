use crate::collector::{Collector, CycleReport};
use crate::config::ExporterConfig;
use crate::error::{LagscopeError, Result};
use crate::metrics::registry::MetricsRegistry;
use crate::metrics::sink::BufferedSink;
use crate::metrics::types::MetricPoint;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

/// Consecutive failed cycles before the exporter reports unhealthy and backs off.
const ERROR_THRESHOLD: u32 = 3;

/// Drives one collector: a cycle per tick, never two at once.
pub struct CollectorManager {
    name: String,
    path: String,
    collector: Box<dyn Collector>,
    registry: Arc<MetricsRegistry>,
    poll_interval: Duration,
    max_backoff: Duration,
    collection_timeout: Duration,
}

impl CollectorManager {
    pub fn new(
        collector: Box<dyn Collector>,
        path: &str,
        registry: Arc<MetricsRegistry>,
        exporter_config: &ExporterConfig,
    ) -> Self {
        let collection_timeout = exporter_config.collection_timeout();

        debug!(
            collector = collector.name(),
            poll_interval = ?exporter_config.poll_interval,
            collection_timeout = ?collection_timeout,
            "Created collector manager"
        );

        Self {
            name: collector.name().to_string(),
            path: path.to_string(),
            collector,
            registry,
            poll_interval: exporter_config.poll_interval,
            max_backoff: Duration::from_secs(300),
            collection_timeout,
        }
    }

    #[instrument(skip(self, shutdown), fields(collector = %self.name))]
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!("Starting collection loop");

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut consecutive_errors = 0u32;
        let mut current_backoff = Duration::from_secs(1);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.collect_once().await {
                        Ok(_) => {
                            consecutive_errors = 0;
                            current_backoff = Duration::from_secs(1);
                            self.registry.set_healthy(true);
                        }
                        Err(e) => {
                            consecutive_errors += 1;
                            error!(
                                error = %e,
                                consecutive_errors = consecutive_errors,
                                "Collection failed"
                            );

                            if consecutive_errors >= ERROR_THRESHOLD {
                                self.registry.set_healthy(false);

                                let backoff = current_backoff.min(self.max_backoff);
                                warn!(
                                    backoff_secs = backoff.as_secs(),
                                    "Applying backoff due to consecutive errors"
                                );

                                tokio::select! {
                                    () = tokio::time::sleep(backoff) => {}
                                    _ = shutdown.recv() => {
                                        info!("Received shutdown signal");
                                        break;
                                    }
                                }
                                current_backoff = (current_backoff * 2).min(self.max_backoff);
                            }
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        self.registry.remove_collector(&self.name);
        info!("Collection loop stopped");
    }

    /// Run one cycle bounded by the collection timeout and commit its points
    /// to the registry.
    ///
    /// A failed cycle leaves the previous cycle's points in place until they
    /// go stale. A cycle cut off by the timeout commits whatever it published
    /// before the cutoff and still counts as failed.
    #[instrument(skip(self))]
    pub async fn collect_once(&self) -> Result<CycleReport> {
        let start = Instant::now();
        let sink = BufferedSink::new();

        let outcome =
            tokio::time::timeout(self.collection_timeout, self.collector.collect_once(&sink)).await;

        match outcome {
            Ok(Ok(report)) => {
                self.commit(sink.into_points(), start);
                if report.skipped_items() > 0 {
                    warn!(
                        skipped = report.skipped_items(),
                        discovered = report.discovered,
                        "Some items were skipped this cycle"
                    );
                }
                debug!(
                    discovered = report.discovered,
                    metrics = report.published_metrics(),
                    skipped_lines = report.skipped_lines,
                    "Collection cycle completed, took {} seconds",
                    start.elapsed().as_secs_f32()
                );
                self.registry.record_report(report.clone());
                Ok(report)
            }
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => {
                let points = sink.into_points();
                if !points.is_empty() {
                    warn!(
                        points = points.len(),
                        "Collection cycle timed out, keeping the points published before the cutoff"
                    );
                    self.commit(points, start);
                }
                Err(LagscopeError::Timeout(format!(
                    "collection cycle exceeded {}s",
                    self.collection_timeout.as_secs_f64()
                )))
            }
        }
    }

    fn commit(&self, points: Vec<MetricPoint>, start: Instant) {
        self.registry.begin_cycle(&self.name, &self.path);
        self.registry.push_points(&self.name, points);
        self.registry.finish_cycle(&self.name);

        #[allow(clippy::cast_possible_truncation)]
        let scrape_duration_ms = start.elapsed().as_millis() as u64;
        self.registry.set_scrape_duration_ms(scrape_duration_ms);
    }
}

impl std::fmt::Debug for CollectorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorManager")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}
