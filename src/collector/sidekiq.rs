use super::{Collector, CycleReport, ItemOutcome, SkipReason};
use crate::config::SidekiqConfig;
use crate::error::{LagscopeError, Result};
use crate::metrics::sink::MetricSink;
use crate::queue::depth::QueueDepthReader;
use crate::queue::redis_store::RedisConnector;
use crate::queue::{QueueStore, QueueStoreConnector};
use std::sync::Arc;
use tracing::{error, instrument};

/// Queue depths per configured Redis db.
pub struct SidekiqCollector {
    name: String,
    connector: Arc<dyn QueueStoreConnector>,
    dbs: Vec<i64>,
    reader: QueueDepthReader,
}

impl SidekiqCollector {
    pub fn new(config: &SidekiqConfig) -> Self {
        Self::with_connector(config, Arc::new(RedisConnector::new(config)))
    }

    pub fn with_connector(config: &SidekiqConfig, connector: Arc<dyn QueueStoreConnector>) -> Self {
        Self {
            name: config.name.clone(),
            connector,
            dbs: config.dbs.clone(),
            reader: QueueDepthReader::new(config.cluster_prefix.clone()),
        }
    }

    /// Connect to every db before any read so an unreachable store publishes
    /// nothing for the whole cycle.
    async fn connect_all(&self) -> Result<Vec<(i64, Box<dyn QueueStore>)>> {
        let mut stores = Vec::with_capacity(self.dbs.len());
        for &db in &self.dbs {
            match self.connector.connect(db).await {
                Ok(store) => stores.push((db, store)),
                Err(e) => {
                    error!(db, error = %e, "Queue store unreachable, abandoning cycle");
                    return Err(LagscopeError::Setup(format!("db {db}: {e}")));
                }
            }
        }
        Ok(stores)
    }
}

#[async_trait::async_trait]
impl Collector for SidekiqCollector {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, sink), fields(collector = %self.name))]
    async fn collect_once(&self, sink: &dyn MetricSink) -> Result<CycleReport> {
        let stores = self.connect_all().await?;
        let mut report = CycleReport::new(&self.name);

        for (db, store) in stores {
            let depths = self.reader.read(db, store.as_ref()).await;
            report.discovered += depths.records.len() + depths.failures.len();

            for record in &depths.records {
                report.record(
                    format!("{db}/{}", record.queue_name),
                    ItemOutcome::Published { metrics: 1 },
                );
            }
            for (key, e) in &depths.failures {
                report.record(
                    format!("{db}/{key}"),
                    ItemOutcome::skipped(SkipReason::InvocationFailure(e.to_string())),
                );
            }

            self.reader.publish(&depths.records, sink);
        }

        Ok(report)
    }
}
