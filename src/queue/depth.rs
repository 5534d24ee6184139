use crate::error::LagscopeError;
use crate::metrics::definitions::{QUEUES_KEY, RETRY_KEY, SCHEDULE_KEY};
use crate::metrics::naming::MetricName;
use crate::metrics::sink::MetricSink;
use crate::queue::QueueStore;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDepthRecord {
    pub db_index: i64,
    pub queue_name: String,
    pub length: u64,
}

impl QueueDepthRecord {
    pub fn metric_name(&self, cluster_prefix: Option<&str>) -> MetricName {
        MetricName::queue_depth(cluster_prefix, self.db_index, &self.queue_name)
    }
}

/// Outcome of reading one database.
#[derive(Debug, Default)]
pub struct DbDepths {
    pub records: Vec<QueueDepthRecord>,
    /// Keys whose read failed, with the failure.
    pub failures: Vec<(String, LagscopeError)>,
}

pub struct QueueDepthReader {
    cluster_prefix: Option<String>,
}

impl QueueDepthReader {
    pub fn new(cluster_prefix: Option<String>) -> Self {
        Self {
            cluster_prefix: cluster_prefix.filter(|c| !c.is_empty()),
        }
    }

    /// Read the length of every queue listed in the `queues` set, then the
    /// `schedule` and `retry` cardinalities. The two sorted sets are read
    /// even when the `queues` set is empty or unreadable.
    pub async fn read(&self, db: i64, store: &dyn QueueStore) -> DbDepths {
        let mut depths = DbDepths::default();

        match store.members(QUEUES_KEY).await {
            Ok(mut queues) => {
                queues.sort();
                for queue in queues {
                    match store.list_length(&queue).await {
                        Ok(length) => depths.records.push(QueueDepthRecord {
                            db_index: db,
                            queue_name: queue,
                            length,
                        }),
                        Err(e) => {
                            warn!(db, queue = %queue, error = %e, "Failed to read queue length");
                            depths.failures.push((queue, e));
                        }
                    }
                }
            }
            Err(e) => {
                warn!(db, error = %e, "Failed to read queue names");
                depths.failures.push((QUEUES_KEY.to_string(), e));
            }
        }

        for key in [SCHEDULE_KEY, RETRY_KEY] {
            match store.sorted_set_cardinality(key).await {
                Ok(length) => depths.records.push(QueueDepthRecord {
                    db_index: db,
                    queue_name: key.to_string(),
                    length,
                }),
                Err(e) => {
                    warn!(db, key, error = %e, "Failed to read sorted set cardinality");
                    depths.failures.push((key.to_string(), e));
                }
            }
        }

        depths
    }

    /// Publish every record, zero lengths included.
    #[allow(clippy::cast_precision_loss)]
    pub fn publish(&self, records: &[QueueDepthRecord], sink: &dyn MetricSink) {
        for record in records {
            sink.publish_metric(
                &record.metric_name(self.cluster_prefix.as_deref()),
                record.length as f64,
            );
        }
    }
}
