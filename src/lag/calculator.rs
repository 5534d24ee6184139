use crate::error::{LagscopeError, Result};
use crate::lag::parser::ConsumerLagRecord;
use crate::metrics::naming::MetricName;
use crate::metrics::sink::MetricSink;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionLagMetric {
    pub name: MetricName,
    pub lag: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TotalLagMetric {
    pub name: MetricName,
    pub lag: i64,
}

/// Lag values derived from one scope: the records of a single
/// consumer-group (and topic) invocation.
#[derive(Debug, Clone, Default)]
pub struct ScopeLag {
    pub partition_metrics: Vec<PartitionLagMetric>,
    /// `None` when totals are disabled or the scope had no records.
    pub total: Option<TotalLagMetric>,
}

pub struct LagCalculator;

impl LagCalculator {
    /// Calculate per-partition lag and, when `emit_total` is set, the summed
    /// lag of the scope. The total is named after the first record; records
    /// with a different topic are summed under that name all the same.
    pub fn calculate_scope(records: &[ConsumerLagRecord], emit_total: bool) -> Result<ScopeLag> {
        let partition_metrics = records
            .iter()
            .map(|r| PartitionLagMetric {
                name: MetricName::partition_lag(
                    r.cluster_name.as_deref(),
                    &r.consumer_group,
                    &r.topic,
                    &r.partition,
                ),
                lag: r.lag,
            })
            .collect();

        let total = match records.first() {
            Some(first) if emit_total => {
                let lag = records.iter().try_fold(0i64, |acc, r| {
                    acc.checked_add(r.lag).ok_or_else(|| {
                        LagscopeError::Scope(format!(
                            "total lag overflow for group '{}' topic '{}'",
                            first.consumer_group, first.topic
                        ))
                    })
                })?;
                Some(TotalLagMetric {
                    name: MetricName::total_lag(
                        first.cluster_name.as_deref(),
                        &first.consumer_group,
                        &first.topic,
                    ),
                    lag,
                })
            }
            _ => None,
        };

        Ok(ScopeLag {
            partition_metrics,
            total,
        })
    }
}

impl ScopeLag {
    /// Number of values `publish` emits.
    pub fn metric_count(&self) -> usize {
        self.partition_metrics.len() + usize::from(self.total.is_some())
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn publish(&self, sink: &dyn MetricSink) {
        for m in &self.partition_metrics {
            sink.publish_metric(&m.name, m.lag as f64);
        }
        if let Some(total) = &self.total {
            sink.publish_metric(&total.name, total.lag as f64);
        }
    }
}
