//! Collection cycles: discover work items, invoke the external tool or store
//! for each one, parse, aggregate and publish. A failed item is reported and
//! skipped; it never ends the cycle.

pub mod consumer_groups;
pub mod manager;
pub mod offset_checker;
pub mod sidekiq;

use crate::config::{CollectorConfig, ExporterConfig};
use crate::error::Result;
use crate::lag::calculator::LagCalculator;
use crate::lag::parser::{ConsumerLagRecord, ParsedOutput};
use crate::metrics::sink::MetricSink;
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

#[async_trait::async_trait]
pub trait Collector: Send + Sync {
    fn name(&self) -> &str;

    /// Run one full cycle, publishing into `sink`. Per-item failures are
    /// part of the returned report; `Err` is reserved for failures that
    /// make the whole cycle pointless (an unreachable store).
    async fn collect_once(&self, sink: &dyn MetricSink) -> Result<CycleReport>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// The tool or store gave no usable result for the item.
    InvocationFailure(String),
    /// The item's records could not be aggregated.
    ScopeFailure(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Published { metrics: usize },
    Skipped { reason: SkipReason },
}

impl ItemOutcome {
    pub const fn skipped(reason: SkipReason) -> Self {
        Self::Skipped { reason }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    pub item: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

/// What happened during one cycle of one collector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub collector: String,
    /// Work items found by discovery.
    pub discovered: usize,
    pub items: Vec<ItemReport>,
    /// Output lines that did not parse into a record.
    pub skipped_lines: usize,
}

impl CycleReport {
    pub fn new(collector: impl Into<String>) -> Self {
        Self {
            collector: collector.into(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, item: impl Into<String>, outcome: ItemOutcome) {
        self.items.push(ItemReport {
            item: item.into(),
            outcome,
        });
    }

    pub fn published_metrics(&self) -> usize {
        self.items
            .iter()
            .map(|i| match i.outcome {
                ItemOutcome::Published { metrics } => metrics,
                ItemOutcome::Skipped { .. } => 0,
            })
            .sum()
    }

    pub fn skipped_items(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, ItemOutcome::Skipped { .. }))
            .count()
    }

    #[cfg(test)]
    pub fn outcome(&self, item: &str) -> Option<&ItemOutcome> {
        self.items.iter().find(|i| i.item == item).map(|i| &i.outcome)
    }
}

/// Aggregate one scope's parsed records and publish them.
pub(crate) fn publish_scope(
    item: &str,
    parsed: ParsedOutput,
    keep: impl Fn(&ConsumerLagRecord) -> bool,
    emit_totals: bool,
    sink: &dyn MetricSink,
    report: &mut CycleReport,
) -> ItemOutcome {
    report.skipped_lines += parsed.skipped_lines;
    let records: Vec<ConsumerLagRecord> = parsed.records.into_iter().filter(keep).collect();

    match LagCalculator::calculate_scope(&records, emit_totals) {
        Ok(scope) => {
            scope.publish(sink);
            ItemOutcome::Published {
                metrics: scope.metric_count(),
            }
        }
        Err(e) => {
            warn!(item, error = %e, "Failed to aggregate scope, skipping");
            ItemOutcome::skipped(SkipReason::ScopeFailure(e.to_string()))
        }
    }
}

/// Build the collector described by `config` with its production collaborators.
/// Tool invocations are bounded so they time out within the exporter's cycle.
pub fn build(config: &CollectorConfig, exporter: &ExporterConfig) -> Result<Box<dyn Collector>> {
    let command_timeout = |configured: Duration| {
        let bounded = exporter.command_timeout(configured);
        if bounded < configured {
            warn!(
                collector = config.name(),
                configured = ?configured,
                applied = ?bounded,
                "command_timeout exceeds half the collection timeout; capping it"
            );
        }
        bounded
    };

    let collector: Box<dyn Collector> = match config {
        CollectorConfig::OffsetChecker(c) => Box::new(offset_checker::OffsetCheckerCollector::new(
            c,
            command_timeout(c.command_timeout),
        )?),
        CollectorConfig::ConsumerGroups(c) => Box::new(consumer_groups::ConsumerGroupsCollector::new(
            c,
            command_timeout(c.command_timeout),
        )?),
        CollectorConfig::Sidekiq(c) => Box::new(sidekiq::SidekiqCollector::new(c)),
    };
    Ok(collector)
}
