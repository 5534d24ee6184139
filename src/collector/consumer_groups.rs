use super::{publish_scope, Collector, CycleReport, ItemOutcome, SkipReason};
use crate::command::{CommandRunner, ProcessRunner};
use crate::config::{CompiledFilters, ConsumerGroupsConfig, DescribeFormat};
use crate::error::Result;
use crate::lag::parser::{parse_group_list, parse_output};
use crate::metrics::naming::sanitize_cluster_name;
use crate::metrics::sink::MetricSink;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const NEW_CONSUMER_FLAG: &str = "--new-consumer";

/// Lag collection through `kafka-consumer-groups.sh --describe`, one
/// invocation per consumer group.
pub struct ConsumerGroupsCollector {
    name: String,
    runner: Arc<dyn CommandRunner>,
    bootstrap_servers: String,
    cluster_name: Option<String>,
    consumer_groups: Vec<String>,
    format: DescribeFormat,
    emit_totals: bool,
    filters: CompiledFilters,
}

impl ConsumerGroupsCollector {
    pub fn new(config: &ConsumerGroupsConfig, command_timeout: Duration) -> Result<Self> {
        let runner = Arc::new(ProcessRunner::new(&config.bin, command_timeout));
        Self::with_runner(config, runner)
    }

    pub fn with_runner(config: &ConsumerGroupsConfig, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        Ok(Self {
            name: config.name.clone(),
            runner,
            bootstrap_servers: config.bootstrap_servers.join(","),
            cluster_name: config.cluster_name.as_deref().and_then(sanitize_cluster_name),
            consumer_groups: config.consumer_groups.clone(),
            format: config.format,
            emit_totals: config.emit_totals,
            filters: config.filters.compile()?,
        })
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = vec!["--bootstrap-server".to_string(), self.bootstrap_servers.clone()];
        if self.format.needs_new_consumer_flag() {
            args.push(NEW_CONSUMER_FLAG.to_string());
        }
        args
    }

    async fn discover_groups(&self) -> Vec<String> {
        let groups = if self.consumer_groups.is_empty() {
            let mut args = self.base_args();
            args.push("--list".to_string());
            match self.runner.run(&args).await {
                Some(output) => parse_group_list(&output.stdout),
                None => {
                    warn!(collector = %self.name, "Consumer group listing failed");
                    Vec::new()
                }
            }
        } else {
            self.consumer_groups.clone()
        };

        groups
            .into_iter()
            .filter(|g| self.filters.matches_group(g))
            .collect()
    }

    async fn collect_group(&self, group: &str, sink: &dyn MetricSink, report: &mut CycleReport) -> ItemOutcome {
        let mut args = self.base_args();
        args.extend(["--describe", "--group", group].map(String::from));

        let Some(output) = self.runner.run(&args).await else {
            warn!(group, "Describe produced no output, skipping");
            return ItemOutcome::skipped(SkipReason::InvocationFailure(format!(
                "describe failed for group '{group}'"
            )));
        };

        if !output.stderr.trim().is_empty() {
            debug!(group, stderr = %output.stderr.trim(), "Describe wrote to stderr");
        }
        let parsed = parse_output(
            self.format.parser_variant(),
            &output.stdout,
            self.cluster_name.as_deref(),
        );
        publish_scope(
            group,
            parsed,
            |r| self.filters.matches_topic(&r.topic),
            self.emit_totals,
            sink,
            report,
        )
    }
}

#[async_trait::async_trait]
impl Collector for ConsumerGroupsCollector {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, sink), fields(collector = %self.name))]
    async fn collect_once(&self, sink: &dyn MetricSink) -> Result<CycleReport> {
        let mut report = CycleReport::new(&self.name);

        let groups = self.discover_groups().await;
        report.discovered = groups.len();
        if groups.is_empty() {
            debug!("No consumer groups to describe this cycle");
            return Ok(report);
        }

        for group in &groups {
            let outcome = self.collect_group(group, sink, &mut report).await;
            report.record(group.as_str(), outcome);
        }

        Ok(report)
    }
}
