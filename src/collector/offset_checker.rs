use super::{publish_scope, Collector, CycleReport, ItemOutcome, SkipReason};
use crate::command::{CommandRunner, ProcessRunner};
use crate::config::{CompiledFilters, OffsetCheckerConfig};
use crate::error::Result;
use crate::lag::parser::{parse_output, parse_topic_list, ParserVariant};
use crate::metrics::naming::{cluster_from_connect_string, sanitize_cluster_name};
use crate::metrics::sink::MetricSink;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const TOPIC_COMMAND: &str = "kafka.admin.TopicCommand";
const OFFSET_CHECKER: &str = "kafka.tools.ConsumerOffsetChecker";

/// Lag collection through the ZooKeeper based `ConsumerOffsetChecker`. One
/// invocation per (topic, group) pair; every pair gets a total.
pub struct OffsetCheckerCollector {
    name: String,
    runner: Arc<dyn CommandRunner>,
    zookeeper: String,
    cluster_name: Option<String>,
    consumer_groups: Vec<String>,
    topics: Vec<String>,
    filters: CompiledFilters,
}

impl OffsetCheckerCollector {
    pub fn new(config: &OffsetCheckerConfig, command_timeout: Duration) -> Result<Self> {
        let runner = Arc::new(ProcessRunner::new(&config.bin, command_timeout));
        Self::with_runner(config, runner)
    }

    pub fn with_runner(config: &OffsetCheckerConfig, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        let zookeeper = config.zookeeper.join(",");
        let cluster_name = config
            .cluster_name
            .as_deref()
            .and_then(sanitize_cluster_name)
            .or_else(|| cluster_from_connect_string(&zookeeper));

        Ok(Self {
            name: config.name.clone(),
            runner,
            zookeeper,
            cluster_name,
            consumer_groups: config.consumer_groups.clone(),
            topics: config.topics.clone(),
            filters: config.filters.compile()?,
        })
    }

    pub fn cluster_name(&self) -> Option<&str> {
        self.cluster_name.as_deref()
    }

    /// Configured topics, or every topic the cluster lists. A failed listing
    /// yields no topics.
    async fn discover_topics(&self) -> Vec<String> {
        let topics = if self.topics.is_empty() {
            let args = [TOPIC_COMMAND, "--list", "--zookeeper", self.zookeeper.as_str()].map(String::from);
            match self.runner.run(&args).await {
                Some(output) => parse_topic_list(&output.stdout),
                None => {
                    warn!(collector = %self.name, "Topic listing failed");
                    Vec::new()
                }
            }
        } else {
            self.topics.clone()
        };

        topics
            .into_iter()
            .filter(|t| self.filters.matches_topic(t))
            .collect()
    }

    async fn collect_scope(
        &self,
        group: &str,
        topic: &str,
        sink: &dyn MetricSink,
        report: &mut CycleReport,
    ) -> ItemOutcome {
        let args = [
            OFFSET_CHECKER,
            "--group",
            group,
            "--topic",
            topic,
            "--zookeeper",
            self.zookeeper.as_str(),
        ]
        .map(String::from);

        let Some(output) = self.runner.run(&args).await else {
            warn!(group, topic, "Offset checker produced no output, skipping");
            return ItemOutcome::skipped(SkipReason::InvocationFailure(format!(
                "{OFFSET_CHECKER} failed for group '{group}' topic '{topic}'"
            )));
        };

        if !output.stderr.trim().is_empty() {
            debug!(group, topic, stderr = %output.stderr.trim(), "Offset checker wrote to stderr");
        }
        let parsed = parse_output(ParserVariant::LegacyA, &output.stdout, self.cluster_name());
        publish_scope(&format!("{group}/{topic}"), parsed, |_| true, true, sink, report)
    }
}

#[async_trait::async_trait]
impl Collector for OffsetCheckerCollector {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, sink), fields(collector = %self.name))]
    async fn collect_once(&self, sink: &dyn MetricSink) -> Result<CycleReport> {
        let mut report = CycleReport::new(&self.name);

        let topics = self.discover_topics().await;
        let groups: Vec<&String> = self
            .consumer_groups
            .iter()
            .filter(|g| self.filters.matches_group(g))
            .collect();
        report.discovered = topics.len() * groups.len();

        if report.discovered == 0 {
            debug!("Nothing to collect this cycle");
            return Ok(report);
        }

        for topic in &topics {
            for group in &groups {
                let outcome = self.collect_scope(group, topic, sink, &mut report).await;
                report.record(format!("{group}/{topic}"), outcome);
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::scripted::ScriptedRunner;
    use crate::lag::parser::fixtures::OFFSET_CHECKER_OUTPUT;
    use crate::metrics::sink::testing::RecordingSink;

    const ZK: &str = "192.168.1.101:2181,192.168.1.102:2181/dev/test-01";

    fn config(extra: &str) -> OffsetCheckerConfig {
        toml::from_str(&format!(
            r#"
name = "legacy"
zookeeper = ["192.168.1.101:2181", "192.168.1.102:2181/dev/test-01"]
consumer_groups = ["stage_nginx_access"]
{extra}
"#
        ))
        .unwrap()
    }

    fn checker_args<'a>(group: &'a str, topic: &'a str, zk: &'a str) -> [&'a str; 7] {
        [OFFSET_CHECKER, "--group", group, "--topic", topic, "--zookeeper", zk]
    }

    #[tokio::test]
    async fn test_publishes_partitions_and_total_with_cluster() {
        let runner = ScriptedRunner::new()
            .respond(&[TOPIC_COMMAND, "--list", "--zookeeper", ZK], "nginx_access\n")
            .respond(
                &checker_args("stage_nginx_access", "nginx_access", ZK),
                OFFSET_CHECKER_OUTPUT,
            );
        let collector = OffsetCheckerCollector::with_runner(&config(""), Arc::new(runner)).unwrap();
        let sink = RecordingSink::new();

        let report = collector.collect_once(&sink).await.unwrap();

        assert_eq!(collector.cluster_name(), Some("dev_test_01"));
        assert_eq!(report.discovered, 1);
        assert_eq!(sink.published().len(), 12);
        for partition in 0..=10 {
            assert!(
                sink.get(&format!("dev_test_01.stage_nginx_access.nginx_access.{partition}"))
                    .is_some()
            );
        }
        assert_eq!(sink.get("dev_test_01.stage_nginx_access.nginx_access.1"), Some(2.0));
        assert_eq!(sink.get("dev_test_01.stage_nginx_access.nginx_access.7"), Some(52.0));
        assert_eq!(sink.get("dev_test_01.stage_nginx_access.nginx_access.total"), Some(54.0));
        assert_eq!(
            report.outcome("stage_nginx_access/nginx_access"),
            Some(&ItemOutcome::Published { metrics: 12 })
        );
    }

    #[tokio::test]
    async fn test_names_omit_cluster_without_chroot() {
        let cfg: OffsetCheckerConfig = toml::from_str(
            r#"
name = "legacy"
zookeeper = ["localhost:2181"]
consumer_groups = ["stage_nginx_access"]
topics = ["nginx_access"]
"#,
        )
        .unwrap();
        let runner = ScriptedRunner::new().respond(
            &checker_args("stage_nginx_access", "nginx_access", "localhost:2181"),
            OFFSET_CHECKER_OUTPUT,
        );
        let collector = OffsetCheckerCollector::with_runner(&cfg, Arc::new(runner)).unwrap();
        let sink = RecordingSink::new();

        collector.collect_once(&sink).await.unwrap();

        assert_eq!(collector.cluster_name(), None);
        assert_eq!(sink.get("stage_nginx_access.nginx_access.0"), Some(0.0));
        assert_eq!(sink.get("stage_nginx_access.nginx_access.total"), Some(54.0));
    }

    #[tokio::test]
    async fn test_configured_cluster_name_wins() {
        let collector = OffsetCheckerCollector::with_runner(
            &config(r#"cluster_name = "prod/main-a""#),
            Arc::new(ScriptedRunner::new()),
        )
        .unwrap();
        assert_eq!(collector.cluster_name(), Some("prod_main_a"));
    }

    #[tokio::test]
    async fn test_failed_invocation_skips_item_and_continues() {
        let runner = ScriptedRunner::new()
            .respond(
                &[TOPIC_COMMAND, "--list", "--zookeeper", ZK],
                "broken\nnginx_access\n",
            )
            .respond(
                &checker_args("stage_nginx_access", "nginx_access", ZK),
                OFFSET_CHECKER_OUTPUT,
            );
        let collector = OffsetCheckerCollector::with_runner(&config(""), Arc::new(runner)).unwrap();
        let sink = RecordingSink::new();

        let report = collector.collect_once(&sink).await.unwrap();

        assert_eq!(report.discovered, 2);
        assert_eq!(report.skipped_items(), 1);
        assert!(matches!(
            report.outcome("stage_nginx_access/broken"),
            Some(ItemOutcome::Skipped {
                reason: SkipReason::InvocationFailure(_)
            })
        ));
        assert_eq!(sink.get("dev_test_01.stage_nginx_access.nginx_access.total"), Some(54.0));
    }

    #[tokio::test]
    async fn test_failed_topic_listing_ends_cycle_quietly() {
        let runner = Arc::new(ScriptedRunner::new());
        let collector = OffsetCheckerCollector::with_runner(&config(""), runner.clone()).unwrap();
        let sink = RecordingSink::new();

        let report = collector.collect_once(&sink).await.unwrap();

        assert_eq!(report.discovered, 0);
        assert!(report.items.is_empty());
        assert!(sink.published().is_empty());
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_internal_and_filtered_topics_are_not_checked() {
        let runner = Arc::new(ScriptedRunner::new().respond(
            &[TOPIC_COMMAND, "--list", "--zookeeper", ZK],
            "__consumer_offsets\nold_topic - marked for deletion\ndebug_events\nnginx_access\n",
        ));
        let collector = OffsetCheckerCollector::with_runner(
            &config("[filters]\ntopic_blacklist = [\"^debug_\"]"),
            runner.clone(),
        )
        .unwrap();

        let report = collector.collect_once(&RecordingSink::new()).await.unwrap();

        assert_eq!(report.discovered, 1);
        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1][4], "nginx_access");
    }
}
