use crate::error::{LagscopeError, Result};
use crate::lag::parser::ParserVariant;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub exporter: ExporterConfig,
    pub collectors: Vec<CollectorConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExporterConfig {
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_http_host")]
    pub http_host: String,
    #[serde(default)]
    pub graphite: GraphiteConfig,
}

/// Push exporter writing the Graphite plaintext protocol to a carbon endpoint.
#[derive(Debug, Deserialize, Clone)]
pub struct GraphiteConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_graphite_endpoint")]
    pub endpoint: String,
    #[serde(with = "humantime_serde", default = "default_export_interval")]
    pub export_interval: Duration,
    /// Dotted prefix prepended to every line, e.g. `servers.web01`.
    #[serde(default)]
    pub prefix: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CollectorConfig {
    OffsetChecker(OffsetCheckerConfig),
    ConsumerGroups(ConsumerGroupsConfig),
    Sidekiq(SidekiqConfig),
}

/// Legacy ZooKeeper based `ConsumerOffsetChecker` collection.
#[derive(Debug, Deserialize, Clone)]
pub struct OffsetCheckerConfig {
    pub name: String,
    #[serde(default = "default_kafka_path")]
    pub path: String,
    #[serde(default = "default_run_class_bin")]
    pub bin: String,
    #[serde(default = "default_zookeeper")]
    pub zookeeper: Vec<String>,
    #[serde(default)]
    pub consumer_groups: Vec<String>,
    /// Static topic list. Empty means discover via `TopicCommand --list`.
    #[serde(default)]
    pub topics: Vec<String>,
    /// Overrides the cluster token derived from the zookeeper chroot path.
    #[serde(default)]
    pub cluster_name: Option<String>,
    #[serde(with = "humantime_serde", default = "default_command_timeout")]
    pub command_timeout: Duration,
    #[serde(default)]
    pub filters: FilterConfig,
}

/// `kafka-consumer-groups.sh` based collection.
#[derive(Debug, Deserialize, Clone)]
pub struct ConsumerGroupsConfig {
    pub name: String,
    #[serde(default = "default_kafka_path")]
    pub path: String,
    #[serde(default = "default_consumer_groups_bin")]
    pub bin: String,
    #[serde(default = "default_bootstrap_servers")]
    pub bootstrap_servers: Vec<String>,
    #[serde(default)]
    pub cluster_name: Option<String>,
    /// Static group list. Empty means discover via `--list`.
    #[serde(default)]
    pub consumer_groups: Vec<String>,
    #[serde(default)]
    pub format: DescribeFormat,
    #[serde(default)]
    pub emit_totals: bool,
    #[serde(with = "humantime_serde", default = "default_command_timeout")]
    pub command_timeout: Duration,
    #[serde(default)]
    pub filters: FilterConfig,
}

/// Output layout of `kafka-consumer-groups.sh --describe`, which differs per Kafka release.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DescribeFormat {
    /// 0.9/0.10 `--new-consumer` output, comma separated, group first.
    #[default]
    LegacyDescribe,
    /// Whitespace separated, group last, header carries `CLIENT-ID`.
    NewConsumer,
    /// Whitespace separated, group first.
    GroupFirst,
}

impl DescribeFormat {
    pub const fn parser_variant(self) -> ParserVariant {
        match self {
            Self::LegacyDescribe => ParserVariant::LegacyB,
            Self::NewConsumer => ParserVariant::NewConsumerA,
            Self::GroupFirst => ParserVariant::NewConsumerB,
        }
    }

    /// Only the 0.9/0.10 tool needs `--new-consumer` to talk to the brokers.
    pub const fn needs_new_consumer_flag(self) -> bool {
        matches!(self, Self::LegacyDescribe)
    }
}

/// Sidekiq queue depths read from Redis.
#[derive(Debug, Deserialize, Clone)]
pub struct SidekiqConfig {
    pub name: String,
    #[serde(default = "default_sidekiq_path")]
    pub path: String,
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_dbs")]
    pub dbs: Vec<i64>,
    #[serde(default = "default_sentinel_port")]
    pub sentinel_port: u16,
    /// Sentinel master name. Sentinel discovery is only used when set.
    #[serde(default)]
    pub sentinel_name: Option<String>,
    #[serde(default)]
    pub cluster_prefix: Option<String>,
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilterConfig {
    #[serde(default = "default_whitelist")]
    pub group_whitelist: Vec<String>,
    #[serde(default)]
    pub group_blacklist: Vec<String>,
    #[serde(default = "default_whitelist")]
    pub topic_whitelist: Vec<String>,
    #[serde(default)]
    pub topic_blacklist: Vec<String>,
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_http_port() -> u16 {
    8000
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_graphite_endpoint() -> String {
    "localhost:2003".to_string()
}

fn default_export_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_kafka_path() -> String {
    "kafka.ConsumerLag".to_string()
}

fn default_run_class_bin() -> String {
    "/opt/kafka/bin/kafka-run-class.sh".to_string()
}

fn default_consumer_groups_bin() -> String {
    "/opt/kafka/bin/kafka-consumer-groups.sh".to_string()
}

fn default_zookeeper() -> Vec<String> {
    vec!["localhost:2181".to_string()]
}

fn default_bootstrap_servers() -> Vec<String> {
    vec!["localhost:9092".to_string()]
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_sidekiq_path() -> String {
    "sidekiq".to_string()
}

fn default_redis_host() -> String {
    "localhost".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_dbs() -> Vec<i64> {
    vec![0]
}

fn default_sentinel_port() -> u16 {
    26379
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_whitelist() -> Vec<String> {
    vec![".*".to_string()]
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            http_port: default_http_port(),
            http_host: default_http_host(),
            graphite: GraphiteConfig::default(),
        }
    }
}

/// Default timeout for a single collection cycle (should be less than `poll_interval`)
const DEFAULT_COLLECTION_TIMEOUT: Duration = Duration::from_secs(60);

impl ExporterConfig {
    /// Upper bound of one collection cycle. Leaves headroom so a slow cycle
    /// ends before the next tick.
    pub fn collection_timeout(&self) -> Duration {
        if self.poll_interval > Duration::from_secs(10) {
            self.poll_interval.saturating_sub(Duration::from_secs(5))
        } else {
            DEFAULT_COLLECTION_TIMEOUT.min(self.poll_interval)
        }
    }

    /// Per-invocation timeout actually applied to a tool run: the configured
    /// value, capped at half the cycle timeout so a hung invocation is
    /// skipped as one item while the cycle still has time for the rest.
    pub fn command_timeout(&self, configured: Duration) -> Duration {
        configured.min(self.collection_timeout() / 2)
    }
}

impl Default for GraphiteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_graphite_endpoint(),
            export_interval: default_export_interval(),
            prefix: None,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            group_whitelist: default_whitelist(),
            group_blacklist: Vec::new(),
            topic_whitelist: default_whitelist(),
            topic_blacklist: Vec::new(),
        }
    }
}

impl Config {
    pub fn load(path: Option<&str>) -> Result<Config> {
        let config_path = path.unwrap_or("config.toml");

        if !Path::new(config_path).exists() {
            return Err(LagscopeError::Config(format!(
                "Configuration file not found: {}",
                config_path
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Config> {
        let content = Self::substitute_env_vars(content)?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| LagscopeError::Config(format!("TOML parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    fn substitute_env_vars(content: &str) -> Result<String> {
        // Supports:
        // - ${VAR} - replaced with env var value, empty string if not set
        // - ${VAR:-default} - replaced with env var value, or "default" if not set
        // - ${?VAR} - same as ${VAR}
        let re = Regex::new(r"\$\{\??([^}:-]+)(?::-([^}]*))?\}")?;
        Ok(re
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                let default_value = caps.get(2).map(|m| m.as_str()).unwrap_or("");
                std::env::var(var_name).unwrap_or_else(|_| default_value.to_string())
            })
            .to_string())
    }

    pub fn validate(&self) -> Result<()> {
        if self.collectors.is_empty() {
            return Err(LagscopeError::Config(
                "At least one collector must be configured".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for collector in &self.collectors {
            collector.validate()?;
            if !names.insert(collector.name()) {
                return Err(LagscopeError::Config(format!(
                    "Duplicate collector name '{}'",
                    collector.name()
                )));
            }
        }

        Ok(())
    }
}

impl CollectorConfig {
    pub fn name(&self) -> &str {
        match self {
            Self::OffsetChecker(c) => &c.name,
            Self::ConsumerGroups(c) => &c.name,
            Self::Sidekiq(c) => &c.name,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::OffsetChecker(c) => &c.path,
            Self::ConsumerGroups(c) => &c.path,
            Self::Sidekiq(c) => &c.path,
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::OffsetChecker(_) => "offset_checker",
            Self::ConsumerGroups(_) => "consumer_groups",
            Self::Sidekiq(_) => "sidekiq",
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name().is_empty() {
            return Err(LagscopeError::Config(
                "Collector name cannot be empty".to_string(),
            ));
        }

        match self {
            Self::OffsetChecker(c) => {
                if c.zookeeper.iter().all(|z| z.trim().is_empty()) {
                    return Err(LagscopeError::Config(format!(
                        "Collector '{}': zookeeper cannot be empty",
                        c.name
                    )));
                }
                if c.consumer_groups.is_empty() {
                    return Err(LagscopeError::Config(format!(
                        "Collector '{}': consumer_groups cannot be empty",
                        c.name
                    )));
                }
                c.filters.compile()?;
            }
            Self::ConsumerGroups(c) => {
                if c.bootstrap_servers.iter().all(|s| s.trim().is_empty()) {
                    return Err(LagscopeError::Config(format!(
                        "Collector '{}': bootstrap_servers cannot be empty",
                        c.name
                    )));
                }
                c.filters.compile()?;
            }
            Self::Sidekiq(c) => {
                if c.dbs.is_empty() {
                    return Err(LagscopeError::Config(format!(
                        "Collector '{}': dbs cannot be empty",
                        c.name
                    )));
                }
            }
        }

        Ok(())
    }
}

impl FilterConfig {
    pub fn compile(&self) -> Result<CompiledFilters> {
        let compile = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| Regex::new(p))
                .collect::<std::result::Result<Vec<_>, _>>()
        };

        Ok(CompiledFilters {
            group_whitelist: compile(&self.group_whitelist)?,
            group_blacklist: compile(&self.group_blacklist)?,
            topic_whitelist: compile(&self.topic_whitelist)?,
            topic_blacklist: compile(&self.topic_blacklist)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CompiledFilters {
    pub group_whitelist: Vec<Regex>,
    pub group_blacklist: Vec<Regex>,
    pub topic_whitelist: Vec<Regex>,
    pub topic_blacklist: Vec<Regex>,
}

impl CompiledFilters {
    pub fn matches_group(&self, group: &str) -> bool {
        let matches_whitelist = self.group_whitelist.iter().any(|r| r.is_match(group));
        let matches_blacklist = self.group_blacklist.iter().any(|r| r.is_match(group));
        matches_whitelist && !matches_blacklist
    }

    pub fn matches_topic(&self, topic: &str) -> bool {
        let matches_whitelist = self.topic_whitelist.iter().any(|r| r.is_match(topic));
        let matches_blacklist = self.topic_blacklist.iter().any(|r| r.is_match(topic));
        matches_whitelist && !matches_blacklist
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_loads_from_file() {
        let config_content = r#"
[exporter]
poll_interval = "30s"
http_port = 8000

[[collectors]]
kind = "offset_checker"
name = "legacy"
consumer_groups = ["stage_nginx_access"]
"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(config_content.as_bytes()).unwrap();

        let config = Config::load(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(config.exporter.poll_interval, Duration::from_secs(30));
        assert_eq!(config.exporter.http_port, 8000);
        assert_eq!(config.collectors.len(), 1);
        assert_eq!(config.collectors[0].name(), "legacy");
        assert_eq!(config.collectors[0].kind(), "offset_checker");
    }

    #[test]
    fn test_config_missing_file() {
        let result = Config::load(Some("/nonexistent/lagscope.toml"));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Configuration file not found"));
    }

    #[test]
    fn test_collector_kinds_and_defaults() {
        let config = Config::from_toml(
            r#"
[[collectors]]
kind = "offset_checker"
name = "zk"
zookeeper = ["192.168.1.101:2181", "192.168.1.102:2181/dev/test-01"]
consumer_groups = ["stage_nginx_access"]

[[collectors]]
kind = "consumer_groups"
name = "brokers"
cluster_name = "dev/test-01"
format = "new_consumer"

[[collectors]]
kind = "sidekiq"
name = "jobs"
dbs = [0, 2]
cluster_prefix = "test-sidekiq"
"#,
        )
        .unwrap();

        let CollectorConfig::OffsetChecker(zk) = &config.collectors[0] else {
            panic!("expected offset_checker");
        };
        assert_eq!(zk.path, "kafka.ConsumerLag");
        assert_eq!(zk.bin, "/opt/kafka/bin/kafka-run-class.sh");
        assert!(zk.topics.is_empty());
        assert_eq!(zk.command_timeout, Duration::from_secs(30));

        let CollectorConfig::ConsumerGroups(cg) = &config.collectors[1] else {
            panic!("expected consumer_groups");
        };
        assert_eq!(cg.bootstrap_servers, vec!["localhost:9092".to_string()]);
        assert_eq!(cg.format, DescribeFormat::NewConsumer);
        assert!(!cg.emit_totals);

        let CollectorConfig::Sidekiq(sq) = &config.collectors[2] else {
            panic!("expected sidekiq");
        };
        assert_eq!(sq.path, "sidekiq");
        assert_eq!(sq.port, 6379);
        assert_eq!(sq.sentinel_port, 26379);
        assert!(sq.sentinel_name.is_none());
        assert_eq!(sq.dbs, vec![0, 2]);
    }

    #[test]
    fn test_config_env_override() {
        // SAFETY: test-local variable name, not read by any other test.
        unsafe { std::env::set_var("TEST_LAGSCOPE_REDIS_PASSWORD", "s3cret") };

        let config = Config::from_toml(
            r#"
[[collectors]]
kind = "sidekiq"
name = "jobs"
password = "${TEST_LAGSCOPE_REDIS_PASSWORD}"
"#,
        )
        .unwrap();

        let CollectorConfig::Sidekiq(sq) = &config.collectors[0] else {
            panic!("expected sidekiq");
        };
        assert_eq!(sq.password.as_deref(), Some("s3cret"));

        unsafe { std::env::remove_var("TEST_LAGSCOPE_REDIS_PASSWORD") };
    }

    #[test]
    fn test_config_env_with_default() {
        unsafe { std::env::remove_var("TEST_LAGSCOPE_NONEXISTENT_VAR") };

        let config = Config::from_toml(
            r#"
[[collectors]]
kind = "consumer_groups"
name = "brokers"
bootstrap_servers = ["${TEST_LAGSCOPE_NONEXISTENT_VAR:-kafka:29092}"]
"#,
        )
        .unwrap();

        let CollectorConfig::ConsumerGroups(cg) = &config.collectors[0] else {
            panic!("expected consumer_groups");
        };
        assert_eq!(cg.bootstrap_servers, vec!["kafka:29092".to_string()]);
    }

    #[test]
    fn test_config_requires_collectors() {
        let result = Config::from_toml("collectors = []\n");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("At least one collector"));
    }

    #[test]
    fn test_config_rejects_duplicate_names() {
        let result = Config::from_toml(
            r#"
[[collectors]]
kind = "sidekiq"
name = "jobs"

[[collectors]]
kind = "sidekiq"
name = "jobs"
"#,
        );
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Duplicate collector name"));
    }

    #[test]
    fn test_offset_checker_requires_groups() {
        let result = Config::from_toml(
            r#"
[[collectors]]
kind = "offset_checker"
name = "zk"
"#,
        );
        let err = result.unwrap_err().to_string();
        assert!(err.contains("consumer_groups cannot be empty"));
    }

    #[test]
    fn test_invalid_filter_regex_rejected() {
        let result = Config::from_toml(
            r#"
[[collectors]]
kind = "consumer_groups"
name = "brokers"

[collectors.filters]
group_whitelist = ["("]
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_regex_filter_whitelist_match() {
        let filters = CompiledFilters {
            group_whitelist: vec![Regex::new("^stage_.*").unwrap()],
            group_blacklist: vec![],
            topic_whitelist: vec![Regex::new(".*").unwrap()],
            topic_blacklist: vec![],
        };

        assert!(filters.matches_group("stage_nginx_access"));
        assert!(!filters.matches_group("prod_nginx_access"));
    }

    #[test]
    fn test_regex_filter_blacklist_reject() {
        let filters = FilterConfig {
            topic_blacklist: vec!["^internal-.*".to_string()],
            ..FilterConfig::default()
        }
        .compile()
        .unwrap();

        assert!(filters.matches_group("any-group"));
        assert!(filters.matches_topic("nginx_access"));
        assert!(!filters.matches_topic("internal-audit"));
    }

    #[test]
    fn test_collection_timeout_follows_poll_interval() {
        let mut exporter = ExporterConfig::default();
        assert_eq!(exporter.collection_timeout(), Duration::from_secs(25));

        exporter.poll_interval = Duration::from_secs(2);
        assert_eq!(exporter.collection_timeout(), Duration::from_secs(2));

        exporter.poll_interval = Duration::from_secs(300);
        assert_eq!(exporter.collection_timeout(), Duration::from_secs(295));
    }

    #[test]
    fn test_command_timeout_fires_before_cycle_timeout() {
        let mut exporter = ExporterConfig::default();
        // default 30s command timeout against a 25s cycle
        let bounded = exporter.command_timeout(default_command_timeout());
        assert_eq!(bounded, Duration::from_millis(12_500));
        assert!(bounded < exporter.collection_timeout());

        exporter.poll_interval = Duration::from_secs(120);
        assert_eq!(exporter.command_timeout(Duration::from_secs(30)), Duration::from_secs(30));

        exporter.poll_interval = Duration::from_secs(2);
        assert_eq!(exporter.command_timeout(Duration::from_secs(30)), Duration::from_secs(1));
    }

    #[test]
    fn test_describe_format_variant_mapping() {
        assert_eq!(
            DescribeFormat::LegacyDescribe.parser_variant(),
            ParserVariant::LegacyB
        );
        assert_eq!(
            DescribeFormat::NewConsumer.parser_variant(),
            ParserVariant::NewConsumerA
        );
        assert_eq!(
            DescribeFormat::GroupFirst.parser_variant(),
            ParserVariant::NewConsumerB
        );
        assert!(DescribeFormat::LegacyDescribe.needs_new_consumer_flag());
        assert!(!DescribeFormat::GroupFirst.needs_new_consumer_flag());
    }
}
