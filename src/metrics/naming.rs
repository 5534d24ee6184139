//! Dotted, hierarchical metric names.

use crate::metrics::definitions::{QUEUE_ROOT_SEGMENT, TOTAL_SEGMENT};
use std::fmt;

/// Ordered path segments, rendered joined by `.`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetricName {
    segments: Vec<String>,
}

impl MetricName {
    /// Build a name from `segments`, prefixed by `cluster_name` when it is
    /// present and non-empty. An absent cluster leaves no empty segment.
    pub fn new<I, S>(cluster_name: Option<&str>, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut name = Self::default();
        if let Some(cluster) = cluster_name.filter(|c| !c.is_empty()) {
            name.segments.push(cluster.to_string());
        }
        name.segments.extend(segments.into_iter().map(Into::into));
        name
    }

    /// `[cluster.]group.topic.partition`
    pub fn partition_lag(cluster_name: Option<&str>, group: &str, topic: &str, partition: &str) -> Self {
        Self::new(cluster_name, [group, topic, partition])
    }

    /// `[cluster.]group.topic.total`
    pub fn total_lag(cluster_name: Option<&str>, group: &str, topic: &str) -> Self {
        Self::new(cluster_name, [group, topic, TOTAL_SEGMENT])
    }

    /// `queue.[cluster.]db.queue`
    pub fn queue_depth(cluster_name: Option<&str>, db: i64, queue: &str) -> Self {
        let mut name = Self::new(None, [QUEUE_ROOT_SEGMENT]);
        name.segments
            .extend(Self::new(cluster_name, [db.to_string(), queue.to_string()]).segments);
        name
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

/// Derive a cluster token from a ZooKeeper connect string carrying a chroot
/// path, e.g. `host:2181/dev/test-01` becomes `dev_test_01`. Returns `None`
/// when there is no path component.
pub fn cluster_from_connect_string(connect: &str) -> Option<String> {
    let token = connect
        .split('/')
        .skip(1)
        .collect::<Vec<_>>()
        .join("-")
        .replace('-', "_");
    (!token.is_empty()).then_some(token)
}

/// Flatten an operator supplied cluster identifier, e.g. `dev/test-01`
/// becomes `dev_test_01`. Returns `None` for an empty identifier.
pub fn sanitize_cluster_name(name: &str) -> Option<String> {
    let token = name.replace(['/', '-'], "_");
    (!token.is_empty()).then_some(token)
}
