/// Last segment of a scope's aggregated lag metric.
pub const TOTAL_SEGMENT: &str = "total";
/// First segment of every queue depth metric.
pub const QUEUE_ROOT_SEGMENT: &str = "queue";

/// Redis set listing the Sidekiq queue names.
pub const QUEUES_KEY: &str = "queues";
/// Sorted set of scheduled jobs.
pub const SCHEDULE_KEY: &str = "schedule";
/// Sorted set of jobs waiting for a retry.
pub const RETRY_KEY: &str = "retry";

pub const METRIC_SCRAPE_DURATION_SECONDS: &str = "lagscope.scrape_duration_seconds";
pub const METRIC_UP: &str = "lagscope.up";
