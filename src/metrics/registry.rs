use crate::collector::CycleReport;
use crate::metrics::definitions::{METRIC_SCRAPE_DURATION_SECONDS, METRIC_UP};
use crate::metrics::types::MetricPoint;
use dashmap::DashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Default staleness threshold: 3x the default poll interval
const DEFAULT_STALENESS_THRESHOLD: Duration = Duration::from_secs(90);

/// Points of one collector, rendered beneath its configured path.
#[derive(Debug, Default)]
struct CollectorPoints {
    path: String,
    points: Vec<MetricPoint>,
}

pub struct MetricsRegistry {
    metrics: DashMap<String, CollectorPoints>,
    last_update: DashMap<String, Instant>,
    last_update_timestamp: DashMap<String, u64>, // Unix timestamp in seconds
    reports: DashMap<String, CycleReport>,
    healthy: AtomicBool,
    last_scrape_duration_ms: AtomicU64,
    staleness_threshold: Duration,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::with_staleness_threshold(DEFAULT_STALENESS_THRESHOLD)
    }

    pub fn with_staleness_threshold(staleness_threshold: Duration) -> Self {
        Self {
            metrics: DashMap::new(),
            last_update: DashMap::new(),
            last_update_timestamp: DashMap::new(),
            reports: DashMap::new(),
            healthy: AtomicBool::new(true),
            last_scrape_duration_ms: AtomicU64::new(0),
            staleness_threshold,
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    pub fn set_scrape_duration_ms(&self, duration_ms: u64) {
        self.last_scrape_duration_ms
            .store(duration_ms, Ordering::SeqCst);
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn get_scrape_duration_seconds(&self) -> f64 {
        self.last_scrape_duration_ms.load(Ordering::SeqCst) as f64 / 1000.0
    }

    /// Begin a new collection cycle for a collector.
    /// Clears existing points so that `push_points` can append incrementally.
    pub fn begin_cycle(&self, collector: &str, path: &str) {
        self.metrics.insert(
            collector.to_string(),
            CollectorPoints {
                path: path.to_string(),
                points: Vec::new(),
            },
        );
    }

    /// Append points for a collector. Call between `begin_cycle` and `finish_cycle`.
    pub fn push_points(&self, collector: &str, points: Vec<MetricPoint>) {
        self.metrics
            .entry(collector.to_string())
            .or_default()
            .points
            .extend(points);
    }

    /// Finish a collection cycle for a collector.
    /// Records the update timestamps so staleness checks work correctly.
    pub fn finish_cycle(&self, collector: &str) {
        self.last_update.insert(collector.to_string(), Instant::now());
        self.last_update_timestamp
            .insert(collector.to_string(), unix_now());
    }

    pub fn record_report(&self, report: CycleReport) {
        self.reports.insert(report.collector.clone(), report);
    }

    /// Latest cycle report of every collector, ordered by collector name.
    pub fn reports(&self) -> Vec<CycleReport> {
        let mut reports: Vec<CycleReport> =
            self.reports.iter().map(|r| r.value().clone()).collect();
        reports.sort_by(|a, b| a.collector.cmp(&b.collector));
        reports
    }

    pub fn remove_collector(&self, collector: &str) {
        self.metrics.remove(collector);
        self.last_update.remove(collector);
        self.last_update_timestamp.remove(collector);
        self.reports.remove(collector);
    }

    pub fn collector_count(&self) -> usize {
        self.last_update.len()
    }

    pub fn render_plaintext(&self, prefix: Option<&str>) -> String {
        self.render_plaintext_with_staleness_check(prefix, true)
    }

    /// Render every point as a plaintext line `<path> <value> <timestamp>`,
    /// optionally leaving out collectors that have not finished a cycle
    /// within the staleness threshold.
    pub fn render_plaintext_with_staleness_check(&self, prefix: Option<&str>, filter_stale: bool) -> String {
        let mut output = String::new();
        let now = Instant::now();

        let mut collectors: Vec<String> = self
            .last_update
            .iter()
            .filter(|entry| !filter_stale || now.duration_since(*entry.value()) <= self.staleness_threshold)
            .map(|entry| entry.key().clone())
            .collect();
        collectors.sort_unstable();

        for collector in collectors {
            let Some(entry) = self.metrics.get(&collector) else {
                continue;
            };
            let timestamp = self
                .last_update_timestamp
                .get(&collector)
                .map_or_else(unix_now, |t| *t);
            for point in &entry.points {
                let path = join_path(&[prefix.unwrap_or_default(), &entry.path, &point.name]);
                let _ = writeln!(output, "{path} {} {timestamp}", point.value.as_f64());
            }
        }

        let now_ts = unix_now();
        let _ = writeln!(
            output,
            "{} {:.6} {now_ts}",
            join_path(&[prefix.unwrap_or_default(), METRIC_SCRAPE_DURATION_SECONDS]),
            self.get_scrape_duration_seconds()
        );
        let _ = writeln!(
            output,
            "{} {} {now_ts}",
            join_path(&[prefix.unwrap_or_default(), METRIC_UP]),
            i32::from(self.is_healthy())
        );

        output
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Join dotted path parts, leaving out empty ones.
fn join_path(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(".")
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
