use crate::metrics::naming::MetricName;
use crate::metrics::types::MetricPoint;
use std::sync::{Mutex, PoisonError};

/// Destination of published metric values. Publishing never fails from the
/// caller's point of view.
pub trait MetricSink: Send + Sync {
    fn publish(&self, name: &str, value: f64);

    fn publish_metric(&self, name: &MetricName, value: f64) {
        self.publish(&name.to_string(), value);
    }
}

/// Holds a cycle's points until the cycle is known to have succeeded.
#[derive(Debug, Default)]
pub struct BufferedSink {
    points: Mutex<Vec<MetricPoint>>,
}

impl BufferedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_points(self) -> Vec<MetricPoint> {
        self.points
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl MetricSink for BufferedSink {
    fn publish(&self, name: &str, value: f64) {
        self.points
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MetricPoint::gauge(name, value));
    }
}
