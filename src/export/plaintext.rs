use crate::metrics::registry::MetricsRegistry;
use std::sync::Arc;

/// Renders the registry in the Graphite plaintext line format.
#[derive(Clone)]
pub struct PlaintextExporter {
    registry: Arc<MetricsRegistry>,
    prefix: Option<String>,
}

impl PlaintextExporter {
    pub fn new(registry: Arc<MetricsRegistry>, prefix: Option<String>) -> Self {
        Self {
            registry,
            prefix: prefix.filter(|p| !p.is_empty()),
        }
    }

    pub fn render_metrics(&self) -> String {
        self.registry.render_plaintext(self.prefix.as_deref())
    }
}
