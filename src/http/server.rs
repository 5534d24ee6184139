use crate::collector::CycleReport;
use crate::error::{LagscopeError, Result};
use crate::export::plaintext::PlaintextExporter;
use crate::metrics::registry::MetricsRegistry;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

#[derive(Clone)]
struct AppState {
    plaintext: PlaintextExporter,
    registry: Arc<MetricsRegistry>,
}

pub struct HttpServer {
    addr: SocketAddr,
    state: AppState,
}

impl HttpServer {
    pub fn new(
        host: &str,
        port: u16,
        plaintext: PlaintextExporter,
        registry: Arc<MetricsRegistry>,
    ) -> Result<Self> {
        let addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| LagscopeError::Config(format!("Invalid listen address '{host}:{port}': {e}")))?;

        Ok(Self {
            addr,
            state: AppState {
                plaintext,
                registry,
            },
        })
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let app = router(self.state);

        info!(addr = %self.addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| LagscopeError::Http(e.to_string()))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                info!("HTTP server shutting down");
            })
            .await
            .map_err(|e| LagscopeError::Http(e.to_string()))?;

        Ok(())
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/status", get(status_handler))
        .route("/", get(root_handler))
        .with_state(state)
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    let metrics = state.plaintext.render_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        metrics,
    )
        .into_response()
}

async fn health_handler(State(state): State<AppState>) -> Response {
    if state.registry.is_healthy() {
        (StatusCode::OK, "OK").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Unhealthy").into_response()
    }
}

async fn ready_handler(State(state): State<AppState>) -> Response {
    // Ready once any collector has completed a cycle
    if state.registry.collector_count() > 0 {
        (StatusCode::OK, "Ready").into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "Not ready - no collector has completed a cycle",
        )
            .into_response()
    }
}

/// Response body for the /status endpoint.
#[derive(Serialize)]
struct StatusResponse {
    healthy: bool,
    scrape_duration_seconds: f64,
    collectors: Vec<CycleReport>,
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        healthy: state.registry.is_healthy(),
        scrape_duration_seconds: state.registry.get_scrape_duration_seconds(),
        collectors: state.registry.reports(),
    })
}

async fn root_handler() -> Response {
    let html = r#"<!DOCTYPE html>
<html>
<head><title>lagscope</title></head>
<body>
<h1>lagscope</h1>
<p><a href="/metrics">Metrics</a></p>
<p><a href="/health">Health</a></p>
<p><a href="/ready">Ready</a></p>
<p><a href="/status">Last cycle status</a></p>
</body>
</html>"#;

    (
        StatusCode::OK,
        [("content-type", "text/html; charset=utf-8")],
        html,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{ItemOutcome, SkipReason};
    use crate::metrics::types::MetricPoint;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn make_app() -> (Router, Arc<MetricsRegistry>) {
        let registry = Arc::new(MetricsRegistry::new());
        let plaintext = PlaintextExporter::new(Arc::clone(&registry), None);
        let app = router(AppState {
            plaintext,
            registry: Arc::clone(&registry),
        });
        (app, registry)
    }

    async fn get_response(app: Router, uri: &str) -> Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (app, registry) = make_app();
        registry.begin_cycle("legacy", "kafka.ConsumerLag");
        registry.push_points("legacy", vec![MetricPoint::gauge("g.t.0", 7.0)]);
        registry.finish_cycle("legacy");

        let response = get_response(app, "/metrics").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("kafka.ConsumerLag.g.t.0 7 "));
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (app, registry) = make_app();
        assert_eq!(get_response(app.clone(), "/health").await.status(), StatusCode::OK);

        registry.set_healthy(false);
        assert_eq!(
            get_response(app, "/health").await.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_ready_endpoint_not_ready_no_data() {
        let (app, _) = make_app();
        let response = get_response(app, "/ready").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_ready_after_first_cycle() {
        let (app, registry) = make_app();
        registry.begin_cycle("jobs", "sidekiq");
        registry.finish_cycle("jobs");

        let response = get_response(app, "/ready").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_endpoint_lists_reports() {
        let (app, registry) = make_app();
        let mut report = CycleReport::new("groups");
        report.discovered = 2;
        report.record("a", ItemOutcome::Published { metrics: 3 });
        report.record(
            "b",
            ItemOutcome::skipped(SkipReason::InvocationFailure("no output".to_string())),
        );
        registry.record_report(report);

        let response = get_response(app, "/status").await;
        assert_eq!(response.status(), StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["healthy"], true);
        assert_eq!(json["collectors"][0]["collector"], "groups");
        assert_eq!(json["collectors"][0]["discovered"], 2);
        assert_eq!(json["collectors"][0]["items"][1]["status"], "skipped");
    }

    #[test]
    fn test_invalid_listen_address() {
        let registry = Arc::new(MetricsRegistry::new());
        let plaintext = PlaintextExporter::new(Arc::clone(&registry), None);
        assert!(HttpServer::new("not an address", 8000, plaintext, registry).is_err());
    }
}
