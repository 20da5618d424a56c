use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::Instrument;

/// Seconds. Spans quick listings up to multi-hour uploads.
pub const DURATION_BUCKETS: [f64; 13] = [
    1.0, 10.0, 30.0, 60.0, 120.0, 240.0, 300.0, 600.0, 1200.0, 2400.0, 3600.0, 7200.0, 14400.0,
];

/// Path label for requests that matched no route.
pub const UNMATCHED: &str = "unmatched";

const LABELS: [&str; 3] = ["method", "path", "status"];

/// Request metrics on a private registry, shared by all handlers.
pub struct Metrics {
    registry: Registry,
    duration: HistogramVec,
    requests: IntCounterVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let duration = HistogramVec::new(
            HistogramOpts::new(
                "chbackup_http_request_duration_seconds",
                "Time spent handling an API request",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &LABELS,
        )?;
        registry.register(Box::new(duration.clone()))?;

        let requests = IntCounterVec::new(
            Opts::new("chbackup_http_requests_total", "API requests handled"),
            &LABELS,
        )?;
        registry.register(Box::new(requests.clone()))?;

        Ok(Self {
            registry,
            duration,
            requests,
        })
    }

    /// Creates the success and failure series for a route so they are exported
    /// with zero counts before any traffic.
    pub fn preregister(&self, method: &str, path: &str) {
        for status in ["200", "500"] {
            self.duration.with_label_values(&[method, path, status]);
            self.requests.with_label_values(&[method, path, status]);
        }
    }

    pub fn observe(&self, method: &str, path: &str, status: u16, elapsed: Duration) {
        let status = status.to_string();
        let labels = [method, path, status.as_str()];
        self.duration
            .with_label_values(&labels)
            .observe(elapsed.as_secs_f64());
        self.requests.with_label_values(&labels).inc();
    }

    /// Sample count of one series, or `None` if the series was never created.
    pub fn sample_count(&self, method: &str, path: &str, status: &str) -> Option<u64> {
        let family = self
            .registry
            .gather()
            .into_iter()
            .find(|f| f.get_name() == "chbackup_http_request_duration_seconds")?;
        family.get_metric().iter().find_map(|metric| {
            let labels = metric.get_label();
            let value = |name: &str| {
                labels
                    .iter()
                    .find(|l| l.get_name() == name)
                    .map(|l| l.get_value().to_string())
            };
            let matches = value("method").as_deref() == Some(method)
                && value("path").as_deref() == Some(path)
                && value("status").as_deref() == Some(status);
            matches.then(|| metric.get_histogram().get_sample_count())
        })
    }

    /// Text exposition format.
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Middleware: one latency sample per request, labeled with the route
/// template and the status actually returned.
pub async fn track(State(metrics): State<Arc<Metrics>>, request: Request, next: Next) -> Response {
    let method = request.method().as_str().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED.to_string());
    let span = tracing::info_span!(
        "request",
        id = %uuid::Uuid::new_v4(),
        method = %method,
        path = %path
    );

    let start = Instant::now();
    let response = next.run(request).instrument(span).await;
    metrics.observe(&method, &path, response.status().as_u16(), start.elapsed());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preregistered_series_start_at_zero() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.sample_count("POST", "/create/{backup_name}", "200"), None);

        metrics.preregister("POST", "/create/{backup_name}");
        assert_eq!(
            metrics.sample_count("POST", "/create/{backup_name}", "200"),
            Some(0)
        );
        assert_eq!(
            metrics.sample_count("POST", "/create/{backup_name}", "500"),
            Some(0)
        );
        assert_eq!(metrics.sample_count("POST", "/create/{backup_name}", "404"), None);
    }

    #[test]
    fn observe_lands_in_the_right_bucket() {
        let metrics = Metrics::new().unwrap();
        metrics.preregister("GET", "/tables");
        metrics.observe("GET", "/tables", 200, Duration::from_secs(45));

        assert_eq!(metrics.sample_count("GET", "/tables", "200"), Some(1));
        assert_eq!(metrics.sample_count("GET", "/tables", "500"), Some(0));

        let text = metrics.render().unwrap();
        assert!(text.contains("chbackup_http_request_duration_seconds_bucket"));
        assert!(text.contains("le=\"60\""));
        assert!(text.contains("chbackup_http_requests_total"));
    }

    #[test]
    fn buckets_are_increasing() {
        assert!(DURATION_BUCKETS.windows(2).all(|w| w[0] < w[1]));
    }
}
