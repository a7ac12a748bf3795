use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Covers:
// - HTTP requests (count and latency by method/status)
// - Retry attempts of transient store calls
// - Optimistic-lock conflicts and how they ended
// - Event bus publishes and best-effort failures
// - Queue message outcomes
//
// Scraped via GET /metrics
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub http_requests: IntCounterVec,
    pub http_request_duration: HistogramVec,
    pub retry_attempts: IntCounterVec,
    pub version_conflicts: IntCounterVec,
    pub events_published: IntCounterVec,
    pub event_publish_failures: IntCounterVec,
    pub queue_messages: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let http_requests = IntCounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests handled"),
            &["method", "status"],
        )?;
        registry.register(Box::new(http_requests.clone()))?;

        let http_request_duration = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "HTTP request duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["method"],
        )?;
        registry.register(Box::new(http_request_duration.clone()))?;

        let retry_attempts = IntCounterVec::new(
            Opts::new("retry_attempts_total", "Attempts made against transient store failures"),
            &["operation"],
        )?;
        registry.register(Box::new(retry_attempts.clone()))?;

        let version_conflicts = IntCounterVec::new(
            Opts::new("version_conflicts_total", "Optimistic-lock conflicts by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(version_conflicts.clone()))?;

        let events_published = IntCounterVec::new(
            Opts::new("events_published_total", "Domain events published to the bus"),
            &["event_type"],
        )?;
        registry.register(Box::new(events_published.clone()))?;

        let event_publish_failures = IntCounterVec::new(
            Opts::new("event_publish_failures_total", "Domain events that failed to publish"),
            &["event_type"],
        )?;
        registry.register(Box::new(event_publish_failures.clone()))?;

        let queue_messages = IntCounterVec::new(
            Opts::new("queue_messages_total", "Queue messages by type and outcome"),
            &["message_type", "outcome"],
        )?;
        registry.register(Box::new(queue_messages.clone()))?;

        Ok(Self {
            registry,
            http_requests,
            http_request_duration,
            retry_attempts,
            version_conflicts,
            events_published,
            event_publish_failures,
            queue_messages,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_http(&self, method: &str, status: u16, duration_secs: f64) {
        let method = method_label(method);
        let status = status.to_string();
        self.http_requests
            .with_label_values(&[method, status.as_str()])
            .inc();
        self.http_request_duration
            .with_label_values(&[method])
            .observe(duration_secs);
    }

    pub fn record_retry_attempt(&self, operation: &str) {
        self.retry_attempts.with_label_values(&[operation]).inc();
    }

    /// outcome: "retried" or "surfaced"
    pub fn record_version_conflict(&self, outcome: &str) {
        self.version_conflicts.with_label_values(&[outcome]).inc();
    }

    pub fn record_publish(&self, event_type: &str, success: bool) {
        if success {
            self.events_published.with_label_values(&[event_type]).inc();
        } else {
            self.event_publish_failures.with_label_values(&[event_type]).inc();
        }
    }

    /// outcome: "processed", "failed" or "ignored"
    pub fn record_queue_message(&self, message_type: &str, outcome: &str) {
        self.queue_messages
            .with_label_values(&[message_type, outcome])
            .inc();
    }

    /// Text exposition format for the /metrics endpoint
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Methods outside the served set share one series
fn method_label(method: &str) -> &'static str {
    const KNOWN: [&str; 5] = ["GET", "POST", "PUT", "DELETE", "OPTIONS"];
    KNOWN
        .into_iter()
        .find(|known| known.eq_ignore_ascii_case(method))
        .unwrap_or("OTHER")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_value(metrics: &Metrics, name: &str) -> Option<f64> {
        metrics
            .registry()
            .gather()
            .iter()
            .find(|m| m.name() == name)
            .map(|m| m.metric.iter().map(|s| s.counter.value.unwrap_or(0.0)).sum())
    }

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        metrics.record_http("GET", 200, 0.01);
        assert!(!metrics.registry().gather().is_empty());
    }

    #[test]
    fn test_record_version_conflicts() {
        let metrics = Metrics::new().unwrap();
        metrics.record_version_conflict("retried");
        metrics.record_version_conflict("retried");
        metrics.record_version_conflict("surfaced");

        assert_eq!(counter_value(&metrics, "version_conflicts_total"), Some(3.0));
    }

    #[test]
    fn test_record_publish_splits_failures() {
        let metrics = Metrics::new().unwrap();
        metrics.record_publish("ORDER_CREATED", true);
        metrics.record_publish("ORDER_CREATED", false);

        assert_eq!(counter_value(&metrics, "events_published_total"), Some(1.0));
        assert_eq!(counter_value(&metrics, "event_publish_failures_total"), Some(1.0));
    }

    #[test]
    fn test_http_method_label_is_bounded() {
        let metrics = Metrics::new().unwrap();
        metrics.record_http("get", 200, 0.01);
        metrics.record_http("PROPFIND", 404, 0.01);
        metrics.record_http("X-CUSTOM-1", 404, 0.01);

        let text = metrics.render().unwrap();
        assert!(text.contains("http_requests_total{method=\"GET\",status=\"200\"} 1"));
        assert!(text.contains("http_requests_total{method=\"OTHER\",status=\"404\"} 2"));
        assert!(!text.contains("PROPFIND"));
    }

    #[test]
    fn test_render_text_format() {
        let metrics = Metrics::new().unwrap();
        metrics.record_queue_message("SEND_EMAIL", "processed");

        let text = metrics.render().unwrap();
        assert!(text.contains("queue_messages_total"));
        assert!(text.contains("SEND_EMAIL"));
    }
}
