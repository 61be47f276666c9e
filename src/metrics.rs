use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

static RECORDER: OnceCell<Option<PrometheusHandle>> = OnceCell::new();

impl Metrics {
    /// Install the Prometheus recorder once per process and describe every series.
    /// Later calls reuse the same handle. Returns `None` if another recorder was
    /// installed first.
    pub fn init() -> Option<Self> {
        RECORDER
            .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
                Ok(handle) => {
                    describe_all();
                    Some(handle)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "prometheus recorder not installed");
                    None
                }
            })
            .clone()
            .map(|handle| Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe_all() {
    describe_counter!("analyze_requests_total", "Analyze requests received.");
    describe_counter!(
        "analyze_incidents_total",
        "Analyze requests that ended with is_incident = true."
    );
    describe_counter!(
        "analyze_failures_total",
        "Analyze requests that failed, labelled by error kind."
    );
    describe_counter!("gateway_calls_total", "Model calls, labelled by stage.");
    describe_counter!(
        "gateway_retries_total",
        "Model call retries after a transient failure, labelled by stage."
    );
    describe_histogram!(
        "gateway_duration_ms",
        "Model call duration in milliseconds, labelled by stage."
    );
    describe_counter!(
        "type_registry_refresh_total",
        "Incident type refreshes, labelled by outcome."
    );
    describe_gauge!("type_registry_size", "Number of incident types currently loaded.");
}
