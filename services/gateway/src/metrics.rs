//! Prometheus metrics exposition
//!
//! - `auth_requests_total` (counter): labels `operation`, `code`
//! - `auth_request_duration_seconds` (histogram): label `operation`

use std::sync::atomic::{AtomicU64, Ordering};

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use rpc::Code;

const DURATION_METRIC: &str = "auth_request_duration_seconds";

/// Covers a fast cookie-only call up to the provider timeout ceiling.
const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
        .expect("failed to set histogram buckets")
}

/// Install the global Prometheus recorder and return a handle for `/metrics`.
///
/// Panics if a recorder is already installed.
pub fn install_recorder() -> PrometheusHandle {
    builder()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record one finished auth RPC.
pub fn record_request(operation: &'static str, code: Code, duration_secs: f64) {
    metrics::counter!("auth_requests_total", "operation" => operation, "code" => code.as_str())
        .increment(1);
    metrics::histogram!(DURATION_METRIC, "operation" => operation).record(duration_secs);
}

/// Totals reported by `/health`.
#[derive(Debug, Default)]
pub struct RequestCounters {
    requests: AtomicU64,
    errors: AtomicU64,
}

impl RequestCounters {
    pub fn record(&self, code: Code) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if code != Code::Ok {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}
