//! Prometheus rendering of session metrics
//!
//! With `--metrics`, the renewal counters recorded by the pipeline are
//! printed to stderr after the command:
//!
//! - `session_renewals_total` (counter): label `outcome`
//! - `session_requests_parked_total` (counter)
//! - `session_requests_replayed_total` (counter): label `outcome`

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// The session metric lines from a rendered exposition, without comments.
pub fn session_summary(rendered: &str) -> String {
    rendered
        .lines()
        .filter(|line| line.starts_with("session_"))
        .collect::<Vec<_>>()
        .join("\n")
}
