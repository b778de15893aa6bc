//! Renewal and replay counters
//!
//! - `session_renewals_total` (counter): label `outcome` (`success`, `failure`,
//!   `cancelled`)
//! - `session_requests_parked_total` (counter): followers parked behind a renewal
//! - `session_requests_replayed_total` (counter): label `outcome`
//!   (`ok`, `unauthorized`, `transport_error`)
//!
//! Calls are no-ops until the embedding application installs a recorder.

pub(crate) fn record_renewal(outcome: &'static str) {
    metrics::counter!("session_renewals_total", "outcome" => outcome).increment(1);
}

pub(crate) fn record_parked() {
    metrics::counter!("session_requests_parked_total").increment(1);
}

pub(crate) fn record_replay(outcome: &'static str) {
    metrics::counter!("session_requests_replayed_total", "outcome" => outcome).increment(1);
}
