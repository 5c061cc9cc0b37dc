//! Token exchange metrics
//!
//! Emitted through the `metrics` facade; the embedding process decides
//! whether a recorder is installed.
//!
//! - `token_exchange_total` (counter): labels `grant`, `outcome`
//! - `token_exchange_duration_seconds` (histogram): label `grant`

/// Record one completed call to the token endpoint.
pub fn record_exchange(grant: &'static str, success: bool, duration_secs: f64) {
    let outcome = if success { "success" } else { "error" };
    metrics::counter!("token_exchange_total", "grant" => grant, "outcome" => outcome)
        .increment(1);
    metrics::histogram!("token_exchange_duration_seconds", "grant" => grant)
        .record(duration_secs);
}
