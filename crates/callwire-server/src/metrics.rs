//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::errors::ServerError;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Fails if a global recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// WebSocket connections accepted after authentication (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connection lifetime in seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Connections replaced by a newer one for the same user (counter).
pub const WS_SUPERSEDED_TOTAL: &str = "ws_superseded_total";
/// Upgrade attempts rejected for a missing or invalid token (counter, labels: reason).
pub const WS_AUTH_FAILURES_TOTAL: &str = "ws_auth_failures_total";
/// Connections closed for missing pongs (counter).
pub const WS_HEARTBEAT_TIMEOUTS_TOTAL: &str = "ws_heartbeat_timeouts_total";
/// Envelopes delivered to a recipient queue (counter, labels: type).
pub const SIGNAL_RELAYED_TOTAL: &str = "signal_relayed_total";
/// Envelopes rejected with an error notice (counter, labels: reason).
pub const SIGNAL_REJECTED_TOTAL: &str = "signal_rejected_total";
/// Relay attempts answered with `peer_offline` (counter, labels: type).
pub const SIGNAL_PEER_OFFLINE_TOTAL: &str = "signal_peer_offline_total";
/// Frames dropped without reply (counter).
pub const SIGNAL_MALFORMED_TOTAL: &str = "signal_malformed_total";
/// Call-session store failures swallowed by the relay (counter, labels: op).
pub const CALL_STORE_ERRORS_TOTAL: &str = "call_store_errors_total";
/// Call-session state transitions (counter, labels: outcome).
pub const CALL_SESSIONS_TOUCHED_TOTAL: &str = "call_sessions_touched_total";
