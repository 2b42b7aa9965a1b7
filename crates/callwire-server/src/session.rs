//! Per-connection control loop.
//!
//! Lifecycle: register, relay frames until the socket ends or the session is
//! cancelled, unregister. A writer task owns the socket sink; all outbound
//! traffic for the connection goes through its bounded queue.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use callwire_core::{ConnectionId, UserId};
use callwire_settings::ServerSettings;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::connection::{
    ClientConnection, Outbound, CLOSE_GOING_AWAY, CLOSE_SUPERSEDED, CLOSE_SUPERSEDED_REASON,
};
use crate::heartbeat::run_heartbeat;
use crate::metrics::{
    SIGNAL_MALFORMED_TOTAL, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_CONNECTION_DURATION_SECONDS, WS_DISCONNECTIONS_TOTAL, WS_HEARTBEAT_TIMEOUTS_TOTAL,
    WS_SUPERSEDED_TOTAL,
};
use crate::registry::ConnectionRegistry;
use crate::relay::Relay;

/// How long the session waits to hand a close frame to its writer, and for
/// the writer to drain afterwards.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Transport knobs for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub send_queue_size: usize,
    /// `None` disables the liveness heartbeat.
    pub heartbeat_interval: Option<Duration>,
    pub heartbeat_timeout: Duration,
}

impl SessionSettings {
    pub fn from_server(server: &ServerSettings) -> Self {
        let interval = (server.heartbeat_interval_secs > 0)
            .then(|| Duration::from_secs(server.heartbeat_interval_secs));
        Self {
            send_queue_size: server.send_queue_size.max(1),
            heartbeat_interval: interval,
            heartbeat_timeout: Duration::from_secs(server.heartbeat_timeout_secs),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_server(&ServerSettings::default())
    }
}

/// Why the read loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndReason {
    ClientClosed,
    ReadError,
    Superseded,
    Shutdown,
    HeartbeatTimeout,
}

impl EndReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::ReadError => "read_error",
            Self::Superseded => "superseded",
            Self::Shutdown => "shutdown",
            Self::HeartbeatTimeout => "heartbeat_timeout",
        }
    }

    /// Close frame the server sends, if any.
    fn close_frame(self) -> Option<(u16, &'static str)> {
        match self {
            Self::Superseded => Some((CLOSE_SUPERSEDED, CLOSE_SUPERSEDED_REASON)),
            Self::Shutdown => Some((CLOSE_GOING_AWAY, "server shutting down")),
            Self::HeartbeatTimeout => Some((CLOSE_GOING_AWAY, "heartbeat timeout")),
            Self::ClientClosed | Self::ReadError => None,
        }
    }
}

/// Removes the registry entry when the session ends, however it ends.
struct Registration {
    registry: Arc<ConnectionRegistry>,
    user_id: UserId,
    conn_id: ConnectionId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let removed = self.registry.unregister(&self.user_id, &self.conn_id);
        debug!(user_id = %self.user_id, connection_id = %self.conn_id, removed, "unregistered");
    }
}

/// Run one authenticated user's session to completion.
///
/// `cancel` stops the session; it is cancelled by server shutdown or, through
/// the connection handle, when a newer connection supersedes this one.
#[instrument(skip_all, fields(user_id = %user_id))]
pub async fn run_session(
    socket: WebSocket,
    user_id: UserId,
    relay: Arc<Relay>,
    settings: SessionSettings,
    cancel: CancellationToken,
) {
    let registry = Arc::clone(relay.registry());
    let (ws_tx, mut ws_rx) = socket.split();
    let (tx, rx) = mpsc::channel(settings.send_queue_size);
    let conn = Arc::new(ClientConnection::new(user_id, tx, cancel));

    let writer = tokio::spawn(write_loop(ws_tx, rx));
    let writer_abort = writer.abort_handle();

    if let Some(previous) = registry.register(Arc::clone(&conn)) {
        info!(replaced = %previous.id, "superseding previous connection");
        metrics::counter!(WS_SUPERSEDED_TOTAL).increment(1);
        previous.supersede();
    }
    let registration = Registration {
        registry: Arc::clone(&registry),
        user_id,
        conn_id: conn.id.clone(),
    };

    metrics::counter!(WS_CONNECTIONS_TOTAL).increment(1);
    metrics::gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    info!(connection_id = %conn.id, "signaling session opened");

    let heartbeat_conn = Arc::clone(&conn);
    let heartbeat = async move {
        match settings.heartbeat_interval {
            Some(interval) => {
                run_heartbeat(heartbeat_conn, interval, settings.heartbeat_timeout).await;
            }
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(heartbeat);

    let reason = loop {
        tokio::select! {
            biased;
            () = conn.cancel_token().cancelled() => {
                break if conn.is_superseded() {
                    EndReason::Superseded
                } else {
                    EndReason::Shutdown
                };
            }
            () = &mut heartbeat => break EndReason::HeartbeatTimeout,
            frame = ws_rx.next() => {
                let msg = match frame {
                    None => break EndReason::ClientClosed,
                    Some(Err(e)) => {
                        debug!(error = %e, "websocket read failed");
                        break EndReason::ReadError;
                    }
                    Some(Ok(msg)) => msg,
                };
                conn.mark_alive();
                match msg {
                    Message::Text(text) => {
                        let _ = relay.handle_frame(&conn, text.as_str()).await;
                    }
                    Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                        Ok(text) => {
                            let _ = relay.handle_frame(&conn, text).await;
                        }
                        Err(_) => {
                            debug!(len = bytes.len(), "dropping non-utf8 binary frame");
                            metrics::counter!(SIGNAL_MALFORMED_TOTAL).increment(1);
                        }
                    },
                    Message::Close(_) => break EndReason::ClientClosed,
                    // axum answers pings itself
                    Message::Ping(_) | Message::Pong(_) => {}
                }
            }
        }
    };

    drop(registration);

    if reason == EndReason::HeartbeatTimeout {
        metrics::counter!(WS_HEARTBEAT_TIMEOUTS_TOTAL).increment(1);
    }
    if let Some((code, text)) = reason.close_frame() {
        let _ = conn.close(code, text, CLOSE_TIMEOUT).await;
    }

    let age = conn.age();
    let conn_id = conn.id.clone();
    drop(conn);
    if tokio::time::timeout(CLOSE_TIMEOUT, writer).await.is_err() {
        writer_abort.abort();
    }

    metrics::gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    metrics::counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
    metrics::histogram!(WS_CONNECTION_DURATION_SECONDS).record(age.as_secs_f64());
    info!(
        connection_id = %conn_id,
        reason = reason.as_str(),
        duration_secs = age.as_secs(),
        "signaling session closed"
    );
}

/// Drain the outbound queue into the socket until it closes or a close
/// frame is written.
async fn write_loop(mut sink: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<Outbound>) {
    while let Some(item) = rx.recv().await {
        let result = match item {
            Outbound::Text(text) => sink.send(Message::Text(text.into())).await,
            Outbound::Ping => sink.send(Message::Ping(Vec::new().into())).await,
            Outbound::Close { code, reason } => {
                let frame = CloseFrame {
                    code,
                    reason: reason.into(),
                };
                let _ = sink.send(Message::Close(Some(frame))).await;
                break;
            }
        };
        if result.is_err() {
            break;
        }
    }
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_from_server_defaults() {
        let s = SessionSettings::from_server(&ServerSettings::default());
        assert_eq!(s.send_queue_size, 256);
        assert_eq!(s.heartbeat_interval, Some(Duration::from_secs(30)));
        assert_eq!(s.heartbeat_timeout, Duration::from_secs(90));
    }

    #[test]
    fn zero_interval_disables_heartbeat() {
        let server = ServerSettings {
            heartbeat_interval_secs: 0,
            ..ServerSettings::default()
        };
        assert_eq!(SessionSettings::from_server(&server).heartbeat_interval, None);
    }

    #[test]
    fn close_frames_by_reason() {
        assert_eq!(
            EndReason::Superseded.close_frame(),
            Some((4000, "superseded by a newer connection"))
        );
        assert_eq!(EndReason::Shutdown.close_frame().map(|f| f.0), Some(1001));
        assert_eq!(EndReason::HeartbeatTimeout.close_frame().map(|f| f.0), Some(1001));
        assert_eq!(EndReason::ClientClosed.close_frame(), None);
        assert_eq!(EndReason::ReadError.close_frame(), None);
    }

    #[test]
    fn registration_guard_unregisters_own_entry_only() {
        let registry = Arc::new(ConnectionRegistry::new(Duration::from_millis(10)));
        let user = UserId::new();
        let (tx, _rx) = mpsc::channel(1);
        let current = Arc::new(ClientConnection::new(user, tx, CancellationToken::new()));
        let _ = registry.register(Arc::clone(&current));

        drop(Registration {
            registry: Arc::clone(&registry),
            user_id: user,
            conn_id: ConnectionId::new(),
        });
        assert!(registry.is_connected(&user));

        drop(Registration {
            registry: Arc::clone(&registry),
            user_id: user,
            conn_id: current.id.clone(),
        });
        assert!(!registry.is_connected(&user));
    }
}
