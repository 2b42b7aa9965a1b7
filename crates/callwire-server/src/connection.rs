//! Per-connection handle shared between a session and the registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use callwire_core::{ConnectionId, UserId};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Close code sent to a connection replaced by a newer one for the same user.
pub const CLOSE_SUPERSEDED: u16 = 4000;
pub const CLOSE_SUPERSEDED_REASON: &str = "superseded by a newer connection";
/// Policy violation, used for failed authentication.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// Going away, used on server shutdown and heartbeat timeout.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Items consumed by a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Ping,
    /// Send a close frame and stop writing.
    Close { code: u16, reason: &'static str },
}

/// Handle to one open signaling connection.
///
/// The owning session holds the socket; everything else writes through the
/// bounded queue behind `tx`.
pub struct ClientConnection {
    pub id: ConnectionId,
    pub user_id: UserId,
    tx: mpsc::Sender<Outbound>,
    pub connected_at: Instant,
    last_pong: Mutex<Instant>,
    cancel: CancellationToken,
    superseded: AtomicBool,
}

impl ClientConnection {
    pub fn new(user_id: UserId, tx: mpsc::Sender<Outbound>, cancel: CancellationToken) -> Self {
        let now = Instant::now();
        Self {
            id: ConnectionId::new(),
            user_id,
            tx,
            connected_at: now,
            last_pong: Mutex::new(now),
            cancel,
            superseded: AtomicBool::new(false),
        }
    }

    /// Enqueue a text frame, waiting up to `timeout` for queue space.
    ///
    /// Returns `false` when the queue stayed full or the writer is gone.
    pub async fn send(&self, text: String, timeout: Duration) -> bool {
        self.tx
            .send_timeout(Outbound::Text(text), timeout)
            .await
            .is_ok()
    }

    /// Serialize a JSON value and enqueue it.
    pub async fn send_json(&self, value: &serde_json::Value, timeout: Duration) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.send(json, timeout).await,
            Err(_) => false,
        }
    }

    /// Enqueue a ping without waiting. A full queue already proves the
    /// writer is behind, so the ping is skipped.
    pub fn ping(&self) -> bool {
        self.tx.try_send(Outbound::Ping).is_ok()
    }

    /// Ask the writer to send a close frame and stop.
    pub async fn close(&self, code: u16, reason: &'static str, timeout: Duration) -> bool {
        self.tx
            .send_timeout(Outbound::Close { code, reason }, timeout)
            .await
            .is_ok()
    }

    /// Record a pong or any other inbound activity.
    pub fn mark_alive(&self) {
        *self.last_pong.lock() = Instant::now();
    }

    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Flag this connection as replaced and stop its session.
    pub fn supersede(&self) {
        self.superseded.store(true, Ordering::Relaxed);
        self.cancel.cancel();
    }

    pub fn is_superseded(&self) -> bool {
        self.superseded.load(Ordering::Relaxed)
    }

    /// Cancelled when the session should stop: superseded or shutting down.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("superseded", &self.is_superseded())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_millis(50);

    fn make_connection(cap: usize) -> (ClientConnection, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(cap);
        let conn = ClientConnection::new(UserId::new(), tx, CancellationToken::new());
        (conn, rx)
    }

    #[test]
    fn new_connection_has_prefixed_id() {
        let (conn, _rx) = make_connection(4);
        assert!(conn.id.as_str().starts_with("conn_"));
        assert!(!conn.is_superseded());
        assert!(!conn.cancel_token().is_cancelled());
    }

    #[tokio::test]
    async fn send_enqueues_text() {
        let (conn, mut rx) = make_connection(4);
        assert!(conn.send("hello".into(), T).await);
        assert_eq!(rx.recv().await, Some(Outbound::Text("hello".into())));
    }

    #[tokio::test]
    async fn send_json_serializes() {
        let (conn, mut rx) = make_connection(4);
        assert!(conn.send_json(&serde_json::json!({"a": 1}), T).await);
        assert_eq!(rx.recv().await, Some(Outbound::Text(r#"{"a":1}"#.into())));
    }

    #[tokio::test]
    async fn send_to_closed_queue_fails() {
        let (conn, rx) = make_connection(4);
        drop(rx);
        assert!(!conn.send("x".into(), T).await);
    }

    #[tokio::test]
    async fn send_to_full_queue_times_out() {
        let (conn, _rx) = make_connection(1);
        assert!(conn.send("first".into(), T).await);
        assert!(!conn.send("second".into(), T).await);
    }

    #[tokio::test]
    async fn ping_skipped_when_full() {
        let (conn, mut rx) = make_connection(1);
        assert!(conn.ping());
        assert!(!conn.ping());
        assert_eq!(rx.recv().await, Some(Outbound::Ping));
    }

    #[tokio::test]
    async fn close_enqueues_close_frame() {
        let (conn, mut rx) = make_connection(2);
        assert!(conn.close(CLOSE_GOING_AWAY, "bye", T).await);
        assert_eq!(
            rx.recv().await,
            Some(Outbound::Close {
                code: CLOSE_GOING_AWAY,
                reason: "bye"
            })
        );
    }

    #[test]
    fn supersede_cancels_and_flags() {
        let (conn, _rx) = make_connection(1);
        conn.supersede();
        assert!(conn.is_superseded());
        assert!(conn.cancel_token().is_cancelled());
    }

    #[test]
    fn mark_alive_resets_elapsed() {
        let (conn, _rx) = make_connection(1);
        *conn.last_pong.lock() = Instant::now() - Duration::from_secs(100);
        assert!(conn.last_pong_elapsed() >= Duration::from_secs(99));
        conn.mark_alive();
        assert!(conn.last_pong_elapsed() < Duration::from_secs(1));
    }
}
