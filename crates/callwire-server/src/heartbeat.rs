//! Ping/pong liveness monitoring.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use crate::connection::ClientConnection;

/// Ping the client every `interval` and return once no pong (or other
/// inbound activity) has arrived for `timeout`.
///
/// Never returns while the client keeps answering; the caller races it
/// against the read loop and cancellation.
pub async fn run_heartbeat(connection: Arc<ClientConnection>, interval: Duration, timeout: Duration) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    // first tick is immediate
    let _ = ticker.tick().await;

    loop {
        let _ = ticker.tick().await;
        if connection.last_pong_elapsed() >= timeout {
            return;
        }
        let _ = connection.ping();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Outbound;
    use callwire_core::UserId;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn make_connection() -> (Arc<ClientConnection>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(32);
        (
            Arc::new(ClientConnection::new(UserId::new(), tx, CancellationToken::new())),
            rx,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn sends_pings_while_alive() {
        let (conn, mut rx) = make_connection();
        let hb = tokio::spawn(run_heartbeat(
            conn.clone(),
            Duration::from_secs(10),
            Duration::from_secs(3600),
        ));

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(rx.try_recv().ok(), Some(Outbound::Ping));
        assert_eq!(rx.try_recv().ok(), Some(Outbound::Ping));
        assert!(!hb.is_finished());
        hb.abort();
    }

    #[tokio::test]
    async fn returns_once_pongs_stop() {
        let (conn, _rx) = make_connection();
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            run_heartbeat(conn, Duration::from_millis(20), Duration::from_millis(50)),
        )
        .await;
        assert!(result.is_ok(), "heartbeat should time out the silent client");
    }
}
