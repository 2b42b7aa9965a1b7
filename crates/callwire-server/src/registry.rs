//! Process-wide map from user identity to that user's open connection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use callwire_core::{ConnectionId, UserId};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::connection::ClientConnection;

/// One connection per user; the most recent registration wins.
///
/// The lock guards only the map. Sends clone the handle out and write after
/// the lock is released, so a slow recipient never blocks other lookups.
pub struct ConnectionRegistry {
    entries: Mutex<HashMap<UserId, Arc<ClientConnection>>>,
    send_timeout: Duration,
}

impl ConnectionRegistry {
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            send_timeout,
        }
    }

    /// Install `conn` for its user, returning whichever connection it replaced.
    ///
    /// The registry never closes the displaced connection itself.
    pub fn register(&self, conn: Arc<ClientConnection>) -> Option<Arc<ClientConnection>> {
        let user_id = conn.user_id;
        let conn_id = conn.id.clone();
        let previous = self.entries.lock().insert(user_id, conn);
        match &previous {
            Some(old) => info!(
                user_id = %user_id,
                connection_id = %conn_id,
                replaced = %old.id,
                "connection replaced previous registration"
            ),
            None => debug!(user_id = %user_id, connection_id = %conn_id, "connection registered"),
        }
        previous
    }

    /// Remove the entry for `user_id` only if it is still `conn_id`.
    ///
    /// Returns whether an entry was removed. A stale session unregistering
    /// after being replaced leaves the newer entry untouched.
    pub fn unregister(&self, user_id: &UserId, conn_id: &ConnectionId) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(user_id) {
            Some(current) if current.id == *conn_id => {
                let _ = entries.remove(user_id);
                true
            }
            _ => false,
        }
    }

    pub fn lookup(&self, user_id: &UserId) -> Option<Arc<ClientConnection>> {
        self.entries.lock().get(user_id).cloned()
    }

    pub fn is_connected(&self, user_id: &UserId) -> bool {
        self.entries.lock().contains_key(user_id)
    }

    pub fn count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Deliver `text` to the user's current connection.
    ///
    /// `false` when the user is not registered, or the recipient's queue
    /// stayed full past the send timeout, or its writer has gone away.
    pub async fn send(&self, user_id: &UserId, text: String) -> bool {
        let Some(conn) = self.lookup(user_id) else {
            return false;
        };
        conn.send(text, self.send_timeout).await
    }

    /// Serialize and deliver a JSON message.
    pub async fn send_json(&self, user_id: &UserId, value: &serde_json::Value) -> bool {
        match serde_json::to_string(value) {
            Ok(text) => self.send(user_id, text).await,
            Err(_) => false,
        }
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }
}
