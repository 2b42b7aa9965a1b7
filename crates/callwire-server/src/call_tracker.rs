//! Best-effort call-session bookkeeping driven by relayed envelopes.
//!
//! Per room: absent -> active -> inactive. Any non-hangup event on a room
//! without an active record opens one; `hangup` closes it. Store failures are
//! logged and counted, never surfaced to the relay.

use std::sync::Arc;

use callwire_core::{MessageType, UserId};
use callwire_store::{CallSessionStore, StoreError};
use tracing::{debug, warn};

use crate::metrics::{CALL_SESSIONS_TOUCHED_TOTAL, CALL_STORE_ERRORS_TOTAL};

/// What a single event did to the room's record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchOutcome {
    Created,
    Updated,
    Ended,
    /// Hangup on a room with no active record.
    Ignored,
}

impl TouchOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Ended => "ended",
            Self::Ignored => "ignored",
        }
    }
}

/// Apply one event to the store synchronously.
pub fn apply(
    store: &dyn CallSessionStore,
    room_id: &str,
    caller: &UserId,
    callee: &UserId,
    event: MessageType,
) -> Result<TouchOutcome, StoreError> {
    match (store.find_active(room_id)?, event.is_hangup()) {
        (None, true) => Ok(TouchOutcome::Ignored),
        (None, false) => {
            let _ = store.create(room_id, caller, callee, event)?;
            Ok(TouchOutcome::Created)
        }
        (Some(record), true) => {
            store.update(&record, event, true)?;
            Ok(TouchOutcome::Ended)
        }
        (Some(record), false) => {
            store.update(&record, event, false)?;
            Ok(TouchOutcome::Updated)
        }
    }
}

/// Stamp `detail` as the last error on the room's active record, if any.
pub fn record_miss(
    store: &dyn CallSessionStore,
    room_id: &str,
    detail: &str,
) -> Result<bool, StoreError> {
    match store.find_active(room_id)? {
        Some(record) => {
            store.record_error(&record, detail)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Async front for the store; calls run on the blocking pool.
#[derive(Clone)]
pub struct CallTracker {
    store: Option<Arc<dyn CallSessionStore>>,
}

impl CallTracker {
    pub fn new(store: Arc<dyn CallSessionStore>) -> Self {
        Self { store: Some(store) }
    }

    /// A tracker that records nothing.
    pub fn disabled() -> Self {
        Self { store: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Record `event` for `room_id`. `None` when tracking is off or the
    /// store failed.
    pub async fn touch(
        &self,
        room_id: &str,
        caller: UserId,
        callee: UserId,
        event: MessageType,
    ) -> Option<TouchOutcome> {
        let store = self.store.clone()?;
        let room = room_id.to_owned();
        let joined =
            tokio::task::spawn_blocking(move || apply(&*store, &room, &caller, &callee, event))
                .await;

        match joined {
            Ok(Ok(outcome)) => {
                debug!(room_id, event = %event, outcome = outcome.as_str(), "call session touched");
                metrics::counter!(CALL_SESSIONS_TOUCHED_TOTAL, "outcome" => outcome.as_str())
                    .increment(1);
                Some(outcome)
            }
            Ok(Err(e)) => {
                warn!(room_id, event = %event, error = %e, "call session update failed");
                metrics::counter!(CALL_STORE_ERRORS_TOTAL, "op" => "touch").increment(1);
                None
            }
            Err(e) => {
                warn!(room_id, error = %e, "call session task failed");
                metrics::counter!(CALL_STORE_ERRORS_TOTAL, "op" => "touch").increment(1);
                None
            }
        }
    }

    /// Note an undelivered message against the room's active record.
    pub async fn note_delivery_miss(&self, room_id: &str, detail: &'static str) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let room = room_id.to_owned();
        let joined = tokio::task::spawn_blocking(move || record_miss(&*store, &room, detail)).await;

        match joined {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                warn!(room_id, error = %e, "recording call error failed");
                metrics::counter!(CALL_STORE_ERRORS_TOTAL, "op" => "record_error").increment(1);
            }
            Err(e) => {
                warn!(room_id, error = %e, "call session task failed");
                metrics::counter!(CALL_STORE_ERRORS_TOTAL, "op" => "record_error").increment(1);
            }
        }
    }
}
