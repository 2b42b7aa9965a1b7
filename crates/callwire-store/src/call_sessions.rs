//! Call-session records: who called whom in which room, and whether the call
//! is still active. Observability metadata only.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use callwire_core::{CallSessionId, MessageType, UserId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const TABLE: &str = "call_sessions";

const SELECT_COLUMNS: &str = "SELECT id, room_id, caller_user_id, callee_user_id, started_at,
        ended_at, active, last_event_type, last_event_at, last_error
 FROM call_sessions";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallSessionRow {
    pub id: CallSessionId,
    pub room_id: String,
    pub caller_user_id: UserId,
    pub callee_user_id: UserId,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub active: bool,
    pub last_event_type: Option<MessageType>,
    pub last_event_at: Option<String>,
    pub last_error: Option<String>,
}

/// Persistence collaborator used by the relay's call tracking.
///
/// Every operation may fail independently of message relay.
pub trait CallSessionStore: Send + Sync {
    /// The active record for `room_id`, if any.
    fn find_active(&self, room_id: &str) -> Result<Option<CallSessionRow>, StoreError>;

    /// Insert a new active record.
    fn create(
        &self,
        room_id: &str,
        caller: &UserId,
        callee: &UserId,
        event: MessageType,
    ) -> Result<CallSessionRow, StoreError>;

    /// Stamp the latest event on `record`; `ended` also deactivates it.
    fn update(
        &self,
        record: &CallSessionRow,
        event: MessageType,
        ended: bool,
    ) -> Result<(), StoreError>;

    /// Remember the most recent relay problem seen for `record`.
    fn record_error(&self, record: &CallSessionRow, detail: &str) -> Result<(), StoreError>;
}

pub struct CallSessionRepo {
    db: Database,
}

impl CallSessionRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Get a record by ID.
    #[instrument(skip(self, id), fields(call_session_id = %id))]
    pub fn get(&self, id: &CallSessionId) -> Result<CallSessionRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE id = ?1"))?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_call_session(row),
                None => Err(StoreError::NotFound(format!("call session {id}"))),
            }
        })
    }

    /// All records for a room, oldest first.
    #[instrument(skip(self))]
    pub fn list_for_room(&self, room_id: &str) -> Result<Vec<CallSessionRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLUMNS} WHERE room_id = ?1 ORDER BY started_at ASC, rowid ASC"
            ))?;
            let mut rows = stmt.query([room_id])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(row_to_call_session(row)?);
            }
            Ok(out)
        })
    }

    /// Number of active calls across all rooms.
    pub fn count_active(&self) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM call_sessions WHERE active = 1",
                [],
                |row| row.get(0),
            )?;
            Ok(u64::try_from(n).unwrap_or(0))
        })
    }
}

impl CallSessionStore for CallSessionRepo {
    #[instrument(skip(self))]
    fn find_active(&self, room_id: &str) -> Result<Option<CallSessionRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLUMNS} WHERE room_id = ?1 AND active = 1 LIMIT 1"
            ))?;
            let mut rows = stmt.query([room_id])?;
            match rows.next()? {
                Some(row) => row_to_call_session(row).map(Some),
                None => Ok(None),
            }
        })
    }

    #[instrument(skip(self, caller, callee), fields(caller = %caller, callee = %callee))]
    fn create(
        &self,
        room_id: &str,
        caller: &UserId,
        callee: &UserId,
        event: MessageType,
    ) -> Result<CallSessionRow, StoreError> {
        let id = CallSessionId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            let _ = conn.execute(
                "INSERT INTO call_sessions
                    (id, room_id, caller_user_id, callee_user_id, started_at, active,
                     last_event_type, last_event_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7)",
                rusqlite::params![
                    id.as_str(),
                    room_id,
                    caller.to_string(),
                    callee.to_string(),
                    now,
                    event.as_str(),
                    now,
                ],
            )?;

            Ok(CallSessionRow {
                id,
                room_id: room_id.to_string(),
                caller_user_id: *caller,
                callee_user_id: *callee,
                started_at: now.clone(),
                ended_at: None,
                active: true,
                last_event_type: Some(event),
                last_event_at: Some(now),
                last_error: None,
            })
        })
    }

    #[instrument(skip(self, record), fields(call_session_id = %record.id))]
    fn update(
        &self,
        record: &CallSessionRow,
        event: MessageType,
        ended: bool,
    ) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE call_sessions
                 SET last_event_type = ?2,
                     last_event_at = ?3,
                     active = CASE WHEN ?4 THEN 0 ELSE active END,
                     ended_at = CASE WHEN ?4 THEN ?3 ELSE ended_at END
                 WHERE id = ?1",
                rusqlite::params![record.id.as_str(), event.as_str(), now, ended],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("call session {}", record.id)));
            }
            Ok(())
        })
    }

    #[instrument(skip(self, record), fields(call_session_id = %record.id))]
    fn record_error(&self, record: &CallSessionRow, detail: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE call_sessions SET last_error = ?2 WHERE id = ?1",
                rusqlite::params![record.id.as_str(), detail],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("call session {}", record.id)));
            }
            Ok(())
        })
    }
}

fn row_to_call_session(row: &rusqlite::Row<'_>) -> Result<CallSessionRow, StoreError> {
    let id: String = row_helpers::get(row, 0, TABLE, "id")?;
    let caller: String = row_helpers::get(row, 2, TABLE, "caller_user_id")?;
    let callee: String = row_helpers::get(row, 3, TABLE, "callee_user_id")?;
    let last_event_type: Option<String> = row_helpers::get(row, 7, TABLE, "last_event_type")?;

    Ok(CallSessionRow {
        id: CallSessionId::from_raw(id),
        room_id: row_helpers::get(row, 1, TABLE, "room_id")?,
        caller_user_id: row_helpers::parse_user_id(&caller, TABLE, "caller_user_id")?,
        callee_user_id: row_helpers::parse_user_id(&callee, TABLE, "callee_user_id")?,
        started_at: row_helpers::get(row, 4, TABLE, "started_at")?,
        ended_at: row_helpers::get(row, 5, TABLE, "ended_at")?,
        active: row_helpers::get(row, 6, TABLE, "active")?,
        last_event_type: last_event_type
            .map(|raw| row_helpers::parse_enum(&raw, TABLE, "last_event_type"))
            .transpose()?,
        last_event_at: row_helpers::get(row, 8, TABLE, "last_event_at")?,
        last_error: row_helpers::get(row, 9, TABLE, "last_error")?,
    })
}
