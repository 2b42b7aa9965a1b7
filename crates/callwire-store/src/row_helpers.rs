use callwire_core::UserId;

use crate::error::StoreError;

/// Get a required column value from a row, returning CorruptRow on failure.
pub fn get<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    row.get(idx).map_err(|e| StoreError::CorruptRow {
        table,
        column,
        detail: e.to_string(),
    })
}

/// Parse a string into an enum, returning CorruptRow on failure.
pub fn parse_enum<T: std::str::FromStr>(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<T, StoreError> {
    raw.parse().map_err(|_| StoreError::CorruptRow {
        table,
        column,
        detail: format!("unknown variant: {raw}"),
    })
}

/// Parse a stored user identity.
pub fn parse_user_id(
    raw: &str,
    table: &'static str,
    column: &'static str,
) -> Result<UserId, StoreError> {
    UserId::parse(raw).ok_or_else(|| StoreError::CorruptRow {
        table,
        column,
        detail: format!("invalid user id: {raw}"),
    })
}
