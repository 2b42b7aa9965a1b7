pub mod call_sessions;
pub mod database;
pub mod error;
pub mod row_helpers;
pub mod schema;

pub use call_sessions::{CallSessionRepo, CallSessionRow, CallSessionStore};
pub use database::Database;
pub use error::StoreError;
