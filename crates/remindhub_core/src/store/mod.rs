//! Key-value store implementations.
//!
//! # Responsibility
//! - Provide an in-memory store for tests and ephemeral hubs.
//! - Provide a SQLite-backed store over the `kv_entries` table.
//!
//! # Invariants
//! - `set` overwrites; `remove` of a missing key is not an error.

mod memory;
mod sqlite;

pub use memory::MemoryKeyValueStore;
pub use sqlite::SqliteKeyValueStore;

use crate::db::DbError;
use crate::platform::PlatformError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Store-layer errors.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    LockPoisoned,
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::LockPoisoned => write!(f, "key-value store lock poisoned"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::LockPoisoned => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

pub(crate) fn to_platform_error(operation: &str, err: StoreError) -> PlatformError {
    PlatformError::new(operation, err.to_string())
}
