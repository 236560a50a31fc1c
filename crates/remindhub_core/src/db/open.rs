//! Connection setup: pragmas first, then migrations.

use super::migrations::apply_migrations;
use super::DbResult;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

enum Target<'a> {
    File(&'a Path),
    Memory,
}

impl Target<'_> {
    fn label(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Memory => "memory",
        }
    }
}

/// Opens (or creates) a database file with the current schema.
///
/// File databases use WAL so the key-value store and the audit log can keep
/// separate connections to one file.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open(Target::File(path.as_ref()))
}

/// Private in-memory database with the current schema.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open(Target::Memory)
}

fn open(target: Target<'_>) -> DbResult<Connection> {
    let started_at = Instant::now();
    let mode = target.label();
    let result = connect(&target);
    let elapsed_ms = started_at.elapsed().as_millis();
    match &result {
        Ok((_, applied)) => info!(
            "event=db_open module=db status=ok mode={} migrations_applied={} duration_ms={}",
            mode, applied, elapsed_ms
        ),
        Err(err) => error!(
            "event=db_open module=db status=error mode={} duration_ms={} error={}",
            mode, elapsed_ms, err
        ),
    }
    result.map(|(conn, _)| conn)
}

fn connect(target: &Target<'_>) -> DbResult<(Connection, usize)> {
    let mut conn = match target {
        Target::File(path) => {
            let conn = Connection::open(path)?;
            // The pragma answers with the resulting mode.
            let _mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            conn
        }
        Target::Memory => Connection::open_in_memory()?,
    };
    conn.busy_timeout(BUSY_TIMEOUT)?;
    let applied = apply_migrations(&mut conn)?;
    Ok((conn, applied))
}
