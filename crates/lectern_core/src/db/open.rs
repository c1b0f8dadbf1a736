//! Connection bootstrap for one dataset file.
//!
//! # Responsibility
//! - Open an existing dataset file (never create one).
//! - Configure connection pragmas required by core behavior.
//! - Check the shipped tables, run migrations and verify before returning a
//!   usable connection.
//!
//! # Invariants
//! - Returned connections have every registered migration applied.
//! - A missing file is an open error, not an empty database.

use super::migrations::apply_migrations;
use super::verify::{verify_core_tables, verify_dataset};
use super::DbResult;
use log::{error, info};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a provisioned dataset file, migrates it and verifies it.
///
/// # Side effects
/// - May append rows to the `schema_version` ledger.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let path = path.as_ref();
    let started_at = Instant::now();
    info!("event=db_open module=db status=start");

    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let mut conn = match Connection::open_with_flags(path, flags) {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection) -> DbResult<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    verify_core_tables(conn)?;
    apply_migrations(conn)?;
    verify_dataset(conn)?;
    Ok(())
}
