//! Versioned migration registry and ledger-driven executor.
//!
//! # Responsibility
//! - Register schema migrations in strictly increasing order.
//! - Apply pending migrations one unit of work at a time.
//!
//! # Invariants
//! - Current version is `max(version)` in `schema_version`, `0` when empty.
//! - A migration with `version <= current` is never executed again.
//! - A failed migration stops the run; higher versions are not attempted.

use chrono::{SecondsFormat, Utc};
use log::{error, info};
use rusqlite::{params, Connection};
use std::error::Error;
use std::fmt::{Display, Formatter};

const LEDGER_BOOTSTRAP_SQL: &str = "CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);";

/// One schema-evolution step.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "passage_indexes",
        sql: include_str!("0001_passage_indexes.sql"),
    },
    Migration {
        version: 2,
        name: "auxiliary_tables",
        sql: include_str!("0002_auxiliary_tables.sql"),
    },
    Migration {
        version: 3,
        name: "story_position_index",
        sql: include_str!("0003_story_position_index.sql"),
    },
];

#[derive(Debug)]
pub enum MigrationError {
    /// The supplied list is not strictly ascending from version 1 upward.
    InvalidSequence { version: u32, previous: u32 },
    /// Ledger bootstrap or version read failed.
    Ledger(rusqlite::Error),
    /// A migration statement failed; its ledger row was not written.
    Statement {
        version: u32,
        source: rusqlite::Error,
    },
    /// The statement ran but the ledger append or commit failed.
    LedgerWrite {
        version: u32,
        source: rusqlite::Error,
    },
}

impl Display for MigrationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSequence { version, previous } => write!(
                f,
                "migration version {version} must be greater than {previous}"
            ),
            Self::Ledger(err) => write!(f, "schema ledger unavailable: {err}"),
            Self::Statement { version, source } => {
                write!(f, "migration {version} statement failed: {source}")
            }
            Self::LedgerWrite { version, source } => {
                write!(f, "migration {version} ledger write failed: {source}")
            }
        }
    }
}

impl Error for MigrationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidSequence { .. } => None,
            Self::Ledger(err) => Some(err),
            Self::Statement { source, .. } | Self::LedgerWrite { source, .. } => Some(source),
        }
    }
}

/// Returns the built-in migration list.
pub fn registered_migrations() -> &'static [Migration] {
    MIGRATIONS
}

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Applies all pending built-in migrations.
pub fn apply_migrations(conn: &mut Connection) -> Result<Vec<u32>, MigrationError> {
    apply_migration_set(conn, MIGRATIONS)
}

/// Applies pending migrations from `migrations` and returns the versions run.
///
/// # Errors
/// - `InvalidSequence` before anything executes when versions are zero or
///   not strictly ascending.
/// - `Statement`/`LedgerWrite` for the first failing migration; versions
///   recorded before it stay applied.
pub fn apply_migration_set(
    conn: &mut Connection,
    migrations: &[Migration],
) -> Result<Vec<u32>, MigrationError> {
    validate_sequence(migrations)?;

    conn.execute_batch(LEDGER_BOOTSTRAP_SQL)
        .map_err(MigrationError::Ledger)?;
    let current = current_version(conn)?;
    let mut applied = Vec::new();

    for migration in migrations.iter().filter(|m| m.version > current) {
        if let Err(err) = apply_one(conn, migration) {
            error!(
                "event=db_migrate module=db status=error version={} name={} error={}",
                migration.version, migration.name, err
            );
            return Err(err);
        }
        info!(
            "event=db_migrate module=db status=ok version={} name={}",
            migration.version, migration.name
        );
        applied.push(migration.version);
    }

    Ok(applied)
}

/// Reads `max(version)` from the ledger; `0` when the ledger is empty.
pub fn current_version(conn: &Connection) -> Result<u32, MigrationError> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version;",
        [],
        |row| row.get::<_, u32>(0),
    )
    .map_err(MigrationError::Ledger)
}

fn apply_one(conn: &mut Connection, migration: &Migration) -> Result<(), MigrationError> {
    let version = migration.version;
    let tx = conn
        .transaction()
        .map_err(|source| MigrationError::Statement { version, source })?;

    tx.execute_batch(migration.sql)
        .map_err(|source| MigrationError::Statement { version, source })?;

    let applied_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    tx.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2);",
        params![version, applied_at],
    )
    .map_err(|source| MigrationError::LedgerWrite { version, source })?;

    tx.commit()
        .map_err(|source| MigrationError::LedgerWrite { version, source })
}

fn validate_sequence(migrations: &[Migration]) -> Result<(), MigrationError> {
    let mut previous = 0;
    for migration in migrations {
        if migration.version <= previous {
            return Err(MigrationError::InvalidSequence {
                version: migration.version,
                previous,
            });
        }
        previous = migration.version;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        apply_migration_set, current_version, latest_version, registered_migrations, Migration,
        MigrationError,
    };
    use rusqlite::Connection;

    const CREATE_A: Migration = Migration {
        version: 1,
        name: "create_a",
        sql: "CREATE TABLE IF NOT EXISTS a (id INTEGER);",
    };
    const CREATE_B: Migration = Migration {
        version: 2,
        name: "create_b",
        sql: "CREATE TABLE IF NOT EXISTS b (id INTEGER);",
    };
    const BROKEN: Migration = Migration {
        version: 3,
        name: "broken",
        sql: "CREATE TABLE nope (;",
    };
    const CREATE_D: Migration = Migration {
        version: 4,
        name: "create_d",
        sql: "CREATE TABLE IF NOT EXISTS d (id INTEGER);",
    };

    fn ledger_rows(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM schema_version;", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn registry_is_strictly_ascending() {
        let versions = registered_migrations()
            .iter()
            .map(|m| m.version)
            .collect::<Vec<_>>();
        assert!(versions.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(versions.last().copied(), Some(latest_version()));
    }

    #[test]
    fn empty_ledger_reports_version_zero() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_migration_set(&mut conn, &[]).unwrap();
        assert_eq!(current_version(&conn).unwrap(), 0);
    }

    #[test]
    fn second_run_is_a_no_op() {
        let mut conn = Connection::open_in_memory().unwrap();
        let first = apply_migration_set(&mut conn, &[CREATE_A, CREATE_B]).unwrap();
        let second = apply_migration_set(&mut conn, &[CREATE_A, CREATE_B]).unwrap();

        assert_eq!(first, vec![1, 2]);
        assert!(second.is_empty());
        assert_eq!(ledger_rows(&conn), 2);
        assert_eq!(current_version(&conn).unwrap(), 2);
    }

    #[test]
    fn failure_stops_run_and_resumes_from_last_recorded_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        let err = apply_migration_set(&mut conn, &[CREATE_A, CREATE_B, BROKEN, CREATE_D])
            .unwrap_err();

        assert!(matches!(err, MigrationError::Statement { version: 3, .. }));
        assert_eq!(current_version(&conn).unwrap(), 2);
        let d_exists: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'd';",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(d_exists, 0);

        let fixed = Migration {
            sql: "CREATE TABLE IF NOT EXISTS c (id INTEGER);",
            ..BROKEN
        };
        let resumed = apply_migration_set(&mut conn, &[CREATE_A, CREATE_B, fixed, CREATE_D])
            .unwrap();
        assert_eq!(resumed, vec![3, 4]);
        assert_eq!(ledger_rows(&conn), 4);
    }

    #[test]
    fn out_of_order_list_fails_before_running_anything() {
        let mut conn = Connection::open_in_memory().unwrap();
        let err = apply_migration_set(&mut conn, &[CREATE_B, CREATE_A]).unwrap_err();

        assert!(matches!(
            err,
            MigrationError::InvalidSequence {
                version: 1,
                previous: 2
            }
        ));
        let ledger_exists: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'schema_version';",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(ledger_exists, 0);
    }

    #[test]
    fn zero_version_is_rejected() {
        let mut conn = Connection::open_in_memory().unwrap();
        let zero = Migration {
            version: 0,
            ..CREATE_A
        };
        assert!(matches!(
            apply_migration_set(&mut conn, &[zero]),
            Err(MigrationError::InvalidSequence { version: 0, .. })
        ));
    }
}
