//! Post-migration schema and data sanity checks.

use super::migrations::{current_version, latest_version, MigrationError};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Tables a dataset must expose after migrations ran.
pub const REQUIRED_TABLES: &[&str] = &[
    "info",
    "books",
    "books_all",
    "verses",
    "stories",
    "introductions",
    "schema_version",
];

#[derive(Debug)]
pub enum VerificationError {
    MissingTable(&'static str),
    EmptyCatalog,
    SchemaBehind { current: u32, expected: u32 },
    Sqlite(rusqlite::Error),
}

impl Display for VerificationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingTable(name) => write!(f, "required table `{name}` is missing"),
            Self::EmptyCatalog => write!(f, "dataset has no documents"),
            Self::SchemaBehind { current, expected } => write!(
                f,
                "schema version {current} is behind expected {expected}"
            ),
            Self::Sqlite(err) => write!(f, "{err}"),
        }
    }
}

impl Error for VerificationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for VerificationError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Tables shipped in every dataset file; migrations build on them.
pub const CORE_TABLES: &[&str] = &["info", "books", "verses"];

/// Checks the shipped tables before any migration touches the file.
pub fn verify_core_tables(conn: &Connection) -> Result<(), VerificationError> {
    require_tables(conn, CORE_TABLES)
}

/// Checks required tables, ledger position and a non-empty document catalog.
pub fn verify_dataset(conn: &Connection) -> Result<(), VerificationError> {
    require_tables(conn, REQUIRED_TABLES)?;

    let current = current_version(conn).map_err(|err| match err {
        MigrationError::Ledger(source) => VerificationError::Sqlite(source),
        _ => VerificationError::MissingTable("schema_version"),
    })?;
    let expected = latest_version();
    if current < expected {
        return Err(VerificationError::SchemaBehind { current, expected });
    }

    let documents: i64 = conn.query_row("SELECT COUNT(*) FROM books;", [], |row| row.get(0))?;
    if documents == 0 {
        return Err(VerificationError::EmptyCatalog);
    }

    Ok(())
}

fn require_tables(conn: &Connection, tables: &[&'static str]) -> Result<(), VerificationError> {
    for table in tables {
        if !table_exists(conn, table)? {
            return Err(VerificationError::MissingTable(table));
        }
    }
    Ok(())
}

pub(crate) fn table_exists(conn: &Connection, name: &str) -> Result<bool, rusqlite::Error> {
    conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1
        );",
        [name],
        |row| row.get::<_, bool>(0),
    )
}
