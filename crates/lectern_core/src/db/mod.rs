//! SQLite storage bootstrap, schema migrations and post-migration checks.
//!
//! # Responsibility
//! - Open and configure the connection for one dataset file.
//! - Apply the versioned migration ledger in deterministic order.
//! - Verify schema and catalog sanity before the dataset is served.
//!
//! # Invariants
//! - Schema version is the max version recorded in `schema_version`.
//! - Core code must not serve reads before migrations and verification succeed.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;
pub mod verify;

pub use migrations::MigrationError;
pub use open::open_db;
pub use verify::VerificationError;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    Migration(MigrationError),
    Verification(VerificationError),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Migration(err) => write!(f, "migration failed: {err}"),
            Self::Verification(err) => write!(f, "verification failed: {err}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Migration(err) => Some(err),
            Self::Verification(err) => Some(err),
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<MigrationError> for DbError {
    fn from(value: MigrationError) -> Self {
        Self::Migration(value)
    }
}

impl From<VerificationError> for DbError {
    fn from(value: VerificationError) -> Self {
        Self::Verification(value)
    }
}
