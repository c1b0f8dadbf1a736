//! Top-level error taxonomy for dataset operations.

use super::lifecycle::LifecyclePhase;
use crate::db::DbError;
use crate::provision::ProvisionError;
use crate::repo::passage_repo::RepoError;
use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub enum StoreError {
    Provision(ProvisionError),
    /// Open, migration or verification failure during bootstrap.
    Db(DbError),
    Repo(RepoError),
    Io {
        operation: &'static str,
        path: PathBuf,
        source: io::Error,
    },
    /// A close is in progress; never retried.
    DatabaseClosing,
    NotReady(LifecyclePhase),
    /// Shared outcome of a failed initialization, seen by every waiter.
    InitFailed(Arc<StoreError>),
    /// The initializing caller went away before publishing an outcome.
    InitAbandoned,
    QueryFailed {
        label: &'static str,
        retries_exhausted: bool,
        attempts: u32,
        cause: Box<StoreError>,
    },
    NoActiveDataset,
    InvalidDatasetName(String),
}

impl StoreError {
    pub fn is_closing(&self) -> bool {
        match self {
            Self::DatabaseClosing => true,
            Self::InitFailed(inner) => inner.is_closing(),
            _ => false,
        }
    }

    /// Whether a retry can plausibly succeed: filesystem I/O and SQLite
    /// busy/locked/I/O codes. SQL and data errors are not transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io { .. } => true,
            Self::Repo(RepoError::Sqlite(err)) | Self::Db(DbError::Sqlite(err)) => {
                is_transient_sqlite(err)
            }
            _ => false,
        }
    }

    /// Innermost error behind wrapping variants.
    pub fn root_cause(&self) -> &StoreError {
        match self {
            Self::InitFailed(inner) => inner.root_cause(),
            Self::QueryFailed { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    pub(crate) fn from_shared(err: Arc<StoreError>) -> Self {
        if matches!(*err, StoreError::DatabaseClosing) {
            return StoreError::DatabaseClosing;
        }
        StoreError::InitFailed(err)
    }
}

fn is_transient_sqlite(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(
            ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::CannotOpen
        )
    )
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provision(err) => write!(f, "provisioning failed: {err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Io {
                operation,
                path,
                source,
            } => write!(f, "{operation} failed for `{}`: {source}", path.display()),
            Self::DatabaseClosing => write!(f, "database is closing"),
            Self::NotReady(phase) => write!(f, "database is not ready (state={phase})"),
            Self::InitFailed(err) => write!(f, "initialization failed: {err}"),
            Self::InitAbandoned => write!(f, "initialization was abandoned"),
            Self::QueryFailed {
                label,
                retries_exhausted,
                attempts,
                cause,
            } => write!(
                f,
                "{label} failed after {attempts} attempt(s) (retries_exhausted={retries_exhausted}): {cause}"
            ),
            Self::NoActiveDataset => write!(f, "no active dataset"),
            Self::InvalidDatasetName(name) => write!(f, "invalid dataset name `{name}`"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Provision(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Io { source, .. } => Some(source),
            Self::InitFailed(err) => Some(err.as_ref()),
            Self::QueryFailed { cause, .. } => Some(cause.as_ref()),
            Self::DatabaseClosing
            | Self::NotReady(_)
            | Self::InitAbandoned
            | Self::NoActiveDataset
            | Self::InvalidDatasetName(_) => None,
        }
    }
}

impl From<ProvisionError> for StoreError {
    fn from(value: ProvisionError) -> Self {
        Self::Provision(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<RepoError> for StoreError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

#[cfg(test)]
mod tests {
    use super::StoreError;
    use crate::repo::passage_repo::RepoError;
    use rusqlite::ffi;
    use std::sync::Arc;

    fn sqlite_failure(code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(ffi::Error::new(code), None)
    }

    #[test]
    fn busy_and_io_failures_are_transient() {
        assert!(StoreError::Repo(RepoError::Sqlite(sqlite_failure(ffi::SQLITE_BUSY))).is_transient());
        assert!(StoreError::Repo(RepoError::Sqlite(sqlite_failure(ffi::SQLITE_IOERR))).is_transient());
        assert!(!StoreError::Repo(RepoError::Sqlite(sqlite_failure(ffi::SQLITE_ERROR))).is_transient());
        assert!(!StoreError::Repo(RepoError::InvalidData("bad".into())).is_transient());
        assert!(!StoreError::DatabaseClosing.is_transient());
    }

    #[test]
    fn shared_closing_outcome_stays_closing() {
        let err = StoreError::from_shared(Arc::new(StoreError::DatabaseClosing));
        assert!(matches!(err, StoreError::DatabaseClosing));

        let wrapped = StoreError::from_shared(Arc::new(StoreError::NoActiveDataset));
        assert!(matches!(wrapped.root_cause(), StoreError::NoActiveDataset));
    }
}
