//! Dataset lifecycle, resilient query execution and multi-dataset switching.
//!
//! # Responsibility
//! - Gate every query behind provisioning, migration and verification.
//! - Wrap every data-access call with timing and bounded retry.
//! - Compose several dataset controllers behind one manager.
//!
//! # See also
//! - `db` for migrations and verification, `provision` for bundles.

pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod manager;
pub mod pages;

pub use error::{StoreError, StoreResult};
pub use executor::{ExecutorStats, QueryExecutor, RetryPolicy};
pub use lifecycle::{backup_path, DatasetStore, LifecyclePhase, StoreDiagnostics};
pub use manager::DatasetManager;
pub use pages::PassagePages;
