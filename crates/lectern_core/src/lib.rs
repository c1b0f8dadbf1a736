//! Core of the lectern reader: bundled translation datasets, their
//! migrations, and a retrying query surface for the UI.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod provision;
pub mod repo;
pub mod search;
pub mod store;

pub use config::{load_config, ConfigError, StoreConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::passage::{
    Annotation, DatasetStats, Document, HealthReport, MetadataEntry, Passage, PassageKey,
    PassageRange, Preface,
};
pub use provision::{AssetBundle, BundledAsset, DirectoryBundle, ProvisionError, StaticBundle};
pub use repo::passage_repo::{PassageRepository, RepoError, SqlitePassageRepository};
pub use search::substring::SearchOptions;
pub use store::{
    DatasetManager, DatasetStore, ExecutorStats, LifecyclePhase, PassagePages, RetryPolicy,
    StoreDiagnostics, StoreError, StoreResult,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
