//! Per-dataset lifecycle controller.
//!
//! # Responsibility
//! - Own the single connection of one dataset.
//! - Run provision -> open -> migrate -> verify at most once per attempt,
//!   sharing the outcome with every concurrent caller.
//! - Serve the typed query surface through the retrying executor.
//!
//! # Invariants
//! - `Closing` rejects every new query with `DatabaseClosing`.
//! - Lock order is state before connection; neither lock is held across an
//!   await point.
//! - A failed initialization returns the state to `Uninitialized` so the
//!   next call starts from scratch.

use super::error::{StoreError, StoreResult};
use super::executor::{ExecutorStats, QueryExecutor, RetryPolicy};
use super::pages::PassagePages;
use crate::config::StoreConfig;
use crate::db::open_db;
use crate::model::passage::{
    Annotation, DatasetStats, Document, HealthReport, MetadataEntry, Passage, PassageRange,
    Preface,
};
use crate::provision::{
    ensure_local_file, file_exists, partial_path, AssetBundle, ProvisionOutcome,
};
use crate::repo::passage_repo::{PassageRepository, RepoResult, SqlitePassageRepository};
use crate::search::substring::SearchOptions;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{error, info, warn};
use rusqlite::Connection;
use serde::Serialize;
use std::fmt::{Debug, Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::watch;

const MAX_BACKUP_SUFFIX: u32 = 999;

/// Observable lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LifecyclePhase {
    Uninitialized,
    Initializing,
    Ready,
    Closing,
    Closed,
}

impl Display for LifecyclePhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(label)
    }
}

impl LifecyclePhase {
    /// Transition table for the controller.
    pub fn can_transition_to(self, next: LifecyclePhase) -> bool {
        use LifecyclePhase::*;
        matches!(
            (self, next),
            (Uninitialized | Closed, Initializing)
                // an abandoned attempt is replaced by a fresh one
                | (Initializing, Initializing)
                | (Initializing, Ready)
                | (Initializing, Uninitialized)
                | (Initializing | Ready, Closing)
                // restore claims an idle dataset before touching its file
                | (Uninitialized | Closed, Closing)
                | (Closing, Closed)
        )
    }
}

type InitSignal = Option<Result<(), Arc<StoreError>>>;

enum LifecycleState {
    Uninitialized,
    Initializing {
        generation: u64,
        signal: watch::Receiver<InitSignal>,
    },
    Ready,
    Closing,
    Closed,
}

impl LifecycleState {
    fn phase(&self) -> LifecyclePhase {
        match self {
            Self::Uninitialized => LifecyclePhase::Uninitialized,
            Self::Initializing { .. } => LifecyclePhase::Initializing,
            Self::Ready => LifecyclePhase::Ready,
            Self::Closing => LifecyclePhase::Closing,
            Self::Closed => LifecyclePhase::Closed,
        }
    }
}

enum InitRole {
    Leader {
        generation: u64,
        publish: watch::Sender<InitSignal>,
    },
    Follower(watch::Receiver<InitSignal>),
}

enum CloseEntry {
    Entered,
    AlreadyClosing,
    Idle,
}

/// Per-dataset counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreDiagnostics {
    pub phase: LifecyclePhase,
    pub bootstrap_runs: u64,
    pub asset_copies: u64,
    pub executor: ExecutorStats,
}

/// One dataset file plus its connection and lifecycle.
pub struct DatasetStore {
    name: String,
    path: PathBuf,
    bundle: Arc<dyn AssetBundle>,
    executor: QueryExecutor,
    page_size: u32,
    state: Mutex<LifecycleState>,
    conn: Mutex<Option<Connection>>,
    next_generation: AtomicU64,
    bootstrap_runs: AtomicU64,
    asset_copies: AtomicU64,
}

impl Debug for DatasetStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetStore")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl DatasetStore {
    pub fn new(name: impl Into<String>, config: &StoreConfig, bundle: Arc<dyn AssetBundle>) -> Self {
        let name = name.into();
        let policy = RetryPolicy {
            max_retries: config.max_retries,
            delay: config.retry_delay(),
        };
        Self {
            path: config.dataset_path(&name),
            executor: QueryExecutor::new(name.clone(), policy, config.slow_query_threshold()),
            page_size: config.page_size.max(1),
            name,
            bundle,
            state: Mutex::new(LifecycleState::Uninitialized),
            conn: Mutex::new(None),
            next_generation: AtomicU64::new(1),
            bootstrap_runs: AtomicU64::new(0),
            asset_copies: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.lock_state().phase()
    }

    pub fn is_closing(&self) -> bool {
        self.phase() == LifecyclePhase::Closing
    }

    pub fn diagnostics(&self) -> StoreDiagnostics {
        StoreDiagnostics {
            phase: self.phase(),
            bootstrap_runs: self.bootstrap_runs.load(Ordering::Relaxed),
            asset_copies: self.asset_copies.load(Ordering::Relaxed),
            executor: self.executor.stats(),
        }
    }

    /// Brings the dataset to `Ready`.
    ///
    /// Concurrent callers share one bootstrap: the first caller runs it,
    /// everyone else awaits its published outcome.
    pub async fn init(&self) -> StoreResult<()> {
        let role = {
            let mut state = self.lock_state();
            match &*state {
                LifecycleState::Ready => return Ok(()),
                LifecycleState::Closing => return Err(StoreError::DatabaseClosing),
                LifecycleState::Initializing { signal, .. } if !is_abandoned(signal) => {
                    InitRole::Follower(signal.clone())
                }
                _ => {
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    let (publish, signal) = watch::channel(None);
                    self.transition(
                        &mut state,
                        LifecycleState::Initializing { generation, signal },
                    );
                    InitRole::Leader {
                        generation,
                        publish,
                    }
                }
            }
        };

        match role {
            InitRole::Leader {
                generation,
                publish,
            } => self.lead_init(generation, publish).await,
            InitRole::Follower(signal) => follow_init(signal).await,
        }
    }

    async fn lead_init(&self, generation: u64, publish: watch::Sender<InitSignal>) -> StoreResult<()> {
        let bootstrapped = self.bootstrap().await;

        let outcome = {
            let mut state = self.lock_state();
            let current = matches!(
                &*state,
                LifecycleState::Initializing { generation: active, .. } if *active == generation
            );
            match bootstrapped {
                Ok(conn) if current => {
                    *self.lock_conn() = Some(conn);
                    self.transition(&mut state, LifecycleState::Ready);
                    Ok(())
                }
                // close() took over while bootstrapping; the fresh connection is dropped
                Ok(_) => Err(Arc::new(StoreError::DatabaseClosing)),
                Err(err) => {
                    if current {
                        self.transition(&mut state, LifecycleState::Uninitialized);
                    }
                    Err(Arc::new(err))
                }
            }
        };

        let _ = publish.send(Some(outcome.clone()));
        outcome.map_err(StoreError::from_shared)
    }

    async fn bootstrap(&self) -> StoreResult<Connection> {
        self.bootstrap_runs.fetch_add(1, Ordering::Relaxed);
        let started_at = Instant::now();
        info!(
            "event=dataset_init module=store status=start dataset={}",
            self.name
        );

        let result = self.bootstrap_steps().await;
        match &result {
            Ok(_) => info!(
                "event=dataset_init module=store status=ok dataset={} duration_ms={}",
                self.name,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=dataset_init module=store status=error dataset={} duration_ms={} error={}",
                self.name,
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    async fn bootstrap_steps(&self) -> StoreResult<Connection> {
        let outcome = ensure_local_file(self.bundle.as_ref(), &self.name, &self.path).await?;
        if let ProvisionOutcome::Copied { .. } = outcome {
            self.asset_copies.fetch_add(1, Ordering::Relaxed);
        }
        Ok(open_db(&self.path)?)
    }

    async fn ensure_initialized(&self) -> StoreResult<()> {
        match self.phase() {
            LifecyclePhase::Ready => Ok(()),
            LifecyclePhase::Closing => Err(StoreError::DatabaseClosing),
            _ => self.init().await,
        }
    }

    /// Releases the connection; idempotent.
    ///
    /// In-flight retry loops observe `Closing` and stop. The next query
    /// after the close completes reopens the dataset lazily.
    pub async fn close(&self) -> StoreResult<()> {
        match self.enter_closing(false) {
            CloseEntry::Entered => {
                self.release_connection();
                self.finish_close();
                Ok(())
            }
            CloseEntry::AlreadyClosing | CloseEntry::Idle => Ok(()),
        }
    }

    fn enter_closing(&self, include_idle: bool) -> CloseEntry {
        let mut state = self.lock_state();
        match state.phase() {
            LifecyclePhase::Closing => CloseEntry::AlreadyClosing,
            LifecyclePhase::Ready | LifecyclePhase::Initializing => {
                self.transition(&mut state, LifecycleState::Closing);
                CloseEntry::Entered
            }
            LifecyclePhase::Uninitialized | LifecyclePhase::Closed if include_idle => {
                self.transition(&mut state, LifecycleState::Closing);
                CloseEntry::Entered
            }
            LifecyclePhase::Uninitialized | LifecyclePhase::Closed => CloseEntry::Idle,
        }
    }

    fn release_connection(&self) {
        let released = self.lock_conn().take();
        if let Some(conn) = released {
            if let Err((_, err)) = conn.close() {
                warn!(
                    "event=dataset_close module=store status=error dataset={} error={}",
                    self.name, err
                );
            }
        }
        info!(
            "event=dataset_close module=store status=ok dataset={}",
            self.name
        );
    }

    fn finish_close(&self) {
        let mut state = self.lock_state();
        self.transition(&mut state, LifecycleState::Closed);
    }

    /// Never fails; problems are reported as an unhealthy result.
    pub async fn health_check(&self) -> HealthReport {
        let phase = self.phase();
        if phase != LifecyclePhase::Ready {
            return HealthReport::unhealthy(format!(
                "dataset `{}` is not ready (state={phase})",
                self.name
            ));
        }

        let checked = self.with_connection(|conn| {
            conn.query_row("SELECT 1;", [], |row| row.get::<_, i64>(0))?;
            SqlitePassageRepository::new(conn).stats()
        });
        match checked {
            Ok(stats) if stats.documents == 0 || stats.passages == 0 => {
                HealthReport::unhealthy(format!(
                    "dataset `{}` is empty: documents={} passages={}",
                    self.name, stats.documents, stats.passages
                ))
            }
            Ok(stats) => HealthReport::healthy(format!(
                "dataset `{}` ok: documents={} passages={} schema_version={}",
                self.name, stats.documents, stats.passages, stats.schema_version
            )),
            Err(err) => HealthReport::unhealthy(format!("dataset `{}`: {err}", self.name)),
        }
    }

    /// Copies the live file to `<file>.backup.<timestamp>` and returns that path.
    ///
    /// Backups taken within the same millisecond get a `-<n>` suffix.
    pub async fn backup(&self) -> StoreResult<PathBuf> {
        let phase = self.phase();
        if phase != LifecyclePhase::Ready {
            return Err(StoreError::NotReady(phase));
        }

        let target = reserve_backup_path(backup_path(&self.path, Utc::now())).await?;
        let (source, dest) = (self.path.as_path(), target.as_path());
        let copied = self
            .executor
            .run("backup", || self.is_closing(), move || async move {
                tokio::fs::copy(source, dest)
                    .await
                    .map(|_| ())
                    .map_err(|err| io_error("backup", dest, err))
            })
            .await;
        if let Err(err) = copied {
            let _ = tokio::fs::remove_file(&target).await;
            return Err(err);
        }

        info!(
            "event=dataset_backup module=store status=ok dataset={}",
            self.name
        );
        Ok(target)
    }

    /// Replaces the live file with `backup` and reopens the dataset.
    ///
    /// The dataset stays `Closing` while its file is replaced, so concurrent
    /// queries fail fast instead of reopening a half-written file.
    pub async fn restore(&self, backup: &Path) -> StoreResult<()> {
        if !file_exists(backup).await {
            return Err(io_error(
                "restore",
                backup,
                std::io::Error::new(std::io::ErrorKind::NotFound, "backup file not found"),
            ));
        }

        if let CloseEntry::AlreadyClosing = self.enter_closing(true) {
            return Err(StoreError::DatabaseClosing);
        }
        self.release_connection();

        let partial = partial_path(&self.path);
        let (dest, staging) = (self.path.as_path(), partial.as_path());
        // The store is Closing here by construction, so the executor must not
        // treat that as a reason to stop.
        let copied = self
            .executor
            .run("restore", || false, move || async move {
                tokio::fs::copy(backup, staging)
                    .await
                    .map_err(|err| io_error("restore", staging, err))?;
                tokio::fs::rename(staging, dest)
                    .await
                    .map_err(|err| io_error("restore", dest, err))
            })
            .await;
        self.finish_close();

        if let Err(err) = copied {
            let _ = tokio::fs::remove_file(&partial).await;
            error!(
                "event=dataset_restore module=store status=error dataset={} error={}",
                self.name, err
            );
            return Err(err);
        }

        info!(
            "event=dataset_restore module=store status=ok dataset={}",
            self.name
        );
        self.init().await
    }

    pub async fn documents(&self) -> StoreResult<Vec<Document>> {
        self.query("get_documents", |repo| repo.documents()).await
    }

    pub async fn universal_documents(&self) -> StoreResult<Vec<Document>> {
        self.query("get_universal_documents", |repo| repo.universal_documents())
            .await
    }

    pub async fn document(&self, ordinal: i64) -> StoreResult<Option<Document>> {
        self.query("get_document", |repo| repo.document(ordinal)).await
    }

    pub async fn passages(&self, document: i64, section: i64) -> StoreResult<Vec<Passage>> {
        self.query("get_passages", |repo| repo.passages(document, section))
            .await
    }

    pub async fn passage(
        &self,
        document: i64,
        section: i64,
        item: i64,
    ) -> StoreResult<Option<Passage>> {
        self.query("get_passage", |repo| repo.passage(document, section, item))
            .await
    }

    /// Items `start..=end` of one section, ascending.
    pub async fn passage_range(
        &self,
        document: i64,
        section: i64,
        start: i64,
        end: i64,
    ) -> StoreResult<Vec<Passage>> {
        let range = PassageRange::new(document, section, start, end);
        self.query("get_passage_range", |repo| repo.passage_range(&range))
            .await
    }

    /// Fetches several ranges one after another.
    pub async fn passage_ranges(&self, ranges: &[PassageRange]) -> StoreResult<Vec<Vec<Passage>>> {
        let mut batches = Vec::with_capacity(ranges.len());
        for range in ranges {
            batches.push(
                self.query("get_passage_ranges", |repo| repo.passage_range(range))
                    .await?,
            );
        }
        Ok(batches)
    }

    pub async fn search(&self, text: &str, options: &SearchOptions) -> StoreResult<Vec<Passage>> {
        self.query("search", |repo| repo.search(text, options)).await
    }

    /// Lazy, forward-only pages over one section. Each call starts a new cursor.
    pub fn passage_pages(&self, document: i64, section: i64) -> PassagePages<'_> {
        PassagePages::new(self, document, section, self.page_size)
    }

    pub async fn section_count(&self, document: i64) -> StoreResult<u64> {
        self.query("get_section_count", |repo| repo.section_count(document))
            .await
    }

    pub async fn item_count(&self, document: i64, section: i64) -> StoreResult<u64> {
        self.query("get_item_count", |repo| repo.item_count(document, section))
            .await
    }

    pub async fn annotations(&self, document: i64, section: i64) -> StoreResult<Vec<Annotation>> {
        self.query("get_annotations", |repo| repo.annotations(document, section))
            .await
    }

    pub async fn preface(&self, document: i64) -> StoreResult<Option<Preface>> {
        self.query("get_preface", |repo| repo.preface(document)).await
    }

    pub async fn metadata(&self) -> StoreResult<Vec<MetadataEntry>> {
        self.query("get_metadata", |repo| repo.metadata()).await
    }

    pub async fn metadata_value(&self, name: &str) -> StoreResult<Option<String>> {
        self.query("get_metadata_value", |repo| repo.metadata_value(name))
            .await
    }

    pub async fn stats(&self) -> StoreResult<DatasetStats> {
        self.query("dataset_stats", |repo| repo.stats()).await
    }

    pub(crate) async fn query<T>(
        &self,
        label: &'static str,
        operation: impl Fn(&SqlitePassageRepository<'_>) -> RepoResult<T>,
    ) -> StoreResult<T> {
        self.ensure_initialized().await?;
        let operation = &operation;
        self.executor
            .run(label, || self.is_closing(), move || async move {
                self.with_connection(|conn| operation(&SqlitePassageRepository::new(conn)))
            })
            .await
    }

    fn with_connection<T>(&self, operation: impl FnOnce(&Connection) -> RepoResult<T>) -> StoreResult<T> {
        if self.is_closing() {
            return Err(StoreError::DatabaseClosing);
        }
        let guard = self.lock_conn();
        let conn = guard.as_ref().ok_or(StoreError::DatabaseClosing)?;
        operation(conn).map_err(StoreError::Repo)
    }

    fn transition(&self, state: &mut LifecycleState, next: LifecycleState) {
        let (from, to) = (state.phase(), next.phase());
        debug_assert!(
            from.can_transition_to(to),
            "illegal lifecycle transition {from} -> {to}"
        );
        if !from.can_transition_to(to) {
            error!(
                "event=lifecycle module=store status=error dataset={} from={} to={} error_code=illegal_transition",
                self.name, from, to
            );
        }
        *state = next;
    }

    fn lock_state(&self) -> MutexGuard<'_, LifecycleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_conn(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn follow_init(mut signal: watch::Receiver<InitSignal>) -> StoreResult<()> {
    let outcome = match signal.wait_for(Option::is_some).await {
        Ok(value) => value.clone(),
        Err(_) => return Err(StoreError::InitAbandoned),
    };
    match outcome {
        Some(Ok(())) => Ok(()),
        Some(Err(err)) => Err(StoreError::from_shared(err)),
        None => Err(StoreError::InitAbandoned),
    }
}

/// The leader dropped its sender without publishing an outcome.
fn is_abandoned(signal: &watch::Receiver<InitSignal>) -> bool {
    signal.has_changed().is_err() && signal.borrow().is_none()
}

fn io_error(operation: &'static str, path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        operation,
        path: path.to_path_buf(),
        source,
    }
}

/// Claims `base`, or the first free `base-<n>`, by creating it empty.
async fn reserve_backup_path(base: PathBuf) -> StoreResult<PathBuf> {
    let mut candidate = base.clone();
    for attempt in 1..=MAX_BACKUP_SUFFIX {
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(_) => return Ok(candidate),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                let mut raw = base.as_os_str().to_os_string();
                raw.push(format!("-{attempt}"));
                candidate = PathBuf::from(raw);
            }
            Err(err) => return Err(io_error("backup", &candidate, err)),
        }
    }
    Err(io_error(
        "backup",
        &base,
        std::io::Error::new(std::io::ErrorKind::AlreadyExists, "no free backup name"),
    ))
}

/// `<file>.backup.<RFC 3339 millis, ':' and '.' replaced by '-'>`.
pub fn backup_path(path: &Path, at: DateTime<Utc>) -> PathBuf {
    let stamp = at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    let mut raw = path.as_os_str().to_os_string();
    raw.push(format!(".backup.{stamp}"));
    PathBuf::from(raw)
}
