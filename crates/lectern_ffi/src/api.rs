//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Own the process-level context: one tokio runtime and one
//!   `DatasetManager`, created by `init_store` and torn down by
//!   `shutdown_store`.
//! - Expose dataset reads as plain records with simple error envelopes.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Records never carry connection handles.

use lectern_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, load_config,
    ping as ping_inner, Annotation, DatasetManager, DatasetStore, Document, MetadataEntry,
    Passage, SearchOptions, StoreConfig, StoreError, StoreResult,
};
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::runtime::Runtime;

const SEARCH_DEFAULT_LIMIT: u32 = 50;
const SEARCH_LIMIT_MAX: u32 = 200;

static CONTEXT: RwLock<Option<Arc<AppContext>>> = RwLock::new(None);

struct AppContext {
    runtime: Runtime,
    manager: DatasetManager,
}

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// One bundled dataset: registry name and file name inside the bundle root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetAsset {
    pub name: String,
    pub file: String,
}

/// Store bootstrap request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreInitRequest {
    /// Application private storage root.
    pub data_dir: String,
    /// Read-only directory holding bundled dataset files.
    pub bundle_dir: String,
    pub assets: Vec<DatasetAsset>,
    pub default_dataset: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentItem {
    pub ordinal: i64,
    pub short_name: String,
    pub long_name: String,
    pub color: Option<String>,
    pub is_present: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassageItem {
    pub document: i64,
    pub section: i64,
    pub item: i64,
    /// Raw markup, rendered on the Dart side.
    pub text: String,
    pub document_short_name: Option<String>,
    pub document_color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationItem {
    pub document: i64,
    pub section: Option<i64>,
    pub item: Option<i64>,
    pub order_if_several: i64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataItem {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentResponse {
    pub ok: bool,
    /// `None` when the ordinal is not in the catalog.
    pub item: Option<DocumentItem>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentListResponse {
    pub ok: bool,
    pub items: Vec<DocumentItem>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassageListResponse {
    pub ok: bool,
    pub items: Vec<PassageItem>,
    pub message: String,
}

/// One page of a section read.
///
/// Pass `next_offset` back to fetch the following page; stop once
/// `finished` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassagePageResponse {
    pub ok: bool,
    pub items: Vec<PassageItem>,
    pub next_offset: u64,
    pub finished: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationListResponse {
    pub ok: bool,
    pub items: Vec<AnnotationItem>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataResponse {
    pub ok: bool,
    pub items: Vec<MetadataItem>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountResponse {
    pub ok: bool,
    pub count: u64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsResponse {
    pub ok: bool,
    pub documents: u64,
    pub passages: u64,
    pub annotations: u64,
    pub prefaces: u64,
    pub schema_version: u32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthResponse {
    pub healthy: bool,
    pub details: String,
}

/// Generic action envelope; `value` carries e.g. a backup path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    pub ok: bool,
    pub value: Option<String>,
    pub message: String,
}

impl ActionResponse {
    fn success(message: impl Into<String>, value: Option<String>) -> Self {
        Self {
            ok: true,
            value,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            value: None,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchRequest {
    pub text: String,
    pub limit: Option<u32>,
    pub exact_match: bool,
    pub case_sensitive: bool,
    pub whole_words: bool,
    pub document_filter: Option<i64>,
}

/// Creates the process-level store context.
///
/// # FFI contract
/// - Sync call; only builds the runtime and the dataset registry. Datasets
///   open lazily on first use.
/// - Fails when a context already exists; call `shutdown_store` first.
/// - Returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_store(request: StoreInitRequest) -> String {
    let config = StoreConfig {
        default_dataset: request.default_dataset,
        bundle: Some(lectern_core::config::BundleConfig {
            root: PathBuf::from(request.bundle_dir.trim()),
            assets: request
                .assets
                .into_iter()
                .map(|asset| (asset.name, asset.file))
                .collect(),
        }),
        ..StoreConfig::new(request.data_dir.trim())
    };
    install_context(config)
}

/// Creates the process-level store context from a TOML config file.
#[flutter_rust_bridge::frb(sync)]
pub fn init_store_from_config(config_path: String) -> String {
    match load_config(PathBuf::from(config_path.trim()).as_path()) {
        Ok(config) => install_context(config),
        Err(err) => format!("init_store failed: {err}"),
    }
}

/// Closes every dataset and drops the process-level context.
///
/// Idempotent; returns empty string on success.
pub fn shutdown_store() -> String {
    let taken = CONTEXT
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    let Some(context) = taken else {
        return String::new();
    };
    match context.runtime.block_on(context.manager.close_all()) {
        Ok(()) => String::new(),
        Err(err) => format!("shutdown_store failed: {err}"),
    }
}

/// Dataset names available in the bundle, sorted.
#[flutter_rust_bridge::frb(sync)]
pub fn list_datasets() -> Vec<String> {
    current_context()
        .map(|context| context.manager.available_datasets())
        .unwrap_or_default()
}

#[flutter_rust_bridge::frb(sync)]
pub fn active_dataset() -> Option<String> {
    current_context().and_then(|context| context.manager.active_name())
}

/// Switches the active dataset; on failure no dataset is active.
pub fn switch_dataset(name: String) -> ActionResponse {
    let Some(context) = current_context() else {
        return ActionResponse::failure(not_initialized("switch_dataset"));
    };
    let name = name.trim().to_string();
    match context.runtime.block_on(context.manager.switch_active(&name)) {
        Ok(_) => ActionResponse::success("Dataset switched.", Some(name)),
        Err(err) => ActionResponse::failure(format!("switch_dataset failed: {err}")),
    }
}

pub fn get_documents() -> DocumentListResponse {
    document_list("get_documents", |store| async move {
        store.documents().await
    })
}

pub fn get_universal_documents() -> DocumentListResponse {
    document_list("get_universal_documents", |store| async move {
        store.universal_documents().await
    })
}

pub fn get_passages(document: i64, section: i64) -> PassageListResponse {
    passage_list("get_passages", move |store| async move {
        store.passages(document, section).await
    })
}

/// Single passage wrapped in a list envelope; empty when absent.
pub fn get_passage(document: i64, section: i64, item: i64) -> PassageListResponse {
    passage_list("get_passage", move |store| async move {
        Ok(store
            .passage(document, section, item)
            .await?
            .into_iter()
            .collect())
    })
}

pub fn get_passage_range(document: i64, section: i64, start: i64, end: i64) -> PassageListResponse {
    passage_list("get_passage_range", move |store| async move {
        store.passage_range(document, section, start, end).await
    })
}

/// Reads the page of one section that starts at `offset`.
///
/// Start with `offset = 0`. A dataset that starts closing mid-sequence ends
/// it quietly with `finished = true`.
pub fn get_passage_page(document: i64, section: i64, offset: u64) -> PassagePageResponse {
    let read = with_active_store(move |store| async move {
        let mut pages = store.passage_pages(document, section).starting_at(offset);
        let page = pages.next_page().await?;
        Ok::<_, StoreError>((page.unwrap_or_default(), pages.offset(), pages.is_finished()))
    });
    match read {
        Ok((passages, next_offset, finished)) => PassagePageResponse {
            ok: true,
            items: passages.into_iter().map(to_passage_item).collect(),
            next_offset,
            finished,
            message: String::new(),
        },
        Err(err) => PassagePageResponse {
            ok: false,
            items: Vec::new(),
            next_offset: offset,
            finished: true,
            message: format!("get_passage_page failed: {err}"),
        },
    }
}

pub fn search_passages(request: SearchRequest) -> PassageListResponse {
    let options = SearchOptions {
        limit: normalize_search_limit(request.limit),
        exact_match: request.exact_match,
        case_sensitive: request.case_sensitive,
        whole_words: request.whole_words,
        document_filter: request.document_filter,
    };
    let text = request.text;
    passage_list("search_passages", move |store| async move {
        store.search(&text, &options).await
    })
}

pub fn get_document(ordinal: i64) -> DocumentResponse {
    match with_active_store(move |store| async move { store.document(ordinal).await }) {
        Ok(document) => DocumentResponse {
            ok: true,
            item: document.map(to_document_item),
            message: String::new(),
        },
        Err(err) => DocumentResponse {
            ok: false,
            item: None,
            message: format!("get_document failed: {err}"),
        },
    }
}

/// Headings of one section, ordered by position.
pub fn get_annotations(document: i64, section: i64) -> AnnotationListResponse {
    match with_active_store(move |store| async move { store.annotations(document, section).await })
    {
        Ok(annotations) => AnnotationListResponse {
            ok: true,
            items: annotations.into_iter().map(to_annotation_item).collect(),
            message: String::new(),
        },
        Err(err) => AnnotationListResponse {
            ok: false,
            items: Vec::new(),
            message: format!("get_annotations failed: {err}"),
        },
    }
}

/// Preface text in `value`; `None` when the document has none.
pub fn get_preface(document: i64) -> ActionResponse {
    match with_active_store(move |store| async move { store.preface(document).await }) {
        Ok(preface) => ActionResponse::success("", preface.map(|preface| preface.text)),
        Err(err) => ActionResponse::failure(format!("get_preface failed: {err}")),
    }
}

pub fn get_metadata() -> MetadataResponse {
    match with_active_store(|store| async move { store.metadata().await }) {
        Ok(entries) => MetadataResponse {
            ok: true,
            items: entries.into_iter().map(to_metadata_item).collect(),
            message: String::new(),
        },
        Err(err) => MetadataResponse {
            ok: false,
            items: Vec::new(),
            message: format!("get_metadata failed: {err}"),
        },
    }
}

pub fn get_metadata_value(name: String) -> ActionResponse {
    let name = name.trim().to_string();
    match with_active_store(move |store| async move { store.metadata_value(&name).await }) {
        Ok(value) => ActionResponse::success("", value),
        Err(err) => ActionResponse::failure(format!("get_metadata_value failed: {err}")),
    }
}

pub fn get_section_count(document: i64) -> CountResponse {
    count("get_section_count", move |store| async move {
        store.section_count(document).await
    })
}

pub fn get_item_count(document: i64, section: i64) -> CountResponse {
    count("get_item_count", move |store| async move {
        store.item_count(document, section).await
    })
}

pub fn dataset_stats() -> StatsResponse {
    match with_active_store(|store| async move { store.stats().await }) {
        Ok(stats) => StatsResponse {
            ok: true,
            documents: stats.documents,
            passages: stats.passages,
            annotations: stats.annotations,
            prefaces: stats.prefaces,
            schema_version: stats.schema_version,
            message: String::new(),
        },
        Err(err) => StatsResponse {
            ok: false,
            documents: 0,
            passages: 0,
            annotations: 0,
            prefaces: 0,
            schema_version: 0,
            message: format!("dataset_stats failed: {err}"),
        },
    }
}

/// Never fails; problems come back as `healthy = false`.
pub fn health_check() -> HealthResponse {
    let Some(context) = current_context() else {
        return HealthResponse {
            healthy: false,
            details: not_initialized("health_check"),
        };
    };
    let Some(store) = context.manager.active().ok() else {
        return HealthResponse {
            healthy: false,
            details: "no active dataset".to_string(),
        };
    };
    let report = context.runtime.block_on(store.health_check());
    HealthResponse {
        healthy: report.healthy,
        details: report.details,
    }
}

/// Backs up the active dataset; `value` holds the backup path.
pub fn backup_dataset() -> ActionResponse {
    match with_active_store(|store| async move { store.backup().await }) {
        Ok(path) => ActionResponse::success(
            "Backup created.",
            Some(path.to_string_lossy().into_owned()),
        ),
        Err(err) => ActionResponse::failure(format!("backup_dataset failed: {err}")),
    }
}

pub fn restore_dataset(backup_path: String) -> ActionResponse {
    let path = PathBuf::from(backup_path.trim());
    match with_active_store(move |store| async move { store.restore(&path).await }) {
        Ok(()) => ActionResponse::success("Dataset restored.", None),
        Err(err) => ActionResponse::failure(format!("restore_dataset failed: {err}")),
    }
}

fn install_context(config: StoreConfig) -> String {
    let mut slot = CONTEXT.write().unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
        return "store already initialized; call shutdown_store first".to_string();
    }

    let manager = match DatasetManager::from_config(config) {
        Ok(manager) => manager,
        Err(err) => return format!("init_store failed: {err}"),
    };
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => return format!("init_store failed: {err}"),
    };

    log::info!(
        "event=store_init module=ffi status=ok datasets={}",
        manager.available_datasets().len()
    );
    *slot = Some(Arc::new(AppContext { runtime, manager }));
    String::new()
}

fn current_context() -> Option<Arc<AppContext>> {
    CONTEXT
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

fn not_initialized(operation: &str) -> String {
    format!("{operation} failed: store not initialized")
}

fn with_active_store<T, F, Fut>(operation: F) -> Result<T, String>
where
    F: FnOnce(Arc<DatasetStore>) -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let context = current_context().ok_or_else(|| "store not initialized".to_string())?;
    context
        .runtime
        .block_on(async {
            let store = context.manager.active_or_default().await?;
            operation(store).await
        })
        .map_err(|err| err.to_string())
}

fn document_list<F, Fut>(label: &str, operation: F) -> DocumentListResponse
where
    F: FnOnce(Arc<DatasetStore>) -> Fut,
    Fut: Future<Output = StoreResult<Vec<Document>>>,
{
    match with_active_store(operation) {
        Ok(documents) => DocumentListResponse {
            ok: true,
            items: documents.into_iter().map(to_document_item).collect(),
            message: String::new(),
        },
        Err(err) => DocumentListResponse {
            ok: false,
            items: Vec::new(),
            message: format!("{label} failed: {err}"),
        },
    }
}

fn passage_list<F, Fut>(label: &str, operation: F) -> PassageListResponse
where
    F: FnOnce(Arc<DatasetStore>) -> Fut,
    Fut: Future<Output = StoreResult<Vec<Passage>>>,
{
    match with_active_store(operation) {
        Ok(passages) => {
            let message = if passages.is_empty() {
                "No results.".to_string()
            } else {
                format!("Found {} result(s).", passages.len())
            };
            PassageListResponse {
                ok: true,
                items: passages.into_iter().map(to_passage_item).collect(),
                message,
            }
        }
        Err(err) => PassageListResponse {
            ok: false,
            items: Vec::new(),
            message: format!("{label} failed: {err}"),
        },
    }
}

fn count<F, Fut>(label: &str, operation: F) -> CountResponse
where
    F: FnOnce(Arc<DatasetStore>) -> Fut,
    Fut: Future<Output = StoreResult<u64>>,
{
    match with_active_store(operation) {
        Ok(count) => CountResponse {
            ok: true,
            count,
            message: String::new(),
        },
        Err(err) => CountResponse {
            ok: false,
            count: 0,
            message: format!("{label} failed: {err}"),
        },
    }
}

fn normalize_search_limit(limit: Option<u32>) -> u32 {
    match limit {
        Some(0) | None => SEARCH_DEFAULT_LIMIT,
        Some(value) if value > SEARCH_LIMIT_MAX => SEARCH_LIMIT_MAX,
        Some(value) => value,
    }
}

fn to_document_item(document: Document) -> DocumentItem {
    DocumentItem {
        ordinal: document.ordinal,
        short_name: document.short_name,
        long_name: document.long_name,
        color: document.color,
        is_present: document.is_present,
    }
}

fn to_annotation_item(annotation: Annotation) -> AnnotationItem {
    AnnotationItem {
        document: annotation.document,
        section: annotation.section,
        item: annotation.item,
        order_if_several: annotation.order_if_several,
        text: annotation.text,
    }
}

fn to_metadata_item(entry: MetadataEntry) -> MetadataItem {
    MetadataItem {
        name: entry.name,
        value: entry.value,
    }
}

fn to_passage_item(passage: Passage) -> PassageItem {
    PassageItem {
        document: passage.document,
        section: passage.section,
        item: passage.item,
        text: passage.text,
        document_short_name: passage.document_short_name,
        document_color: passage.document_color,
    }
}
