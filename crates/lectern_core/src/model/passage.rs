//! Document, passage and annotation records.

use serde::Serialize;

/// Top-level division of a dataset (a book).
///
/// The same shape serves both catalogs: `books` rows are always present,
/// `books_all` rows carry an explicit presence flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub ordinal: i64,
    pub short_name: String,
    pub long_name: String,
    pub color: Option<String>,
    pub is_present: bool,
}

/// Smallest addressable unit of text (a verse).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Passage {
    pub document: i64,
    pub section: i64,
    pub item: i64,
    /// Raw markup; rendering happens outside core.
    pub text: String,
    pub document_short_name: Option<String>,
    pub document_color: Option<String>,
}

impl Passage {
    pub fn key(&self) -> PassageKey {
        PassageKey {
            document: self.document,
            section: self.section,
            item: self.item,
        }
    }
}

/// Composite natural key of a passage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PassageKey {
    pub document: i64,
    pub section: i64,
    pub item: i64,
}

/// Inclusive item range inside one document section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PassageRange {
    pub document: i64,
    pub section: i64,
    pub start: i64,
    pub end: i64,
}

impl PassageRange {
    pub fn new(document: i64, section: i64, start: i64, end: i64) -> Self {
        Self {
            document,
            section,
            start,
            end,
        }
    }
}

/// Heading attached to a document position (a story).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub document: i64,
    pub section: Option<i64>,
    pub item: Option<i64>,
    pub order_if_several: i64,
    pub text: String,
}

/// Document-level introductory text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preface {
    pub document: i64,
    pub text: String,
}

/// One row of the `info` key-value table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataEntry {
    pub name: String,
    pub value: String,
}

/// Aggregate counts for one dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DatasetStats {
    pub documents: u64,
    pub passages: u64,
    pub annotations: u64,
    pub prefaces: u64,
    pub schema_version: u32,
}

/// Structured health result; never produced through an error path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub details: String,
}

impl HealthReport {
    pub fn healthy(details: impl Into<String>) -> Self {
        Self {
            healthy: true,
            details: details.into(),
        }
    }

    pub fn unhealthy(details: impl Into<String>) -> Self {
        Self {
            healthy: false,
            details: details.into(),
        }
    }
}
