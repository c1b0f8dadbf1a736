//! Passage search entry points.
//!
//! # Responsibility
//! - Expose substring search over passage text.
//! - Keep predicate building and result shaping inside core.
//!
//! # Invariants
//! - Matching is delegated to SQLite; there is no full-text index.

pub mod substring;
