//! Read-side data access over one dataset connection.
//!
//! # Responsibility
//! - Define use-case oriented query contracts.
//! - Keep SQL details and row decoding inside core persistence boundary.
//!
//! # Invariants
//! - Repository calls are synchronous and borrow the connection; the
//!   lifecycle layer decides when a connection may be used.
//! - Multi-row reads are ordered by natural key ascending.

pub mod passage_repo;
