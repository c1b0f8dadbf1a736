//! Plain data records served to UI callers.
//!
//! # Responsibility
//! - Define the logical shapes of one translation dataset.
//! - Keep records free of connection handles so they can cross the FFI.
//!
//! # Invariants
//! - A passage is addressed by `(document, section, item)`.
//! - Document ordinals are unique within each catalog.

pub mod passage;
