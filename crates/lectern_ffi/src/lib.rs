//! Flutter-facing bindings for lectern core.

pub mod api;
