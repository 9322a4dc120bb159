//! Infrastructure adapters for external systems.

pub mod manager;
pub mod sqlite;
