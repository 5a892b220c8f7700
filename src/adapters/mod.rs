//! Infrastructure adapters for external systems.

pub mod network;
pub mod sqlite;
pub mod stream;
