//! Domain layer for the quest engine
//!
//! Quest definitions, normalized stream events, and the port traits the
//! engine depends on.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
