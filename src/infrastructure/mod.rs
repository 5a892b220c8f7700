//! Infrastructure layer module
//!
//! Process-level concerns shared by the binary and the services:
//! - Configuration loading and validation
//! - Logging setup

pub mod config;
pub mod logging;
