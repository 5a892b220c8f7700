//! Command execution.

mod executor;
pub mod rename;

pub use executor::CommandExecutor;
pub use rename::{decide, RenameDecision, RenameFacts, DECLARED_NAME_KEY};

use serde::Serialize;

/// What a command batch did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub success: bool,
    /// Canonical names of commands that ran without error.
    pub executed: Vec<String>,
    pub errors: Vec<String>,
    /// Failures of best-effort commands.
    pub warnings: Vec<String>,
}

impl ExecutionReport {
    /// A batch refused before any command ran.
    pub fn rejected(reason: String) -> Self {
        Self {
            success: false,
            errors: vec![reason],
            ..Self::default()
        }
    }
}
