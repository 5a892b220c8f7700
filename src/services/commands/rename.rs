//! The name-declaration decision table.

/// Milestone recorded by every declare-name outcome.
pub const DECLARED_NAME_KEY: &str = "declared-name";

/// What is known about the user and the proposed name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenameFacts {
    pub user_exists: bool,
    pub has_milestone: bool,
    /// Claimed by a different user.
    pub name_taken: bool,
    pub name_in_alternates: bool,
    pub name_is_current: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameDecision {
    RegisterWithProposed,
    RegisterWithHandleName,
    /// The user already declared a name once.
    Deny,
    KeepCurrent,
    PromoteAlternate,
    /// Switch to the new name; the previous primary becomes an alternate.
    AdoptNew,
}

pub const fn decide(facts: RenameFacts) -> RenameDecision {
    match facts {
        RenameFacts {
            user_exists: false,
            name_taken: false,
            ..
        } => RenameDecision::RegisterWithProposed,
        RenameFacts { user_exists: false, .. } => RenameDecision::RegisterWithHandleName,
        RenameFacts {
            has_milestone: true, ..
        } => RenameDecision::Deny,
        RenameFacts {
            name_is_current: true,
            ..
        }
        | RenameFacts { name_taken: true, .. } => RenameDecision::KeepCurrent,
        RenameFacts {
            name_in_alternates: true,
            ..
        } => RenameDecision::PromoteAlternate,
        _ => RenameDecision::AdoptNew,
    }
}
