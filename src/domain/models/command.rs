//! Command kinds and their name table.

use std::fmt;
use std::str::FromStr;

use crate::domain::errors::DomainError;

/// Every side effect the executor knows how to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Register,
    DeclareName,
    GrantName,
    RecordTimelineEntry,
    GrantCollectible,
    LikeTargetPost,
    ReplyWith,
    LinkKindred,
    DisableSelf,
    DisableConditions,
}

/// Whether a command runs once per matching reply or once per batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    PerSubject,
    Quest,
}

const COMMAND_NAMES: &[(&str, CommandKind)] = &[
    ("register", CommandKind::Register),
    ("register-if-absent", CommandKind::Register),
    ("register_user", CommandKind::Register),
    ("declare-name", CommandKind::DeclareName),
    ("assign-display-name", CommandKind::DeclareName),
    ("name_dreamer", CommandKind::DeclareName),
    ("grant-name", CommandKind::GrantName),
    ("grant-alternate-name", CommandKind::GrantName),
    ("add_name", CommandKind::GrantName),
    ("record-timeline-entry", CommandKind::RecordTimelineEntry),
    ("add_canon", CommandKind::RecordTimelineEntry),
    ("grant-collectible", CommandKind::GrantCollectible),
    ("award_souvenir", CommandKind::GrantCollectible),
    ("like-target-post", CommandKind::LikeTargetPost),
    ("like_post", CommandKind::LikeTargetPost),
    ("reply-with", CommandKind::ReplyWith),
    ("reply_post", CommandKind::ReplyWith),
    ("link-kindred", CommandKind::LinkKindred),
    ("add_kindred", CommandKind::LinkKindred),
    ("disable-self", CommandKind::DisableSelf),
    ("disable_quest", CommandKind::DisableSelf),
    ("disable-conditions", CommandKind::DisableConditions),
    ("disable_condition", CommandKind::DisableConditions),
];

impl CommandKind {
    pub fn resolve(name: &str) -> Option<Self> {
        let name = name.trim();
        COMMAND_NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, kind)| *kind)
    }

    pub fn canonical_name(&self) -> &'static str {
        COMMAND_NAMES
            .iter()
            .find(|(_, kind)| kind == self)
            .map_or("unknown", |(n, _)| n)
    }

    pub const fn scope(&self) -> CommandScope {
        match self {
            Self::DisableSelf | Self::DisableConditions => CommandScope::Quest,
            _ => CommandScope::PerSubject,
        }
    }

    /// Secondary effects never fail a batch.
    pub const fn is_best_effort(&self) -> bool {
        matches!(self, Self::LikeTargetPost | Self::ReplyWith)
    }

    pub const fn min_args(&self) -> usize {
        match self {
            Self::RecordTimelineEntry => 2,
            Self::GrantCollectible | Self::ReplyWith | Self::DisableConditions => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

impl FromStr for CommandKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::resolve(s).ok_or_else(|| DomainError::UnknownCommand(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_legacy_names() {
        assert_eq!(CommandKind::resolve("add_canon"), Some(CommandKind::RecordTimelineEntry));
        assert_eq!(CommandKind::resolve("award_souvenir"), Some(CommandKind::GrantCollectible));
        assert_eq!(CommandKind::resolve("launch_rocket"), None);
    }

    #[test]
    fn test_scopes() {
        assert_eq!(CommandKind::DisableSelf.scope(), CommandScope::Quest);
        assert_eq!(CommandKind::GrantCollectible.scope(), CommandScope::PerSubject);
        assert!(CommandKind::LikeTargetPost.is_best_effort());
        assert!(!CommandKind::Register.is_best_effort());
    }
}
