//! Condition kinds and their name table.

use std::fmt;
use std::str::FromStr;

use crate::domain::errors::DomainError;

/// Every condition the evaluator knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionKind {
    AnyReply,
    HasMilestone,
    HasntMilestone,
    CountMilestone,
    IsRegistered,
    NotRegistered,
    HasCollectible,
    HasntCollectible,
    ValueInList,
    TextContains,
}

/// Name table, canonical name first. Older quest rows use the underscore aliases.
const CONDITION_NAMES: &[(&str, ConditionKind)] = &[
    ("any-reply", ConditionKind::AnyReply),
    ("always", ConditionKind::AnyReply),
    ("any_reply", ConditionKind::AnyReply),
    ("has-milestone", ConditionKind::HasMilestone),
    ("has_canon", ConditionKind::HasMilestone),
    ("hasnt-milestone", ConditionKind::HasntMilestone),
    ("hasnt_canon", ConditionKind::HasntMilestone),
    ("count-milestone", ConditionKind::CountMilestone),
    ("count_canon", ConditionKind::CountMilestone),
    ("is-registered", ConditionKind::IsRegistered),
    ("is_dreamer", ConditionKind::IsRegistered),
    ("not-registered", ConditionKind::NotRegistered),
    ("not_dreamer", ConditionKind::NotRegistered),
    ("has-collectible", ConditionKind::HasCollectible),
    ("has_souvenir", ConditionKind::HasCollectible),
    ("hasnt-collectible", ConditionKind::HasntCollectible),
    ("hasnt_souvenir", ConditionKind::HasntCollectible),
    ("value-in-list", ConditionKind::ValueInList),
    ("user_value_in", ConditionKind::ValueInList),
    ("text-contains", ConditionKind::TextContains),
    ("contains_text", ConditionKind::TextContains),
];

impl ConditionKind {
    /// Resolve a stored name, if it is known.
    pub fn resolve(name: &str) -> Option<Self> {
        let name = name.trim();
        CONDITION_NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, kind)| *kind)
    }

    pub fn canonical_name(&self) -> &'static str {
        CONDITION_NAMES
            .iter()
            .find(|(_, kind)| kind == self)
            .map_or("unknown", |(n, _)| n)
    }

    /// Minimum number of positional arguments.
    pub const fn min_args(&self) -> usize {
        match self {
            Self::AnyReply | Self::IsRegistered | Self::NotRegistered => 0,
            Self::HasMilestone
            | Self::HasntMilestone
            | Self::HasCollectible
            | Self::HasntCollectible
            | Self::TextContains => 1,
            Self::ValueInList => 2,
            Self::CountMilestone => 3,
        }
    }

    /// Whether the predicate ignores the individual reply.
    pub const fn is_global(&self) -> bool {
        matches!(self, Self::AnyReply | Self::CountMilestone)
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

impl FromStr for ConditionKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::resolve(s).ok_or_else(|| DomainError::UnknownCondition(s.to_string()))
    }
}

/// Comparison used by count conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
}

impl Comparison {
    pub const fn compare(&self, lhs: u64, rhs: u64) -> bool {
        match self {
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Ge => lhs >= rhs,
            Self::Gt => lhs > rhs,
        }
    }
}

impl FromStr for Comparison {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "<" | "lt" => Ok(Self::Lt),
            "<=" | "le" => Ok(Self::Le),
            "==" | "=" | "eq" => Ok(Self::Eq),
            "!=" | "ne" => Ok(Self::Ne),
            ">=" | "ge" => Ok(Self::Ge),
            ">" | "gt" => Ok(Self::Gt),
            other => Err(DomainError::InvalidArguments {
                name: "count-milestone".to_string(),
                reason: format!("unknown comparison '{other}'"),
            }),
        }
    }
}
