//! Quest definitions: trigger, conditions and commands.
//!
//! Quests are stored as JSON and may carry the legacy colon-encoded form of
//! conditions and commands (`"add_canon:greeted:said hello:event"`). That form
//! is accepted only while deserializing; everything downstream sees the
//! structured [`Condition`] and [`Command`] values.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::DomainError;

/// Which event source activates a quest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerType {
    ReplyToPost,
    NetworkPhrase,
    PartnerCompletion,
    Poll,
}

impl TriggerType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ReplyToPost => "reply-to-post",
            Self::NetworkPhrase => "network-phrase",
            Self::PartnerCompletion => "partner-completion",
            Self::Poll => "poll",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "reply-to-post" | "bsky-reply" | "reply" => Ok(Self::ReplyToPost),
            "network-phrase" | "phrase" | "hashtag" => Ok(Self::NetworkPhrase),
            "partner-completion" | "partner" => Ok(Self::PartnerCompletion),
            "poll" => Ok(Self::Poll),
            other => Err(DomainError::ValidationFailed(format!(
                "unknown trigger type: {other}"
            ))),
        }
    }
}

/// A phrase watched by a network-phrase trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredPhrase {
    pub phrase: String,
    #[serde(default)]
    pub case_sensitive: bool,
}

const fn default_true() -> bool {
    true
}

const fn default_poll_interval() -> u64 {
    300
}

const fn default_poll_depth() -> u32 {
    6
}

/// Per-trigger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TriggerConfig {
    ReplyToPost {
        post_uri: String,
        /// Only replies from users already in the tracked identity set activate.
        #[serde(default = "default_true")]
        known_authors_only: bool,
    },
    NetworkPhrase {
        phrases: Vec<MonitoredPhrase>,
    },
    PartnerCompletion {
        collection: String,
        #[serde(default)]
        resources: Vec<String>,
    },
    Poll {
        post_uri: String,
        #[serde(default = "default_poll_interval")]
        interval_secs: u64,
        #[serde(default = "default_poll_depth")]
        max_depth: u32,
    },
}

impl TriggerConfig {
    pub const fn trigger_type(&self) -> TriggerType {
        match self {
            Self::ReplyToPost { .. } => TriggerType::ReplyToPost,
            Self::NetworkPhrase { .. } => TriggerType::NetworkPhrase,
            Self::PartnerCompletion { .. } => TriggerType::PartnerCompletion,
            Self::Poll { .. } => TriggerType::Poll,
        }
    }

    /// The quest post this trigger watches, if any.
    pub fn post_uri(&self) -> Option<&str> {
        match self {
            Self::ReplyToPost { post_uri, .. } | Self::Poll { post_uri, .. } => Some(post_uri),
            _ => None,
        }
    }
}

/// Boolean combinator a condition participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConditionOperator {
    #[default]
    And,
    Or,
    Not,
    Xor,
}

impl FromStr for ConditionOperator {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "AND" => Ok(Self::And),
            "OR" => Ok(Self::Or),
            "NOT" => Ok(Self::Not),
            "XOR" => Ok(Self::Xor),
            other => Err(DomainError::ValidationFailed(format!(
                "unknown condition operator: {other}"
            ))),
        }
    }
}

/// A named command with positional arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawEntry")]
pub struct Command {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Command {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Parse the legacy `name:arg:arg` encoding.
    pub fn parse_encoded(encoded: &str) -> Result<Self, DomainError> {
        let (name, args) = split_encoded(encoded)?;
        Ok(Self { name, args })
    }
}

/// A predicate evaluated against an evaluation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCondition")]
pub struct Condition {
    pub name: String,
    pub args: Vec<String>,
    /// Falls back to the quest's `condition_operator` when absent.
    pub operator: Option<ConditionOperator>,
    pub once_only: bool,
    pub disabled: bool,
    /// Prepended to the quest's commands when this condition matched.
    pub custom_commands: Vec<Command>,
}

impl Condition {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
            operator: None,
            once_only: false,
            disabled: false,
            custom_commands: Vec::new(),
        }
    }

    pub const fn with_operator(mut self, operator: ConditionOperator) -> Self {
        self.operator = Some(operator);
        self
    }

    pub const fn once(mut self) -> Self {
        self.once_only = true;
        self
    }

    pub fn with_custom_commands(mut self, commands: Vec<Command>) -> Self {
        self.custom_commands = commands;
        self
    }

    pub fn effective_operator(&self, default: ConditionOperator) -> ConditionOperator {
        self.operator.unwrap_or(default)
    }
}

/// Stored form of a command: structured object or legacy encoded string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Encoded(String),
    Structured {
        name: String,
        #[serde(default)]
        args: Vec<serde_json::Value>,
    },
}

impl TryFrom<RawEntry> for Command {
    type Error = DomainError;

    fn try_from(raw: RawEntry) -> Result<Self, Self::Error> {
        match raw {
            RawEntry::Encoded(s) => Self::parse_encoded(&s),
            RawEntry::Structured { name, args } => Ok(Self {
                name,
                args: args.into_iter().map(arg_to_string).collect(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCondition {
    Encoded(String),
    Structured {
        #[serde(alias = "condition", alias = "type")]
        name: String,
        #[serde(default)]
        args: Vec<serde_json::Value>,
        #[serde(default)]
        operator: Option<String>,
        #[serde(default)]
        once_only: bool,
        #[serde(default)]
        disabled: bool,
        #[serde(default, alias = "commands")]
        custom_commands: Vec<Command>,
    },
}

impl TryFrom<RawCondition> for Condition {
    type Error = DomainError;

    fn try_from(raw: RawCondition) -> Result<Self, Self::Error> {
        match raw {
            RawCondition::Encoded(s) => {
                let (name, args) = split_encoded(&s)?;
                Ok(Self::new(name, args))
            }
            RawCondition::Structured {
                name,
                args,
                operator,
                once_only,
                disabled,
                custom_commands,
            } => Ok(Self {
                name,
                args: args.into_iter().map(arg_to_string).collect(),
                operator: operator
                    .filter(|op| !op.trim().is_empty())
                    .map(|op| op.parse())
                    .transpose()?,
                once_only,
                disabled,
                custom_commands,
            }),
        }
    }
}

fn split_encoded(encoded: &str) -> Result<(String, Vec<String>), DomainError> {
    let mut parts = encoded.split(':');
    let name = parts.next().unwrap_or_default().trim();
    if name.is_empty() {
        return Err(DomainError::ValidationFailed(format!(
            "empty name in encoded entry '{encoded}'"
        )));
    }
    Ok((name.to_string(), parts.map(str::to_string).collect()))
}

fn arg_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

/// A named automation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quest {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub trigger: TriggerConfig,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub condition_operator: ConditionOperator,
    #[serde(default)]
    pub commands: Vec<Command>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Quest {
    pub fn new(title: impl Into<String>, trigger: TriggerConfig) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: String::new(),
            trigger,
            conditions: Vec::new(),
            condition_operator: ConditionOperator::And,
            commands: Vec::new(),
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    pub const fn with_operator(mut self, operator: ConditionOperator) -> Self {
        self.condition_operator = operator;
        self
    }

    pub const fn trigger_type(&self) -> TriggerType {
        self.trigger.trigger_type()
    }
}

/// Partial update applied through the quest registry.
#[derive(Debug, Clone, Default)]
pub struct QuestUpdate {
    pub description: Option<String>,
    pub trigger: Option<TriggerConfig>,
    pub conditions: Option<Vec<Condition>>,
    pub condition_operator: Option<ConditionOperator>,
    pub commands: Option<Vec<Command>>,
    pub enabled: Option<bool>,
}

impl QuestUpdate {
    pub fn apply(self, quest: &mut Quest) {
        if let Some(description) = self.description {
            quest.description = description;
        }
        if let Some(trigger) = self.trigger {
            quest.trigger = trigger;
        }
        if let Some(conditions) = self.conditions {
            quest.conditions = conditions;
        }
        if let Some(op) = self.condition_operator {
            quest.condition_operator = op;
        }
        if let Some(commands) = self.commands {
            quest.commands = commands;
        }
        if let Some(enabled) = self.enabled {
            quest.enabled = enabled;
        }
        quest.updated_at = Utc::now();
    }
}
