//! Questline - quest automation engine
//!
//! Watches the firehose and Jetstream event streams, evaluates configured
//! quests against incoming replies and records, and runs each quest's
//! commands against the domain store and the network.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): quest, event and user models plus port traits
//! - **Service Layer** (`services`): triggers, evaluation, execution, consumers
//! - **Adapters** (`adapters`): SQLite, stream protocols, network clients
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{Command, Condition, ConditionOperator, Config, Quest, TriggerConfig};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{Engine, ProcessOutcome, ProcessRequest, QuestDispatcher, StreamKind};
