//! Quest registry: validated CRUD over quest definitions.
//!
//! Every name a quest refers to is resolved against the condition and command
//! tables on the way in, so the engine never discovers an unknown name while
//! consuming a stream.

use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Command, CommandKind, Comparison, Condition, ConditionKind, Quest, QuestUpdate, TriggerConfig,
};
use crate::domain::ports::QuestRepository;

pub struct QuestRegistry {
    repo: Arc<dyn QuestRepository>,
}

/// How `import` treats an existing title.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    CreateOnly,
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportResult {
    Created,
    Replaced,
}

impl QuestRegistry {
    pub fn new(repo: Arc<dyn QuestRepository>) -> Self {
        Self { repo }
    }

    pub async fn import(&self, quest: Quest, mode: ImportMode) -> DomainResult<ImportResult> {
        validate_quest(&quest)?;

        if self.repo.get(&quest.title).await?.is_some() {
            if mode == ImportMode::CreateOnly {
                return Err(DomainError::QuestExists(quest.title));
            }
            let title = quest.title.clone();
            self.repo
                .update(
                    &title,
                    QuestUpdate {
                        description: Some(quest.description),
                        trigger: Some(quest.trigger),
                        conditions: Some(quest.conditions),
                        condition_operator: Some(quest.condition_operator),
                        commands: Some(quest.commands),
                        enabled: Some(quest.enabled),
                    },
                )
                .await?;
            tracing::info!(quest = %title, "quest replaced");
            return Ok(ImportResult::Replaced);
        }

        self.repo.create(&quest).await?;
        tracing::info!(quest = %quest.title, trigger = %quest.trigger_type(), "quest created");
        Ok(ImportResult::Created)
    }

    pub async fn get(&self, title: &str) -> DomainResult<Quest> {
        self.repo
            .get(title)
            .await?
            .ok_or_else(|| DomainError::QuestNotFound(title.to_string()))
    }

    pub async fn list(&self) -> DomainResult<Vec<Quest>> {
        self.repo.list().await
    }

    pub async fn list_enabled(&self) -> DomainResult<Vec<Quest>> {
        self.repo.list_enabled().await
    }

    pub async fn update(&self, title: &str, update: QuestUpdate) -> DomainResult<Quest> {
        let mut preview = self.get(title).await?;
        update.clone().apply(&mut preview);
        validate_quest(&preview)?;
        self.repo.update(title, update).await
    }

    pub async fn enable(&self, title: &str) -> DomainResult<Quest> {
        self.repo
            .update(
                title,
                QuestUpdate {
                    enabled: Some(true),
                    ..Default::default()
                },
            )
            .await
    }

    pub async fn disable(&self, title: &str) -> DomainResult<()> {
        self.repo.disable(title).await?;
        tracing::info!(quest = %title, "quest disabled");
        Ok(())
    }

    pub async fn disable_conditions(&self, title: &str, indices: &[usize]) -> DomainResult<()> {
        self.repo.disable_conditions(title, indices).await?;
        tracing::info!(quest = %title, ?indices, "conditions disabled");
        Ok(())
    }

    pub async fn delete(&self, title: &str) -> DomainResult<()> {
        self.repo.delete(title).await
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> DomainError {
    DomainError::InvalidArguments {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Reject quests whose trigger, conditions or commands cannot run.
pub fn validate_quest(quest: &Quest) -> DomainResult<()> {
    if quest.title.trim().is_empty() {
        return Err(DomainError::ValidationFailed("quest title is empty".to_string()));
    }
    validate_trigger(&quest.trigger)?;
    for condition in &quest.conditions {
        validate_condition(condition)?;
    }
    for command in &quest.commands {
        validate_command(command)?;
    }
    Ok(())
}

fn validate_trigger(trigger: &TriggerConfig) -> DomainResult<()> {
    let fail = |reason: &str| Err(DomainError::ValidationFailed(format!("{}: {reason}", trigger.trigger_type())));
    match trigger {
        TriggerConfig::ReplyToPost { post_uri, .. } | TriggerConfig::Poll { post_uri, .. }
            if !post_uri.starts_with("at://") =>
        {
            fail("post_uri must be an at:// uri")
        }
        TriggerConfig::Poll { interval_secs: 0, .. } => fail("interval_secs must be positive"),
        TriggerConfig::NetworkPhrase { phrases } if phrases.iter().all(|p| p.phrase.trim().is_empty()) => {
            fail("at least one phrase is required")
        }
        TriggerConfig::PartnerCompletion { collection, .. } if collection.trim().is_empty() => {
            fail("collection is required")
        }
        _ => Ok(()),
    }
}

pub fn validate_condition(condition: &Condition) -> DomainResult<ConditionKind> {
    let kind: ConditionKind = condition.name.parse()?;
    if condition.args.len() < kind.min_args() {
        return Err(invalid(
            &condition.name,
            format!("expected at least {} argument(s), got {}", kind.min_args(), condition.args.len()),
        ));
    }
    if kind == ConditionKind::CountMilestone {
        condition.args[1].parse::<Comparison>()?;
        condition.args[2]
            .trim()
            .parse::<u64>()
            .map_err(|_| invalid(&condition.name, format!("threshold '{}' is not a number", condition.args[2])))?;
    }
    for command in &condition.custom_commands {
        validate_command(command)?;
    }
    Ok(kind)
}

pub fn validate_command(command: &Command) -> DomainResult<CommandKind> {
    let kind: CommandKind = command.name.parse()?;
    if command.args.len() < kind.min_args() {
        return Err(invalid(
            &command.name,
            format!("expected at least {} argument(s), got {}", kind.min_args(), command.args.len()),
        ));
    }
    if kind == CommandKind::DisableConditions {
        for arg in &command.args {
            arg.trim()
                .parse::<usize>()
                .map_err(|_| invalid(&command.name, format!("'{arg}' is not a condition index")))?;
        }
    }
    Ok(kind)
}
