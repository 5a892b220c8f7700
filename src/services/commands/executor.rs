use std::sync::Arc;

use super::rename::{decide, RenameDecision, RenameFacts, DECLARED_NAME_KEY};
use super::ExecutionReport;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    name_from_handle, normalize_name, Command, CommandKind, CommandScope, EvaluationContext, NameClaim, NewUser,
    Quest, ReplyEvent, ReplyRef, StrongRef, TimelineEntry, User,
};
use crate::domain::ports::{DomainStore, NetworkClient};
use crate::services::identities::IdentitySet;
use crate::services::overlay::QuestOverlay;
use crate::services::quest_registry::{validate_command, QuestRegistry};

const ARRIVAL_KEY: &str = "arrival";

/// Runs quest commands against the domain store, the network and the registry.
///
/// Every effect is an insert-if-absent or a conditional update, so running
/// the same batch twice for the same reply leaves the same state.
pub struct CommandExecutor {
    store: Arc<dyn DomainStore>,
    network: Arc<dyn NetworkClient>,
    registry: Arc<QuestRegistry>,
    identities: Arc<IdentitySet>,
    overlay: Arc<QuestOverlay>,
}

impl CommandExecutor {
    pub fn new(
        store: Arc<dyn DomainStore>,
        network: Arc<dyn NetworkClient>,
        registry: Arc<QuestRegistry>,
        identities: Arc<IdentitySet>,
    ) -> Self {
        Self {
            store,
            network,
            registry,
            identities,
            overlay: Arc::new(QuestOverlay::new()),
        }
    }

    /// Record quest disables in `overlay` as well as the registry.
    #[must_use]
    pub fn with_overlay(mut self, overlay: Arc<QuestOverlay>) -> Self {
        self.overlay = overlay;
        self
    }

    /// Execute `commands` for each matching reply.
    ///
    /// All names are resolved before anything runs; one unknown name fails
    /// the batch with no effects. Later commands still run after an earlier
    /// one fails.
    pub async fn execute(
        &self,
        commands: &[Command],
        matching: &[ReplyEvent],
        ctx: &EvaluationContext,
        quest: &Quest,
    ) -> ExecutionReport {
        let resolved = match commands
            .iter()
            .map(|c| validate_command(c).map(|kind| (kind, c)))
            .collect::<DomainResult<Vec<_>>>()
        {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::error!(quest = %quest.title, error = %e, "command batch rejected");
                return ExecutionReport::rejected(e.to_string());
            }
        };

        let mut report = ExecutionReport::default();
        for (kind, command) in resolved {
            let outcomes = match kind.scope() {
                CommandScope::Quest => vec![self.run_quest_command(kind, command, quest).await],
                CommandScope::PerSubject => {
                    let mut outcomes = Vec::with_capacity(matching.len());
                    for reply in matching {
                        outcomes.push(self.run_for_reply(kind, command, reply, ctx, &mut report.warnings).await);
                    }
                    outcomes
                }
            };
            if outcomes.is_empty() {
                continue;
            }

            let mut ok = true;
            for outcome in outcomes {
                if let Err(e) = outcome {
                    ok = false;
                    let message = format!("{kind}: {e}");
                    if kind.is_best_effort() {
                        tracing::warn!(quest = %quest.title, command = %kind, error = %e, "best-effort command failed");
                        report.warnings.push(message);
                    } else {
                        tracing::error!(quest = %quest.title, command = %kind, error = %e, "command failed");
                        report.errors.push(message);
                    }
                }
            }
            if ok {
                report.executed.push(kind.canonical_name().to_string());
            }
        }
        report.success = report.errors.is_empty();
        report
    }

    async fn run_quest_command(&self, kind: CommandKind, command: &Command, quest: &Quest) -> DomainResult<()> {
        match kind {
            CommandKind::DisableSelf => {
                self.registry.disable(&quest.title).await?;
                self.overlay.disable_quest(&quest.title);
                Ok(())
            }
            CommandKind::DisableConditions => {
                let indices = command
                    .args
                    .iter()
                    .map(|a| {
                        a.trim().parse::<usize>().map_err(|_| DomainError::InvalidArguments {
                            name: command.name.clone(),
                            reason: format!("'{a}' is not a condition index"),
                        })
                    })
                    .collect::<DomainResult<Vec<_>>>()?;
                self.registry.disable_conditions(&quest.title, &indices).await?;
                self.overlay.disable_conditions(&quest.title, &indices);
                Ok(())
            }
            other => Err(DomainError::ExecutionFailed(format!("{other} is not a quest-scope command"))),
        }
    }

    async fn run_for_reply(
        &self,
        kind: CommandKind,
        command: &Command,
        reply: &ReplyEvent,
        ctx: &EvaluationContext,
        warnings: &mut Vec<String>,
    ) -> DomainResult<()> {
        let did = reply.author.did.as_str();
        match kind {
            CommandKind::Register => self.register(reply, warnings).await.map(|_| ()),
            CommandKind::DeclareName => self.declare_name(command, reply).await,
            CommandKind::GrantName => self.grant_name(command, reply).await,
            CommandKind::RecordTimelineEntry => {
                let entry_type = command.args.get(2).map_or("event", |t| t.trim());
                let entry = TimelineEntry::new(did, command.args[0].trim(), entry_type, command.args[1].clone())
                    .with_uri(Some(reply.uri.clone()));
                if !self.store.insert_timeline_if_absent(&entry).await? {
                    tracing::debug!(did, key = %entry.key, "timeline entry already present");
                }
                Ok(())
            }
            CommandKind::GrantCollectible => {
                self.store.grant_collectible_if_absent(did, command.args[0].trim()).await?;
                Ok(())
            }
            CommandKind::LikeTargetPost => self.network.create_like(&reply.uri, reply.cid.as_deref()).await,
            CommandKind::ReplyWith => {
                let cid = reply
                    .cid
                    .clone()
                    .ok_or_else(|| DomainError::ExecutionFailed(format!("no cid for {}", reply.uri)))?;
                let parent = StrongRef {
                    uri: reply.uri.clone(),
                    cid,
                };
                let reply_ref = ReplyRef {
                    root: parent.clone(),
                    parent,
                };
                self.network.create_post(&command.args.join(":"), Some(&reply_ref)).await?;
                Ok(())
            }
            CommandKind::LinkKindred => {
                let other = command
                    .args
                    .first()
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty())
                    .or_else(|| ctx.subject_author.clone())
                    .ok_or_else(|| DomainError::ExecutionFailed("no kindred target for reply".to_string()))?;
                self.store.link_kindred_if_absent(did, &other).await?;
                Ok(())
            }
            CommandKind::DisableSelf | CommandKind::DisableConditions => Err(DomainError::ExecutionFailed(format!(
                "{kind} is not a per-reply command"
            ))),
        }
    }

    /// Register the reply author if absent and record their arrival. A failed
    /// profile lookup falls back to the reply's handle and adds a warning.
    async fn register(&self, reply: &ReplyEvent, warnings: &mut Vec<String>) -> DomainResult<User> {
        let did = reply.author.did.as_str();
        if let Some(user) = self.store.get_user(did).await? {
            self.record_arrival(&user).await?;
            return Ok(user);
        }

        let profile = match self.network.resolve_profile(did).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(did, error = %e, "profile lookup failed, registering from reply");
                warnings.push(format!("{}: profile lookup for {did} failed: {e}", CommandKind::Register));
                None
            }
        };
        let handle = profile
            .as_ref()
            .map_or_else(|| reply.author.handle.clone(), |p| p.handle.clone());
        let base = profile
            .as_ref()
            .and_then(|p| p.display_name.as_deref())
            .and_then(normalize_name)
            .unwrap_or_else(|| name_from_handle(&handle));

        self.insert_user(did, &handle, &base).await
    }

    /// Insert with `name`, retrying once with a DID-derived suffix when taken.
    async fn insert_user(&self, did: &str, handle: &str, name: &str) -> DomainResult<User> {
        let mut candidate = name.to_string();
        if self.taken_by_other(did, &candidate).await? {
            candidate = suffixed(name, did);
        }
        let new_user = NewUser {
            did: did.to_string(),
            handle: handle.to_string(),
            name: candidate.clone(),
            pds: None,
        };
        match self.store.insert_user_if_absent(&new_user).await {
            Ok(_) => {}
            Err(DomainError::NameTaken { .. }) if candidate == name => {
                self.store
                    .insert_user_if_absent(&NewUser {
                        name: suffixed(name, did),
                        ..new_user
                    })
                    .await?;
            }
            Err(e) => return Err(e),
        }

        let user = self
            .store
            .get_user(did)
            .await?
            .ok_or_else(|| DomainError::UserNotFound(did.to_string()))?;
        self.identities.insert(did);
        self.record_arrival(&user).await?;
        tracing::info!(did, name = %user.name, "user registered");
        Ok(user)
    }

    async fn record_arrival(&self, user: &User) -> DomainResult<()> {
        let entry = TimelineEntry::new(&user.did, ARRIVAL_KEY, "event", format!("{} arrived", user.name));
        self.store.insert_timeline_if_absent(&entry).await?;
        Ok(())
    }

    async fn taken_by_other(&self, did: &str, name: &str) -> DomainResult<bool> {
        Ok(self.store.name_owner(name).await?.is_some_and(|owner| owner != did))
    }

    async fn declare_name(&self, command: &Command, reply: &ReplyEvent) -> DomainResult<()> {
        let did = reply.author.did.as_str();
        let proposed = proposed_name(command, reply)?;
        let user = self.store.get_user(did).await?;

        let facts = RenameFacts {
            user_exists: user.is_some(),
            has_milestone: self.store.has_timeline_key(did, DECLARED_NAME_KEY).await?,
            name_taken: self.taken_by_other(did, &proposed).await?,
            name_in_alternates: user.as_ref().is_some_and(|u| u.alternates.contains(&proposed)),
            name_is_current: user.as_ref().is_some_and(|u| u.name == proposed),
        };
        let decision = decide(facts);
        tracing::debug!(did, name = %proposed, ?decision, "declare-name decision");

        match (decision, user) {
            (RenameDecision::RegisterWithProposed, _) => {
                self.insert_user(did, &reply.author.handle, &proposed).await?;
            }
            (RenameDecision::RegisterWithHandleName, _) => {
                self.insert_user(did, &reply.author.handle, &name_from_handle(&reply.author.handle))
                    .await?;
            }
            (RenameDecision::PromoteAlternate, Some(user)) => {
                self.store.set_primary_name(did, &user.name, &proposed).await?;
            }
            (RenameDecision::AdoptNew, Some(user)) => match self.store.claim_name(did, &proposed).await? {
                NameClaim::Claimed | NameClaim::AlreadyOwned => {
                    self.store.set_primary_name(did, &user.name, &proposed).await?;
                }
                NameClaim::TakenBy(owner) => {
                    tracing::info!(did, name = %proposed, owner = %owner, "name claimed concurrently, keeping current");
                }
            },
            _ => {}
        }

        let milestone = TimelineEntry::new(did, DECLARED_NAME_KEY, "milestone", format!("declared the name {proposed}"))
            .with_uri(Some(reply.uri.clone()));
        self.store.insert_timeline_if_absent(&milestone).await?;
        Ok(())
    }

    /// Claim a name and make it primary; the previous primary stays as an alternate.
    async fn grant_name(&self, command: &Command, reply: &ReplyEvent) -> DomainResult<()> {
        let did = reply.author.did.as_str();
        let name = proposed_name(command, reply)?;
        let user = self
            .store
            .get_user(did)
            .await?
            .ok_or_else(|| DomainError::UserNotFound(did.to_string()))?;

        if let NameClaim::TakenBy(owner) = self.store.claim_name(did, &name).await? {
            return Err(DomainError::NameTaken { name, owner });
        }
        if user.name != name && !self.store.set_primary_name(did, &user.name, &name).await? {
            tracing::warn!(did, name = %name, "primary name changed concurrently");
        }
        Ok(())
    }
}

fn proposed_name(command: &Command, reply: &ReplyEvent) -> DomainResult<String> {
    command
        .args
        .first()
        .and_then(|a| normalize_name(a))
        .or_else(|| normalize_name(&reply.record.text))
        .ok_or_else(|| DomainError::InvalidArguments {
            name: command.name.clone(),
            reason: "no name in arguments or reply text".to_string(),
        })
}

fn suffixed(name: &str, did: &str) -> String {
    let tail: String = did
        .chars()
        .rev()
        .filter(char::is_ascii_alphanumeric)
        .take(6)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("{name}{}", tail.to_ascii_lowercase())
}
