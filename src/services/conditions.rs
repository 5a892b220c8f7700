//! Condition evaluation.
//!
//! Every enabled condition of a quest is resolved first, then run against the
//! replies in the evaluation context. Conditions combine by operator group:
//! all AND conditions pass, at least one OR condition passes (when any exist),
//! no NOT condition passes, and exactly one XOR condition passes (when any
//! exist).

use std::sync::Arc;

use serde::Serialize;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    dedup_by_uri, Command, Comparison, Condition, ConditionKind, ConditionOperator, EvaluationContext, Quest,
    ReplyEvent,
};
use crate::domain::ports::DomainStore;
use crate::services::quest_registry::validate_condition;

/// A condition resolved against the name table with parsed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    AnyReply,
    HasMilestone(String),
    HasntMilestone(String),
    CountMilestone { key: String, op: Comparison, threshold: u64 },
    IsRegistered,
    NotRegistered,
    HasCollectible(String),
    HasntCollectible(String),
    ValueInList { field: String, values: Vec<String> },
    TextContains(Vec<String>),
}

impl Predicate {
    fn resolve(condition: &Condition) -> DomainResult<Self> {
        let kind = validate_condition(condition)?;
        let arg = |i: usize| condition.args[i].trim().to_string();
        Ok(match kind {
            ConditionKind::AnyReply => Self::AnyReply,
            ConditionKind::HasMilestone => Self::HasMilestone(arg(0)),
            ConditionKind::HasntMilestone => Self::HasntMilestone(arg(0)),
            ConditionKind::CountMilestone => Self::CountMilestone {
                key: arg(0),
                op: condition.args[1].parse()?,
                // Validated above.
                threshold: condition.args[2].trim().parse().unwrap_or_default(),
            },
            ConditionKind::IsRegistered => Self::IsRegistered,
            ConditionKind::NotRegistered => Self::NotRegistered,
            ConditionKind::HasCollectible => Self::HasCollectible(arg(0)),
            ConditionKind::HasntCollectible => Self::HasntCollectible(arg(0)),
            ConditionKind::ValueInList => Self::ValueInList {
                field: arg(0),
                values: condition.args[1..].iter().map(|v| v.trim().to_string()).collect(),
            },
            ConditionKind::TextContains => Self::TextContains(
                condition
                    .args
                    .iter()
                    .map(|p| p.trim().to_lowercase())
                    .filter(|p| !p.is_empty())
                    .collect(),
            ),
        })
    }

    const fn is_global(&self) -> bool {
        matches!(self, Self::AnyReply | Self::CountMilestone { .. })
    }
}

/// Outcome of one condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionResult {
    pub index: usize,
    pub name: String,
    pub operator: ConditionOperator,
    pub passed: bool,
    pub matched: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of evaluating a quest's conditions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationOutcome {
    pub success: bool,
    pub matching_replies: Vec<ReplyEvent>,
    /// Commands attached to passing conditions, in condition order.
    pub custom_commands: Vec<Command>,
    /// Indices of passing once-only conditions.
    pub once_only_matched: Vec<usize>,
    pub results: Vec<ConditionResult>,
}

pub struct ConditionEvaluator {
    store: Arc<dyn DomainStore>,
}

impl ConditionEvaluator {
    pub fn new(store: Arc<dyn DomainStore>) -> Self {
        Self { store }
    }

    /// Evaluate a quest against a context.
    ///
    /// Unknown names and malformed arguments are returned as errors before any
    /// condition runs. A store failure inside one condition fails that
    /// condition only.
    pub async fn evaluate(&self, quest: &Quest, ctx: &EvaluationContext) -> DomainResult<EvaluationOutcome> {
        let resolved = quest
            .conditions
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.disabled)
            .map(|(i, c)| {
                Predicate::resolve(c).map(|p| (i, c, p, c.effective_operator(quest.condition_operator)))
            })
            .collect::<DomainResult<Vec<_>>>()?;

        if resolved.is_empty() {
            // Every condition disabled means the quest is spent.
            if !quest.conditions.is_empty() {
                tracing::debug!(quest = %quest.title, "all conditions disabled");
                return Ok(EvaluationOutcome::default());
            }
            return Ok(EvaluationOutcome {
                success: true,
                matching_replies: ctx.replies.clone(),
                ..EvaluationOutcome::default()
            });
        }

        let mut outcome = EvaluationOutcome::default();
        let mut all_and = true;
        let mut any_or = false;
        let mut has_or = false;
        let mut any_not = false;
        let mut xor_passed = 0usize;
        let mut has_xor = false;
        let mut has_positive = false;
        let mut matched: Vec<ReplyEvent> = Vec::new();

        for (index, condition, predicate, operator) in resolved {
            let (passed, replies, error) = match self.run(&predicate, ctx).await {
                Ok((passed, replies)) => (passed, replies, None),
                Err(e) => {
                    tracing::warn!(quest = %quest.title, condition = %condition.name, error = %e, "condition failed on store error");
                    (false, Vec::new(), Some(e.to_string()))
                }
            };

            match operator {
                ConditionOperator::And => all_and &= passed,
                ConditionOperator::Or => {
                    has_or = true;
                    any_or |= passed;
                }
                ConditionOperator::Not => any_not |= passed,
                ConditionOperator::Xor => {
                    has_xor = true;
                    xor_passed += usize::from(passed);
                }
            }

            if operator != ConditionOperator::Not {
                has_positive = true;
                if passed {
                    matched.extend(replies.iter().cloned());
                    outcome.custom_commands.extend(condition.custom_commands.iter().cloned());
                    if condition.once_only {
                        outcome.once_only_matched.push(index);
                    }
                }
            }

            outcome.results.push(ConditionResult {
                index,
                name: condition.name.clone(),
                operator,
                passed,
                matched: replies.len(),
                error,
            });
        }

        outcome.success = all_and && (!has_or || any_or) && !any_not && (!has_xor || xor_passed == 1);
        outcome.matching_replies = if has_positive {
            dedup_by_uri(matched)
        } else {
            ctx.replies.clone()
        };

        tracing::debug!(
            quest = %quest.title,
            success = outcome.success,
            matching = outcome.matching_replies.len(),
            "conditions evaluated"
        );
        Ok(outcome)
    }

    /// Whether a predicate passes, and the replies it matches. A global
    /// predicate matches all replies or none; a per-reply predicate passes
    /// when any reply matches.
    async fn run(&self, predicate: &Predicate, ctx: &EvaluationContext) -> DomainResult<(bool, Vec<ReplyEvent>)> {
        if predicate.is_global() {
            let passes = self.global_passes(predicate).await?;
            return Ok((passes, if passes { ctx.replies.clone() } else { Vec::new() }));
        }

        let mut matching = Vec::new();
        for reply in &ctx.replies {
            if self.reply_matches(predicate, reply).await? {
                matching.push(reply.clone());
            }
        }
        Ok((!matching.is_empty(), matching))
    }

    async fn global_passes(&self, predicate: &Predicate) -> DomainResult<bool> {
        match predicate {
            Predicate::CountMilestone { key, op, threshold } => {
                let count = self.store.count_users_with_timeline_key(key).await?;
                Ok(op.compare(count, *threshold))
            }
            _ => Ok(true),
        }
    }

    async fn reply_matches(&self, predicate: &Predicate, reply: &ReplyEvent) -> DomainResult<bool> {
        let did = reply.author.did.as_str();
        match predicate {
            Predicate::AnyReply | Predicate::CountMilestone { .. } => self.global_passes(predicate).await,
            Predicate::HasMilestone(key) => self.store.has_timeline_key(did, key).await,
            Predicate::HasntMilestone(key) => Ok(!self.store.has_timeline_key(did, key).await?),
            Predicate::IsRegistered => Ok(self.store.get_user(did).await?.is_some()),
            Predicate::NotRegistered => Ok(self.store.get_user(did).await?.is_none()),
            Predicate::HasCollectible(key) => self.store.has_collectible(did, key).await,
            Predicate::HasntCollectible(key) => Ok(!self.store.has_collectible(did, key).await?),
            Predicate::ValueInList { field, values } => {
                let value = match field.as_str() {
                    "did" => Some(did.to_string()),
                    "handle" => Some(reply.author.handle.clone()),
                    _ => self
                        .store
                        .get_user(did)
                        .await?
                        .and_then(|user| user.field(field).map(str::to_string)),
                };
                Ok(value.is_some_and(|v| values.iter().any(|candidate| candidate.eq_ignore_ascii_case(&v))))
            }
            Predicate::TextContains(phrases) => {
                let text = reply.record.text.to_lowercase();
                Ok(phrases.iter().any(|p| text.contains(p.as_str())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteDomainStore};
    use crate::domain::errors::DomainError;
    use crate::domain::models::{NewUser, TimelineEntry, TriggerConfig, TriggerType};

    const QUEST_POST: &str = "at://did:plc:quest/app.bsky.feed.post/1";

    async fn setup() -> (ConditionEvaluator, Arc<SqliteDomainStore>) {
        let pool = create_migrated_test_pool().await.unwrap();
        let store = Arc::new(SqliteDomainStore::new(pool));
        (ConditionEvaluator::new(store.clone()), store)
    }

    fn quest(conditions: Vec<Condition>) -> Quest {
        let mut quest = Quest::new(
            "greet",
            TriggerConfig::ReplyToPost {
                post_uri: QUEST_POST.into(),
                known_authors_only: false,
            },
        );
        quest.conditions = conditions;
        quest
    }

    fn reply(n: u32, did: &str, text: &str) -> ReplyEvent {
        ReplyEvent::new(
            format!("at://{did}/app.bsky.feed.post/{n}"),
            did,
            format!("{}.test", did.trim_start_matches("did:plc:")),
            text,
            "2026-01-01T00:00:00Z",
        )
    }

    fn ctx(replies: Vec<ReplyEvent>) -> EvaluationContext {
        EvaluationContext::new(TriggerType::ReplyToPost, replies)
    }

    fn cond(name: &str, args: &[&str]) -> Condition {
        Condition::new(name, args.iter().map(|a| (*a).to_string()).collect())
    }

    async fn grant(store: &SqliteDomainStore, did: &str, key: &str) {
        store
            .insert_timeline_if_absent(&TimelineEntry::new(did, key, "event", "seeded"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_no_conditions_passes_with_all_replies() {
        let (evaluator, _) = setup().await;
        let out = evaluator
            .evaluate(&quest(vec![]), &ctx(vec![reply(1, "did:plc:a", "hi"), reply(2, "did:plc:b", "yo")]))
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.matching_replies.len(), 2);
    }

    #[tokio::test]
    async fn test_hasnt_milestone_filters_replies() {
        let (evaluator, store) = setup().await;
        grant(&store, "did:plc:a", "greeted").await;

        let out = evaluator
            .evaluate(
                &quest(vec![cond("hasnt_canon", &["greeted"])]),
                &ctx(vec![reply(1, "did:plc:a", "hi"), reply(2, "did:plc:b", "hi")]),
            )
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.matching_replies.len(), 1);
        assert_eq!(out.matching_replies[0].author.did, "did:plc:b");
    }

    #[tokio::test]
    async fn test_count_milestone_threshold_boundary() {
        let (evaluator, store) = setup().await;
        for i in 0..4 {
            grant(&store, &format!("did:plc:u{i}"), "first-five").await;
        }
        let q = quest(vec![cond("count-milestone", &["first-five", "<", "5"])]);
        let c = ctx(vec![reply(1, "did:plc:new", "me!")]);

        assert!(evaluator.evaluate(&q, &c).await.unwrap().success);

        grant(&store, "did:plc:u4", "first-five").await;
        let out = evaluator.evaluate(&q, &c).await.unwrap();
        assert!(!out.success);
        assert!(out.matching_replies.is_empty());
    }

    #[tokio::test]
    async fn test_mixed_groups() {
        let (evaluator, store) = setup().await;
        store
            .insert_user_if_absent(&NewUser {
                did: "did:plc:a".into(),
                handle: "a.test".into(),
                name: "ash".into(),
                pds: None,
            })
            .await
            .unwrap();

        // AND passes, OR has one pass, NOT has none.
        let q = quest(vec![
            cond("is-registered", &[]),
            cond("text-contains", &["sunrise"]).with_operator(ConditionOperator::Or),
            cond("text-contains", &["moon"]).with_operator(ConditionOperator::Or),
            cond("has-collectible", &["banned"]).with_operator(ConditionOperator::Not),
        ]);
        let out = evaluator
            .evaluate(&q, &ctx(vec![reply(1, "did:plc:a", "The MOON is up")]))
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.results.len(), 4);
        assert!(!out.results[1].passed);
        assert!(out.results[2].passed);

        // No OR condition passes.
        let out = evaluator
            .evaluate(&q, &ctx(vec![reply(1, "did:plc:a", "clouds")]))
            .await
            .unwrap();
        assert!(!out.success);
    }

    #[tokio::test]
    async fn test_not_only_quest_matches_every_reply() {
        let (evaluator, store) = setup().await;
        store.grant_collectible_if_absent("did:plc:b", "banned").await.unwrap();

        let q = quest(vec![cond("has-collectible", &["banned"]).with_operator(ConditionOperator::Not)]);
        let out = evaluator
            .evaluate(&q, &ctx(vec![reply(1, "did:plc:a", "hi")]))
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.matching_replies.len(), 1);

        let out = evaluator
            .evaluate(&q, &ctx(vec![reply(1, "did:plc:a", "hi"), reply(2, "did:plc:b", "hi")]))
            .await
            .unwrap();
        assert!(!out.success);
    }

    #[tokio::test]
    async fn test_xor_requires_exactly_one() {
        let (evaluator, _) = setup().await;
        let q = quest(vec![
            cond("text-contains", &["left"]).with_operator(ConditionOperator::Xor),
            cond("text-contains", &["right"]).with_operator(ConditionOperator::Xor),
        ]);
        assert!(evaluator.evaluate(&q, &ctx(vec![reply(1, "did:plc:a", "go left")])).await.unwrap().success);
        assert!(!evaluator
            .evaluate(&q, &ctx(vec![reply(1, "did:plc:a", "left and right")]))
            .await
            .unwrap()
            .success);
    }

    #[tokio::test]
    async fn test_once_only_and_custom_commands_follow_passing_conditions() {
        let (evaluator, _) = setup().await;
        let q = quest(vec![
            cond("text-contains", &["hello"])
                .once()
                .with_custom_commands(vec![Command::new("grant-collectible", vec!["hello-badge".into()])])
                .with_operator(ConditionOperator::Or),
            cond("text-contains", &["bye"])
                .once()
                .with_custom_commands(vec![Command::new("grant-collectible", vec!["bye-badge".into()])])
                .with_operator(ConditionOperator::Or),
        ]);
        let out = evaluator
            .evaluate(&q, &ctx(vec![reply(1, "did:plc:a", "hello friend")]))
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.once_only_matched, vec![0]);
        assert_eq!(out.custom_commands.len(), 1);
        assert_eq!(out.custom_commands[0].args, vec!["hello-badge"]);
    }

    #[tokio::test]
    async fn test_disabled_conditions_are_skipped() {
        let (evaluator, _) = setup().await;
        let mut blocked = cond("text-contains", &["never"]);
        blocked.disabled = true;
        let q = quest(vec![blocked, cond("any-reply", &[])]);
        let out = evaluator
            .evaluate(&q, &ctx(vec![reply(1, "did:plc:a", "hi")]))
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.results.len(), 1);
        assert_eq!(out.results[0].index, 1);
    }

    #[tokio::test]
    async fn test_all_conditions_disabled_never_passes() {
        let (evaluator, _) = setup().await;
        let mut spent = cond("any-reply", &[]).once();
        spent.disabled = true;
        let out = evaluator
            .evaluate(&quest(vec![spent]), &ctx(vec![reply(1, "did:plc:a", "hi")]))
            .await
            .unwrap();
        assert!(!out.success);
        assert!(out.matching_replies.is_empty());
        assert!(out.results.is_empty());
    }

    #[tokio::test]
    async fn test_two_once_only_conditions_tracked_together() {
        let (evaluator, _) = setup().await;
        let q = quest(vec![
            cond("text-contains", &["hello"]).once(),
            cond("any-reply", &[]).once(),
            cond("text-contains", &["bye"]).once().with_operator(ConditionOperator::Or),
            cond("any-reply", &[]).with_operator(ConditionOperator::Or),
        ]);
        let out = evaluator
            .evaluate(&q, &ctx(vec![reply(1, "did:plc:a", "hello there")]))
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.once_only_matched, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_unknown_condition_is_configuration_error() {
        let (evaluator, _) = setup().await;
        let err = evaluator
            .evaluate(&quest(vec![cond("is_full_moon", &[])]), &ctx(vec![reply(1, "did:plc:a", "hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::UnknownCondition(_)));
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_value_in_list_reads_user_fields() {
        let (evaluator, store) = setup().await;
        store
            .insert_user_if_absent(&NewUser {
                did: "did:plc:a".into(),
                handle: "a.test".into(),
                name: "ash".into(),
                pds: Some("https://pds.example".into()),
            })
            .await
            .unwrap();
        let q = quest(vec![cond("user_value_in", &["name", "ash", "birch"])]);
        assert!(evaluator.evaluate(&q, &ctx(vec![reply(1, "did:plc:a", "hi")])).await.unwrap().success);
        assert!(!evaluator.evaluate(&q, &ctx(vec![reply(2, "did:plc:z", "hi")])).await.unwrap().success);
    }
}
