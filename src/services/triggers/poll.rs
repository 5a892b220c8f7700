use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use super::{TriggerDeps, TriggerHandler};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{did_of_uri, EvaluationContext, Quest, TriggerConfig, TriggerEvent, TriggerType};

/// Quests re-evaluated on an interval against every reply to their post.
pub struct PollHandler {
    by_title: HashMap<String, Arc<Quest>>,
    deps: TriggerDeps,
}

impl PollHandler {
    pub fn new(quests: Vec<Arc<Quest>>, deps: TriggerDeps) -> Self {
        let by_title = quests
            .into_iter()
            .filter(|q| matches!(q.trigger, TriggerConfig::Poll { .. }))
            .map(|q| (q.title.clone(), q))
            .collect();
        Self { by_title, deps }
    }
}

#[async_trait]
impl TriggerHandler for PollHandler {
    fn trigger_type(&self) -> TriggerType {
        TriggerType::Poll
    }

    fn should_activate(&self, event: &TriggerEvent) -> bool {
        matches!(event, TriggerEvent::Tick { quest_title, .. } if self.by_title.contains_key(quest_title))
    }

    fn quests_for(&self, event: &TriggerEvent) -> Vec<Arc<Quest>> {
        match event {
            TriggerEvent::Tick { quest_title, .. } => self.by_title.get(quest_title).cloned().into_iter().collect(),
            _ => Vec::new(),
        }
    }

    async fn evaluation_context(&self, _event: &TriggerEvent, quest: &Quest) -> DomainResult<EvaluationContext> {
        let TriggerConfig::Poll { post_uri, max_depth, .. } = &quest.trigger else {
            return Err(DomainError::ValidationFailed(format!("quest '{}' is not a poll quest", quest.title)));
        };
        let thread = self.deps.network.get_thread_replies(post_uri, *max_depth).await?;
        tracing::debug!(
            quest = %quest.title,
            fetched = thread.stats.fetched,
            duplicates = thread.stats.duplicates,
            replies = thread.replies.len(),
            "poll fetched thread"
        );
        Ok(EvaluationContext::new(TriggerType::Poll, thread.replies)
            .with_subject_author(did_of_uri(post_uri).map(str::to_string)))
    }

    fn monitored_keys(&self) -> HashSet<String> {
        self.by_title.keys().cloned().collect()
    }
}
