use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use super::{TriggerDeps, TriggerHandler};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{did_of_uri, EvaluationContext, Quest, TriggerConfig, TriggerEvent, TriggerType};

/// Replies to tracked quest posts.
pub struct ReplyToPostHandler {
    by_post: HashMap<String, Vec<Arc<Quest>>>,
    deps: TriggerDeps,
}

impl ReplyToPostHandler {
    pub fn new(quests: Vec<Arc<Quest>>, deps: TriggerDeps) -> Self {
        let mut by_post: HashMap<String, Vec<Arc<Quest>>> = HashMap::new();
        for quest in quests {
            if let TriggerConfig::ReplyToPost { post_uri, .. } = &quest.trigger {
                by_post.entry(post_uri.clone()).or_default().push(Arc::clone(&quest));
            }
        }
        Self { by_post, deps }
    }

    fn author_allowed(&self, quest: &Quest, did: &str) -> bool {
        match &quest.trigger {
            TriggerConfig::ReplyToPost { known_authors_only, .. } => {
                !known_authors_only || self.deps.identities.contains(did)
            }
            _ => false,
        }
    }

    fn matching(&self, event: &TriggerEvent) -> Vec<Arc<Quest>> {
        let TriggerEvent::Post(post) = event else {
            return Vec::new();
        };
        if !post.is_reply() {
            return Vec::new();
        }
        let mut seen = HashSet::new();
        [&post.reply_parent, &post.reply_root]
            .into_iter()
            .flatten()
            .filter_map(|uri| self.by_post.get(uri))
            .flatten()
            .filter(|q| seen.insert(q.title.clone()))
            .filter(|q| self.author_allowed(q, &post.author_did))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TriggerHandler for ReplyToPostHandler {
    fn trigger_type(&self) -> TriggerType {
        TriggerType::ReplyToPost
    }

    fn should_activate(&self, event: &TriggerEvent) -> bool {
        !self.matching(event).is_empty()
    }

    fn quests_for(&self, event: &TriggerEvent) -> Vec<Arc<Quest>> {
        self.matching(event)
    }

    async fn evaluation_context(&self, event: &TriggerEvent, quest: &Quest) -> DomainResult<EvaluationContext> {
        let TriggerEvent::Post(post) = event else {
            return Err(DomainError::ValidationFailed("reply trigger needs a post event".to_string()));
        };
        let handle = self
            .deps
            .resolve_handle(&post.author_did, post.author_handle.as_deref())
            .await;
        let subject = quest.trigger.post_uri().and_then(did_of_uri).map(str::to_string);
        Ok(EvaluationContext::new(TriggerType::ReplyToPost, vec![post.to_reply_event(handle)])
            .with_subject_author(subject))
    }

    fn monitored_keys(&self) -> HashSet<String> {
        self.by_post.keys().cloned().collect()
    }
}
