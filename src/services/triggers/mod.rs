//! Trigger handlers.
//!
//! A handler owns the quests of one trigger type in the current snapshot. It
//! answers three questions about an event: could it matter
//! ([`TriggerHandler::should_activate`]), which quests does it concern, and
//! what evaluation context should each of those quests see.

mod partner;
mod phrase;
mod poll;
mod reply;

pub use partner::PartnerCompletionHandler;
pub use phrase::NetworkPhraseHandler;
pub use poll::PollHandler;
pub use reply::ReplyToPostHandler;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{EvaluationContext, Quest, TriggerEvent, TriggerType};
use crate::domain::ports::{DomainStore, NetworkClient, PartnerClient};
use crate::services::identities::IdentitySet;

#[async_trait]
pub trait TriggerHandler: Send + Sync {
    fn trigger_type(&self) -> TriggerType;

    /// Cheap synchronous relevance check run on the receive loop.
    fn should_activate(&self, event: &TriggerEvent) -> bool;

    /// Quests this event concerns.
    fn quests_for(&self, event: &TriggerEvent) -> Vec<Arc<Quest>>;

    async fn evaluation_context(&self, event: &TriggerEvent, quest: &Quest) -> DomainResult<EvaluationContext>;

    /// URIs, phrases or collections this handler watches, feeding the stream pre-filter.
    fn monitored_keys(&self) -> HashSet<String>;
}

/// Collaborators handlers need to build contexts.
#[derive(Clone)]
pub struct TriggerDeps {
    pub store: Arc<dyn DomainStore>,
    pub network: Arc<dyn NetworkClient>,
    pub partner: Option<Arc<dyn PartnerClient>>,
    pub identities: Arc<IdentitySet>,
    pub partner_timeout: Duration,
}

impl TriggerDeps {
    /// Handle for a DID: stored user first, then the network, then the DID itself.
    pub async fn resolve_handle(&self, did: &str, known: Option<&str>) -> String {
        if let Some(handle) = known.filter(|h| !h.is_empty()) {
            return handle.to_string();
        }
        match self.store.get_user(did).await {
            Ok(Some(user)) => return user.handle,
            Ok(None) => {}
            Err(e) => tracing::warn!(did, error = %e, "user lookup failed during handle resolution"),
        }
        match self.network.resolve_profile(did).await {
            Ok(Some(profile)) => profile.handle,
            Ok(None) => did.to_string(),
            Err(e) => {
                tracing::debug!(did, error = %e, "profile lookup failed, using did as handle");
                did.to_string()
            }
        }
    }
}

/// Build one handler per trigger type present in `quests`.
pub fn build_handlers(quests: &[Arc<Quest>], deps: &TriggerDeps) -> Vec<Arc<dyn TriggerHandler>> {
    let mut by_type: HashMap<TriggerType, Vec<Arc<Quest>>> = HashMap::new();
    for quest in quests.iter().filter(|q| q.enabled) {
        by_type.entry(quest.trigger_type()).or_default().push(Arc::clone(quest));
    }

    let mut handlers: Vec<Arc<dyn TriggerHandler>> = Vec::new();
    for trigger in [
        TriggerType::ReplyToPost,
        TriggerType::NetworkPhrase,
        TriggerType::PartnerCompletion,
        TriggerType::Poll,
    ] {
        let Some(quests) = by_type.remove(&trigger) else {
            continue;
        };
        match trigger {
            TriggerType::ReplyToPost => handlers.push(Arc::new(ReplyToPostHandler::new(quests, deps.clone()))),
            TriggerType::NetworkPhrase => match NetworkPhraseHandler::new(quests, deps.clone()) {
                Ok(handler) => handlers.push(Arc::new(handler)),
                Err(e) => tracing::error!(error = %e, "phrase set failed to build, phrase quests inactive"),
            },
            TriggerType::PartnerCompletion => {
                handlers.push(Arc::new(PartnerCompletionHandler::new(quests, deps.clone())));
            }
            TriggerType::Poll => handlers.push(Arc::new(PollHandler::new(quests, deps.clone()))),
        }
    }
    handlers
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::adapters::network::MockNetworkClient;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteDomainStore};
    use crate::domain::models::PostEvent;

    pub async fn deps_with(network: MockNetworkClient) -> TriggerDeps {
        let pool = create_migrated_test_pool().await.unwrap();
        TriggerDeps {
            store: Arc::new(SqliteDomainStore::new(pool)),
            network: Arc::new(network),
            partner: None,
            identities: Arc::new(IdentitySet::default()),
            partner_timeout: Duration::from_millis(200),
        }
    }

    pub fn post(author: &str, text: &str, parent: Option<&str>) -> TriggerEvent {
        TriggerEvent::Post(PostEvent {
            uri: format!("at://{author}/app.bsky.feed.post/r1"),
            cid: Some("bafyreply".into()),
            author_did: author.into(),
            author_handle: None,
            text: text.into(),
            created_at: "2026-01-01T00:00:00Z".into(),
            reply_parent: parent.map(str::to_string),
            reply_root: parent.map(str::to_string),
        })
    }
}
