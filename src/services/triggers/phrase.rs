use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use regex::RegexSet;

use super::{TriggerDeps, TriggerHandler};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{EvaluationContext, Quest, TriggerConfig, TriggerEvent, TriggerType};

/// Posts anywhere on the network containing a monitored phrase.
///
/// All phrases of all phrase quests compile into one `RegexSet`; pattern `i`
/// belongs to `owners[i]`.
pub struct NetworkPhraseHandler {
    quests: Vec<Arc<Quest>>,
    set: RegexSet,
    owners: Vec<(usize, String)>,
    deps: TriggerDeps,
}

fn pattern(phrase: &str, case_sensitive: bool) -> String {
    let escaped = regex::escape(phrase.trim());
    if case_sensitive {
        escaped
    } else {
        format!("(?i){escaped}")
    }
}

impl NetworkPhraseHandler {
    pub fn new(quests: Vec<Arc<Quest>>, deps: TriggerDeps) -> Result<Self, regex::Error> {
        let mut patterns = Vec::new();
        let mut owners = Vec::new();
        for (index, quest) in quests.iter().enumerate() {
            if let TriggerConfig::NetworkPhrase { phrases } = &quest.trigger {
                for phrase in phrases.iter().filter(|p| !p.phrase.trim().is_empty()) {
                    patterns.push(pattern(&phrase.phrase, phrase.case_sensitive));
                    owners.push((index, phrase.phrase.clone()));
                }
            }
        }
        Ok(Self {
            set: RegexSet::new(&patterns)?,
            quests,
            owners,
            deps,
        })
    }

    fn matched(&self, text: &str) -> Vec<(usize, &str)> {
        self.set
            .matches(text)
            .into_iter()
            .map(|i| (self.owners[i].0, self.owners[i].1.as_str()))
            .collect()
    }
}

#[async_trait]
impl TriggerHandler for NetworkPhraseHandler {
    fn trigger_type(&self) -> TriggerType {
        TriggerType::NetworkPhrase
    }

    fn should_activate(&self, event: &TriggerEvent) -> bool {
        matches!(event, TriggerEvent::Post(post) if self.set.is_match(&post.text))
    }

    fn quests_for(&self, event: &TriggerEvent) -> Vec<Arc<Quest>> {
        let TriggerEvent::Post(post) = event else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        self.matched(&post.text)
            .into_iter()
            .filter(|(index, _)| seen.insert(*index))
            .map(|(index, _)| Arc::clone(&self.quests[index]))
            .collect()
    }

    async fn evaluation_context(&self, event: &TriggerEvent, quest: &Quest) -> DomainResult<EvaluationContext> {
        let TriggerEvent::Post(post) = event else {
            return Err(DomainError::ValidationFailed("phrase trigger needs a post event".to_string()));
        };
        let phrases: Vec<String> = self
            .matched(&post.text)
            .into_iter()
            .filter(|(index, _)| self.quests[*index].title == quest.title)
            .map(|(_, phrase)| phrase.to_string())
            .collect();
        let handle = self
            .deps
            .resolve_handle(&post.author_did, post.author_handle.as_deref())
            .await;
        Ok(EvaluationContext::new(TriggerType::NetworkPhrase, vec![post.to_reply_event(handle)]).with_phrases(phrases))
    }

    fn monitored_keys(&self) -> HashSet<String> {
        self.owners.iter().map(|(_, phrase)| phrase.clone()).collect()
    }
}
