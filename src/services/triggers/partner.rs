use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{TriggerDeps, TriggerHandler};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    did_of_uri, EvaluationContext, PartnerResource, Quest, RecordEvent, ReplyEvent, TriggerConfig, TriggerEvent,
    TriggerType,
};

pub const RECORD_SOURCE: &str = "record";
pub const IDENTIFIERS_SOURCE: &str = "identifiers";

/// Completion records published by a partner service in its own collection.
pub struct PartnerCompletionHandler {
    by_collection: HashMap<String, Vec<Arc<Quest>>>,
    deps: TriggerDeps,
}

fn resources_of(quest: &Quest) -> &[String] {
    match &quest.trigger {
        TriggerConfig::PartnerCompletion { resources, .. } => resources,
        _ => &[],
    }
}

fn mentions(value: &Value, uri: &str) -> bool {
    match value {
        Value::String(s) => s == uri,
        Value::Array(items) => items.iter().any(|v| mentions(v, uri)),
        Value::Object(map) => map.values().any(|v| mentions(v, uri)),
        _ => false,
    }
}

/// First `at://` string in the record, preferring the conventional `subject` field.
fn referenced_uri(record: &Value) -> Option<String> {
    let subject = record.get("subject");
    let direct = subject
        .and_then(Value::as_str)
        .or_else(|| subject.and_then(|s| s.get("uri")).and_then(Value::as_str));
    if let Some(uri) = direct {
        return Some(uri.to_string());
    }
    fn first_uri(value: &Value) -> Option<&str> {
        match value {
            Value::String(s) if s.starts_with("at://") => Some(s),
            Value::Array(items) => items.iter().find_map(first_uri),
            Value::Object(map) => map.values().find_map(first_uri),
            _ => None,
        }
    }
    first_uri(record).map(str::to_string)
}

impl PartnerCompletionHandler {
    pub fn new(quests: Vec<Arc<Quest>>, deps: TriggerDeps) -> Self {
        let mut by_collection: HashMap<String, Vec<Arc<Quest>>> = HashMap::new();
        for quest in quests {
            if let TriggerConfig::PartnerCompletion { collection, .. } = &quest.trigger {
                by_collection.entry(collection.clone()).or_default().push(Arc::clone(&quest));
            }
        }
        Self { by_collection, deps }
    }

    fn matching(&self, record: &RecordEvent) -> Vec<Arc<Quest>> {
        let Some(quests) = self.by_collection.get(&record.collection) else {
            return Vec::new();
        };
        quests
            .iter()
            .filter(|q| {
                let resources = resources_of(q);
                resources.is_empty() || resources.iter().any(|r| mentions(&record.record, r))
            })
            .cloned()
            .collect()
    }

    /// Partner API, then the generic record read, then bare identifiers.
    async fn lookup(&self, uri: &str) -> PartnerResource {
        let budget = self.deps.partner_timeout;

        if let Some(partner) = &self.deps.partner {
            match tokio::time::timeout(budget, partner.lookup_resource(uri)).await {
                Ok(Ok(Some(resource))) => return resource,
                Ok(Ok(None)) => tracing::debug!(uri, "partner api does not know resource"),
                Ok(Err(e)) => tracing::warn!(uri, error = %e, "partner api lookup failed"),
                Err(_) => tracing::warn!(uri, timeout_ms = budget.as_millis() as u64, "partner api lookup timed out"),
            }
        }

        match tokio::time::timeout(budget, self.deps.network.get_record(uri)).await {
            Ok(Ok(Some(value))) => {
                let name = value
                    .get("name")
                    .or_else(|| value.get("title"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                return PartnerResource {
                    uri: uri.to_string(),
                    name,
                    owner_did: did_of_uri(uri).map(str::to_string),
                    source: RECORD_SOURCE.to_string(),
                };
            }
            Ok(Ok(None)) => tracing::debug!(uri, "resource record not found"),
            Ok(Err(e)) => tracing::warn!(uri, error = %e, "resource record lookup failed"),
            Err(_) => tracing::warn!(uri, "resource record lookup timed out"),
        }

        PartnerResource {
            uri: uri.to_string(),
            name: None,
            owner_did: did_of_uri(uri).map(str::to_string),
            source: IDENTIFIERS_SOURCE.to_string(),
        }
    }
}

#[async_trait]
impl TriggerHandler for PartnerCompletionHandler {
    fn trigger_type(&self) -> TriggerType {
        TriggerType::PartnerCompletion
    }

    fn should_activate(&self, event: &TriggerEvent) -> bool {
        matches!(event, TriggerEvent::Record(record) if !self.matching(record).is_empty())
    }

    fn quests_for(&self, event: &TriggerEvent) -> Vec<Arc<Quest>> {
        match event {
            TriggerEvent::Record(record) => self.matching(record),
            _ => Vec::new(),
        }
    }

    async fn evaluation_context(&self, event: &TriggerEvent, quest: &Quest) -> DomainResult<EvaluationContext> {
        let TriggerEvent::Record(record) = event else {
            return Err(DomainError::ValidationFailed("partner trigger needs a record event".to_string()));
        };

        let resource_uri = resources_of(quest)
            .iter()
            .find(|uri| mentions(&record.record, uri))
            .cloned()
            .or_else(|| referenced_uri(&record.record));

        let handle = self.deps.resolve_handle(&record.did, None).await;
        let text = record.record.get("text").and_then(Value::as_str).unwrap_or_default();
        let created_at = record.record.get("createdAt").and_then(Value::as_str).unwrap_or_default();
        let mut completion = ReplyEvent::new(record.uri(), &record.did, handle, text, created_at);
        completion.cid.clone_from(&record.cid);

        let mut ctx = EvaluationContext::new(TriggerType::PartnerCompletion, vec![completion]);
        if let Some(uri) = resource_uri {
            let resource = self.lookup(&uri).await;
            ctx = ctx.with_subject_author(resource.owner_did.clone()).with_resource(resource);
        }
        Ok(ctx)
    }

    fn monitored_keys(&self) -> HashSet<String> {
        self.by_collection
            .values()
            .flatten()
            .flat_map(|q| resources_of(q).iter().cloned())
            .collect()
    }
}
