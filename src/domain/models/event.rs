//! Normalized stream events and the evaluation context built from them.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::quest::TriggerType;

/// Collection holding posts.
pub const POST_COLLECTION: &str = "app.bsky.feed.post";

/// Author of a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub did: String,
    pub handle: String,
}

/// The post record body the engine cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub text: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

/// The uniform shape every trigger produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyEvent {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    pub author: Author,
    pub record: PostRecord,
}

impl ReplyEvent {
    pub fn new(
        uri: impl Into<String>,
        did: impl Into<String>,
        handle: impl Into<String>,
        text: impl Into<String>,
        created_at: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            cid: None,
            author: Author {
                did: did.into(),
                handle: handle.into(),
            },
            record: PostRecord {
                text: text.into(),
                created_at: created_at.into(),
            },
        }
    }
}

/// A `{uri, cid}` pair referencing a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrongRef {
    pub uri: String,
    pub cid: String,
}

/// Reply linkage of a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRef {
    pub parent: StrongRef,
    pub root: StrongRef,
}

/// A created post, decoded from either stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostEvent {
    pub uri: String,
    pub cid: Option<String>,
    pub author_did: String,
    /// The firehose and Jetstream carry only DIDs; handles are resolved later.
    pub author_handle: Option<String>,
    pub text: String,
    pub created_at: String,
    pub reply_parent: Option<String>,
    pub reply_root: Option<String>,
}

impl PostEvent {
    pub fn is_reply(&self) -> bool {
        self.reply_parent.is_some() || self.reply_root.is_some()
    }

    /// Whether this post replies (directly or within the thread) to `uri`.
    pub fn replies_to(&self, uri: &str) -> bool {
        self.reply_parent.as_deref() == Some(uri) || self.reply_root.as_deref() == Some(uri)
    }

    pub fn to_reply_event(&self, handle: impl Into<String>) -> ReplyEvent {
        ReplyEvent {
            uri: self.uri.clone(),
            cid: self.cid.clone(),
            author: Author {
                did: self.author_did.clone(),
                handle: handle.into(),
            },
            record: PostRecord {
                text: self.text.clone(),
                created_at: self.created_at.clone(),
            },
        }
    }

    /// Build from a decoded record value.
    pub fn from_record(
        did: &str,
        rkey: &str,
        cid: Option<String>,
        record: &serde_json::Value,
    ) -> Option<Self> {
        let text = record.get("text")?.as_str()?.to_string();
        let created_at = record
            .get("createdAt")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let reply = record.get("reply");
        let reply_uri = |key: &str| {
            reply
                .and_then(|r| r.get(key))
                .and_then(|r| r.get("uri"))
                .and_then(|u| u.as_str())
                .map(str::to_string)
        };
        Some(Self {
            uri: format!("at://{did}/{POST_COLLECTION}/{rkey}"),
            cid,
            author_did: did.to_string(),
            author_handle: None,
            text,
            created_at,
            reply_parent: reply_uri("parent"),
            reply_root: reply_uri("root"),
        })
    }
}

/// A non-post record created in a watched collection.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordEvent {
    pub did: String,
    pub collection: String,
    pub rkey: String,
    pub cid: Option<String>,
    pub record: serde_json::Value,
}

impl RecordEvent {
    pub fn uri(&self) -> String {
        format!("at://{}/{}/{}", self.did, self.collection, self.rkey)
    }
}

/// What the dispatcher hands to trigger handlers.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerEvent {
    Post(PostEvent),
    Record(RecordEvent),
    /// A poll tick for one quest.
    Tick { quest_title: String, at: DateTime<Utc> },
}

/// Resource looked up for a partner-completion record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerResource {
    pub uri: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub owner_did: Option<String>,
    /// Which lookup produced this resource.
    pub source: String,
}

/// Input to the condition evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationContext {
    pub trigger: TriggerType,
    pub replies: Vec<ReplyEvent>,
    #[serde(default)]
    pub matched_phrases: Vec<String>,
    #[serde(default)]
    pub resource: Option<PartnerResource>,
    /// Author of the quest post, when known.
    #[serde(default)]
    pub subject_author: Option<String>,
}

impl EvaluationContext {
    pub const fn new(trigger: TriggerType, replies: Vec<ReplyEvent>) -> Self {
        Self {
            trigger,
            replies,
            matched_phrases: Vec::new(),
            resource: None,
            subject_author: None,
        }
    }

    pub fn with_phrases(mut self, phrases: Vec<String>) -> Self {
        self.matched_phrases = phrases;
        self
    }

    pub fn with_resource(mut self, resource: PartnerResource) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn with_subject_author(mut self, did: Option<String>) -> Self {
        self.subject_author = did;
        self
    }
}

/// Keep the first reply per URI, preserving order.
pub fn dedup_by_uri(replies: impl IntoIterator<Item = ReplyEvent>) -> Vec<ReplyEvent> {
    let mut seen = HashSet::new();
    replies
        .into_iter()
        .filter(|r| seen.insert(r.uri.clone()))
        .collect()
}

/// Extract the DID authority from an `at://` URI.
pub fn did_of_uri(uri: &str) -> Option<&str> {
    uri.strip_prefix("at://")?.split('/').next().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_post_from_record_with_reply() {
        let record = json!({
            "$type": "app.bsky.feed.post",
            "text": "hello there",
            "createdAt": "2026-01-01T00:00:00Z",
            "reply": {
                "parent": {"uri": "at://did:plc:q/app.bsky.feed.post/p", "cid": "bafyp"},
                "root": {"uri": "at://did:plc:q/app.bsky.feed.post/r", "cid": "bafyr"}
            }
        });
        let post = PostEvent::from_record("did:plc:u", "3k", None, &record).unwrap();
        assert_eq!(post.uri, "at://did:plc:u/app.bsky.feed.post/3k");
        assert!(post.is_reply());
        assert!(post.replies_to("at://did:plc:q/app.bsky.feed.post/r"));
        assert!(!post.replies_to("at://did:plc:q/app.bsky.feed.post/other"));
    }

    #[test]
    fn test_post_without_text_is_ignored() {
        assert!(PostEvent::from_record("did:plc:u", "1", None, &json!({"embed": {}})).is_none());
    }

    #[test]
    fn test_dedup_by_uri_keeps_first() {
        let a = ReplyEvent::new("at://a", "did:1", "one", "first", "");
        let b = ReplyEvent::new("at://a", "did:1", "one", "second", "");
        let c = ReplyEvent::new("at://c", "did:2", "two", "third", "");
        let out = dedup_by_uri(vec![a, b, c]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].record.text, "first");
    }

    #[test]
    fn test_did_of_uri() {
        assert_eq!(did_of_uri("at://did:plc:abc/app.bsky.feed.post/1"), Some("did:plc:abc"));
        assert_eq!(did_of_uri("https://example.com"), None);
    }
}
