//! In-memory network client for tests and dry runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{dedup_by_uri, Profile, ReplyEvent, ReplyRef, StrongRef};
use crate::domain::ports::{NetworkClient, ThreadReplies, ThreadStats};

/// A post the mock was asked to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPost {
    pub text: String,
    pub reply_to: Option<ReplyRef>,
}

#[derive(Default)]
struct MockState {
    profiles: HashMap<String, Profile>,
    threads: HashMap<String, Vec<ReplyEvent>>,
    records: HashMap<String, serde_json::Value>,
    posts: Vec<SentPost>,
    likes: Vec<String>,
}

/// Records writes and serves canned reads.
#[derive(Clone, Default)]
pub struct MockNetworkClient {
    state: Arc<RwLock<MockState>>,
    fail_writes: bool,
    fail_profiles: bool,
}

impl MockNetworkClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every post and like fails with a network error.
    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    /// Every profile lookup fails with a network error.
    pub fn failing_profiles() -> Self {
        Self {
            fail_profiles: true,
            ..Self::default()
        }
    }

    pub async fn add_profile(&self, did: &str, handle: &str, display_name: Option<&str>) {
        self.state.write().await.profiles.insert(
            did.to_string(),
            Profile {
                did: did.to_string(),
                handle: handle.to_string(),
                display_name: display_name.map(str::to_string),
                avatar: None,
            },
        );
    }

    pub async fn add_thread_reply(&self, root_uri: &str, reply: ReplyEvent) {
        self.state
            .write()
            .await
            .threads
            .entry(root_uri.to_string())
            .or_default()
            .push(reply);
    }

    pub async fn add_record(&self, uri: &str, value: serde_json::Value) {
        self.state.write().await.records.insert(uri.to_string(), value);
    }

    pub async fn posts(&self) -> Vec<SentPost> {
        self.state.read().await.posts.clone()
    }

    pub async fn likes(&self) -> Vec<String> {
        self.state.read().await.likes.clone()
    }
}

#[async_trait]
impl NetworkClient for MockNetworkClient {
    async fn resolve_profile(&self, did: &str) -> DomainResult<Option<Profile>> {
        if self.fail_profiles {
            return Err(DomainError::NetworkError("mock profile failure".to_string()));
        }
        Ok(self.state.read().await.profiles.get(did).cloned())
    }

    async fn create_post(&self, text: &str, reply_to: Option<&ReplyRef>) -> DomainResult<StrongRef> {
        if self.fail_writes {
            return Err(DomainError::NetworkError("mock write failure".to_string()));
        }
        let mut state = self.state.write().await;
        state.posts.push(SentPost {
            text: text.to_string(),
            reply_to: reply_to.cloned(),
        });
        let n = state.posts.len();
        Ok(StrongRef {
            uri: format!("at://did:plc:mock/app.bsky.feed.post/{n}"),
            cid: format!("bafymock{n}"),
        })
    }

    async fn create_like(&self, uri: &str, _cid: Option<&str>) -> DomainResult<()> {
        if self.fail_writes {
            return Err(DomainError::NetworkError("mock write failure".to_string()));
        }
        self.state.write().await.likes.push(uri.to_string());
        Ok(())
    }

    async fn get_thread_replies(&self, uri: &str, _max_depth: u32) -> DomainResult<ThreadReplies> {
        let state = self.state.read().await;
        let all = state.threads.get(uri).cloned().unwrap_or_default();
        let fetched = all.len();
        let replies = dedup_by_uri(all);
        let mut authors = Vec::new();
        for reply in &replies {
            if !authors.contains(&reply.author) {
                authors.push(reply.author.clone());
            }
        }
        Ok(ThreadReplies {
            stats: ThreadStats {
                fetched,
                duplicates: fetched - replies.len(),
                max_depth_seen: u32::from(!replies.is_empty()),
            },
            replies,
            authors,
        })
    }

    async fn get_record(&self, uri: &str) -> DomainResult<Option<serde_json::Value>> {
        Ok(self.state.read().await.records.get(uri).cloned())
    }
}
