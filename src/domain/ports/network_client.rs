//! Port for the identity network the engine reads from and posts to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;
use crate::domain::models::{Author, Profile, ReplyEvent, ReplyRef, StrongRef};

/// Replies gathered from a thread.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadReplies {
    pub replies: Vec<ReplyEvent>,
    pub authors: Vec<Author>,
    pub stats: ThreadStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadStats {
    pub fetched: usize,
    pub duplicates: usize,
    pub max_depth_seen: u32,
}

#[async_trait]
pub trait NetworkClient: Send + Sync {
    async fn resolve_profile(&self, did: &str) -> DomainResult<Option<Profile>>;

    async fn create_post(&self, text: &str, reply_to: Option<&ReplyRef>) -> DomainResult<StrongRef>;

    async fn create_like(&self, uri: &str, cid: Option<&str>) -> DomainResult<()>;

    async fn get_thread_replies(&self, uri: &str, max_depth: u32) -> DomainResult<ThreadReplies>;

    /// Generic record read from the owning repository.
    async fn get_record(&self, uri: &str) -> DomainResult<Option<serde_json::Value>>;
}
