//! Port for the shared domain state conditions read and commands write.
//!
//! Every write is an insert-if-absent or a single-row conditional update, so
//! concurrent duplicate events cannot create duplicate rows.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{NameClaim, NewUser, TimelineEntry, User};

#[async_trait]
pub trait DomainStore: Send + Sync {
    async fn get_user(&self, did: &str) -> DomainResult<Option<User>>;

    /// Insert a user and claim their name. Returns `false` if the DID exists.
    async fn insert_user_if_absent(&self, user: &NewUser) -> DomainResult<bool>;

    /// DIDs of every registered user.
    async fn user_dids(&self) -> DomainResult<HashSet<String>>;

    /// Owner of a primary or alternate name.
    async fn name_owner(&self, name: &str) -> DomainResult<Option<String>>;

    /// Claim a name for `did` without changing their primary name.
    async fn claim_name(&self, did: &str, name: &str) -> DomainResult<NameClaim>;

    /// Switch the primary name if it still equals `expected_current`.
    /// The new name must already be claimed by `did`.
    async fn set_primary_name(
        &self,
        did: &str,
        expected_current: &str,
        new_name: &str,
    ) -> DomainResult<bool>;

    /// Whether the user has any timeline entry with `key`.
    async fn has_timeline_key(&self, did: &str, key: &str) -> DomainResult<bool>;

    /// Number of distinct users holding a timeline entry with `key`.
    async fn count_users_with_timeline_key(&self, key: &str) -> DomainResult<u64>;

    /// Insert keyed by (did, type, key); returns `false` when it already existed.
    async fn insert_timeline_if_absent(&self, entry: &TimelineEntry) -> DomainResult<bool>;

    async fn timeline(&self, did: &str) -> DomainResult<Vec<TimelineEntry>>;

    async fn has_collectible(&self, did: &str, key: &str) -> DomainResult<bool>;

    /// Insert keyed by (did, key); returns `false` when it already existed.
    async fn grant_collectible_if_absent(&self, did: &str, key: &str) -> DomainResult<bool>;

    async fn collectibles(&self, did: &str) -> DomainResult<Vec<String>>;

    /// Store an unordered pair once; returns `false` when it already existed.
    async fn link_kindred_if_absent(&self, a: &str, b: &str) -> DomainResult<bool>;

    async fn kindred(&self, did: &str) -> DomainResult<Vec<String>>;
}
