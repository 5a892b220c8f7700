//! Repository port for quest definitions.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Quest, QuestUpdate};

/// Repository for persisting and querying quests. Titles are unique.
#[async_trait]
pub trait QuestRepository: Send + Sync {
    /// Create a new quest.
    async fn create(&self, quest: &Quest) -> DomainResult<()>;

    /// Get a quest by title.
    async fn get(&self, title: &str) -> DomainResult<Option<Quest>>;

    /// Apply a partial update; returns the stored quest.
    async fn update(&self, title: &str, update: QuestUpdate) -> DomainResult<Quest>;

    /// Turn a quest off.
    async fn disable(&self, title: &str) -> DomainResult<()>;

    /// Mark the listed conditions (by index) as disabled.
    async fn disable_conditions(&self, title: &str, indices: &[usize]) -> DomainResult<()>;

    /// Delete a quest.
    async fn delete(&self, title: &str) -> DomainResult<()>;

    /// List all quests.
    async fn list(&self) -> DomainResult<Vec<Quest>>;

    /// List only enabled quests.
    async fn list_enabled(&self) -> DomainResult<Vec<Quest>>;
}
