//! Repository port for stream cursors.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::CursorRecord;

/// Durable cursor rows, one per consumer service.
#[async_trait]
pub trait CursorRepository: Send + Sync {
    async fn load(&self, service: &str) -> DomainResult<Option<CursorRecord>>;

    /// Store a position. Implementations must never move a cursor backwards.
    async fn save(&self, service: &str, position: i64, events_processed: i64) -> DomainResult<()>;

    async fn record_error(&self, service: &str, message: &str) -> DomainResult<()>;

    async fn list(&self) -> DomainResult<Vec<CursorRecord>>;
}
