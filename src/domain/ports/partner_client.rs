//! Port for the partner service publishing completion records.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::PartnerResource;

#[async_trait]
pub trait PartnerClient: Send + Sync {
    /// Structured lookup of a tracked resource.
    async fn lookup_resource(&self, uri: &str) -> DomainResult<Option<PartnerResource>>;
}
