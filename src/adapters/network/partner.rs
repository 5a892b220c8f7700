//! HTTP client for the partner service's structured resource API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use url::Url;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::PartnerResource;
use crate::domain::ports::PartnerClient;

use super::models::PartnerResourceResponse;

pub const PARTNER_API_SOURCE: &str = "partner-api";

#[derive(Debug, Clone)]
pub struct HttpPartnerClient {
    http: Client,
    base: String,
}

impl HttpPartnerClient {
    pub fn new(base: impl Into<String>, timeout: Duration) -> DomainResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::NetworkError(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            base: base.into(),
        })
    }
}

#[async_trait]
impl PartnerClient for HttpPartnerClient {
    async fn lookup_resource(&self, uri: &str) -> DomainResult<Option<PartnerResource>> {
        let raw = format!("{}/api/resources/lookup", self.base.trim_end_matches('/'));
        let url = Url::parse_with_params(&raw, &[("uri", uri)])
            .map_err(|e| DomainError::ValidationFailed(format!("invalid partner url {raw}: {e}")))?;

        let resp = self.http.get(url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(DomainError::NetworkError(format!(
                "partner lookup returned {status}: {body}"
            )));
        }

        let found: PartnerResourceResponse = resp.json().await?;
        Ok(Some(PartnerResource {
            uri: found.uri,
            name: found.name,
            owner_did: found.owner_did,
            source: PARTNER_API_SOURCE.to_string(),
        }))
    }
}
