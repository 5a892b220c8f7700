//! XRPC request and response payloads.
//!
//! These map to the identity network's lexicon JSON shapes and stay internal
//! to the network adapter.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionRequest<'a> {
    pub identifier: &'a str,
    pub password: &'a str,
}

/// An authenticated app-password session.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_jwt: String,
    pub did: String,
    pub handle: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateRecordRequest<'a> {
    pub repo: &'a str,
    pub collection: &'a str,
    pub record: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRecordResponse {
    pub uri: String,
    pub cid: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetRecordResponse {
    pub uri: String,
    #[serde(default)]
    pub cid: Option<String>,
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActorRef {
    pub did: String,
    pub handle: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostView {
    pub uri: String,
    pub cid: String,
    pub author: ActorRef,
    pub record: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetPostsResponse {
    pub posts: Vec<PostView>,
}

/// One node of a post thread. Blocked and missing posts carry no `post`.
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadNode {
    #[serde(default)]
    pub post: Option<PostView>,
    #[serde(default)]
    pub replies: Vec<ThreadNode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetPostThreadResponse {
    pub thread: ThreadNode,
}

/// XRPC error body.
#[derive(Debug, Clone, Deserialize)]
pub struct XrpcError {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidService {
    pub id: String,
    #[serde(default, rename = "type")]
    pub service_type: Option<String>,
    pub service_endpoint: String,
}

/// The subset of a DID document needed to locate a PDS.
#[derive(Debug, Clone, Deserialize)]
pub struct DidDocument {
    #[serde(default)]
    pub service: Vec<DidService>,
}

impl DidDocument {
    pub fn pds_endpoint(&self) -> Option<&str> {
        self.service
            .iter()
            .find(|s| s.id.ends_with("#atproto_pds"))
            .map(|s| s.service_endpoint.as_str())
    }
}

/// Response of the partner service's resource lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct PartnerResourceResponse {
    pub uri: String,
    #[serde(default, alias = "title")]
    pub name: Option<String>,
    #[serde(default, alias = "owner", alias = "ownerDid")]
    pub owner_did: Option<String>,
}
