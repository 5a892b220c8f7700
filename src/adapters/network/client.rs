//! XRPC client for the identity network.
//!
//! Reads go to the public appview, writes to the automation account's PDS
//! through a cached app-password session. All requests share one
//! `governor` rate limiter.

use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde_json::json;
use tokio::sync::Mutex;
use url::Url;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    did_of_uri, Author, NetworkConfig, Profile, ReplyEvent, ReplyRef, StrongRef, POST_COLLECTION,
};
use crate::domain::ports::{NetworkClient, ThreadReplies, ThreadStats};

use super::models::{
    CreateRecordRequest, CreateRecordResponse, CreateSessionRequest, DidDocument,
    GetPostThreadResponse, GetPostsResponse, GetRecordResponse, Session, ThreadNode, XrpcError,
};

const LIKE_COLLECTION: &str = "app.bsky.feed.like";

/// Reqwest-backed [`NetworkClient`].
pub struct XrpcClient {
    http: Client,
    config: NetworkConfig,
    limiter: Arc<DefaultDirectRateLimiter>,
    session: Mutex<Option<Session>>,
}

impl XrpcClient {
    pub fn new(config: NetworkConfig) -> DomainResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(concat!("questline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DomainError::NetworkError(format!("failed to build http client: {e}")))?;
        let rps = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            http,
            config,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
            session: Mutex::new(None),
        })
    }

    fn xrpc_url(base: &str, method: &str, params: &[(&str, &str)]) -> DomainResult<Url> {
        let raw = format!("{}/xrpc/{}", base.trim_end_matches('/'), method);
        Url::parse_with_params(&raw, params)
            .map_err(|e| DomainError::ValidationFailed(format!("invalid url {raw}: {e}")))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> DomainResult<Option<T>> {
        self.limiter.until_ready().await;
        let resp = self.http.get(url.clone()).send().await?;
        let status = resp.status();

        if status == StatusCode::NOT_FOUND || status == StatusCode::BAD_REQUEST {
            let body: Option<XrpcError> = resp.json().await.ok();
            tracing::debug!(
                url = %url,
                status = status.as_u16(),
                error = body.as_ref().and_then(|b| b.error.as_deref()).unwrap_or(""),
                "xrpc lookup returned nothing"
            );
            return Ok(None);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DomainError::NetworkError(format!("GET {url} returned {status}: {body}")));
        }
        Ok(Some(resp.json::<T>().await?))
    }

    async fn session(&self) -> DomainResult<Session> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }

        let (Some(identifier), Some(password)) =
            (self.config.handle.as_deref(), self.config.app_password.as_deref())
        else {
            return Err(DomainError::ValidationFailed(
                "network.handle and network.app_password are required for writes".to_string(),
            ));
        };

        let url = Self::xrpc_url(&self.config.pds_url, "com.atproto.server.createSession", &[])?;
        self.limiter.until_ready().await;
        let resp = self
            .http
            .post(url)
            .json(&CreateSessionRequest { identifier, password })
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(DomainError::NetworkError(format!("createSession returned {status}: {body}")));
        }

        let session: Session = resp.json().await?;
        tracing::info!(did = %session.did, handle = %session.handle, "session created");
        *guard = Some(session.clone());
        Ok(session)
    }

    async fn create_record(&self, collection: &str, record: serde_json::Value) -> DomainResult<StrongRef> {
        let session = self.session().await?;
        let url = Self::xrpc_url(&self.config.pds_url, "com.atproto.repo.createRecord", &[])?;

        self.limiter.until_ready().await;
        let resp = self
            .http
            .post(url)
            .bearer_auth(&session.access_jwt)
            .json(&CreateRecordRequest {
                repo: &session.did,
                collection,
                record,
            })
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            // Expired token; the next write creates a fresh session.
            *self.session.lock().await = None;
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DomainError::NetworkError(format!("createRecord returned {status}: {body}")));
        }

        let created: CreateRecordResponse = resp.json().await?;
        Ok(StrongRef {
            uri: created.uri,
            cid: created.cid,
        })
    }

    async fn resolve_cid(&self, uri: &str) -> DomainResult<Option<String>> {
        let url = Self::xrpc_url(&self.config.appview_url, "app.bsky.feed.getPosts", &[("uris", uri)])?;
        let posts: Option<GetPostsResponse> = self.get_json(url).await?;
        Ok(posts.and_then(|p| p.posts.into_iter().find(|post| post.uri == uri)).map(|p| p.cid))
    }

    /// Locate the PDS hosting `did`, falling back to the configured PDS.
    pub async fn resolve_pds(&self, did: &str) -> DomainResult<String> {
        let doc_url = if did.starts_with("did:plc:") {
            format!("{}/{}", self.config.plc_url.trim_end_matches('/'), did)
        } else if let Some(host) = did.strip_prefix("did:web:") {
            format!("https://{host}/.well-known/did.json")
        } else {
            return Ok(self.config.pds_url.clone());
        };

        let url = Url::parse(&doc_url)
            .map_err(|e| DomainError::ValidationFailed(format!("invalid url {doc_url}: {e}")))?;
        let doc: Option<DidDocument> = self.get_json(url).await?;
        Ok(doc
            .as_ref()
            .and_then(DidDocument::pds_endpoint)
            .map_or_else(|| self.config.pds_url.clone(), str::to_string))
    }
}

/// Walk a thread breadth-first up to `max_depth`, skipping the root post.
pub fn flatten_thread(root: &ThreadNode, max_depth: u32) -> ThreadReplies {
    let mut replies = Vec::new();
    let mut authors: Vec<Author> = Vec::new();
    let mut seen_uris = HashSet::new();
    let mut seen_authors = HashSet::new();
    let mut stats = ThreadStats::default();

    let mut frontier: Vec<(&ThreadNode, u32)> = root.replies.iter().map(|n| (n, 1)).collect();
    while !frontier.is_empty() {
        let mut next = Vec::new();
        for (node, depth) in frontier {
            if depth > max_depth {
                continue;
            }
            if let Some(post) = &node.post {
                stats.fetched += 1;
                stats.max_depth_seen = stats.max_depth_seen.max(depth);
                if seen_uris.insert(post.uri.clone()) {
                    let text = post.record.get("text").and_then(|t| t.as_str()).unwrap_or_default();
                    let created_at = post
                        .record
                        .get("createdAt")
                        .and_then(|t| t.as_str())
                        .unwrap_or_default();
                    let mut reply =
                        ReplyEvent::new(&post.uri, &post.author.did, &post.author.handle, text, created_at);
                    reply.cid = Some(post.cid.clone());
                    replies.push(reply);
                    if seen_authors.insert(post.author.did.clone()) {
                        authors.push(Author {
                            did: post.author.did.clone(),
                            handle: post.author.handle.clone(),
                        });
                    }
                } else {
                    stats.duplicates += 1;
                }
            }
            next.extend(node.replies.iter().map(|n| (n, depth + 1)));
        }
        frontier = next;
    }

    ThreadReplies { replies, authors, stats }
}

fn parse_at_uri(uri: &str) -> DomainResult<(&str, &str, &str)> {
    let invalid = || DomainError::ValidationFailed(format!("not a record uri: {uri}"));
    let rest = uri.strip_prefix("at://").ok_or_else(invalid)?;
    let mut parts = rest.splitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(repo), Some(collection), Some(rkey)) if !repo.is_empty() && !rkey.is_empty() => {
            Ok((repo, collection, rkey))
        }
        _ => Err(invalid()),
    }
}

#[async_trait]
impl NetworkClient for XrpcClient {
    async fn resolve_profile(&self, did: &str) -> DomainResult<Option<Profile>> {
        let url = Self::xrpc_url(&self.config.appview_url, "app.bsky.actor.getProfile", &[("actor", did)])?;
        self.get_json(url).await
    }

    async fn create_post(&self, text: &str, reply_to: Option<&ReplyRef>) -> DomainResult<StrongRef> {
        let mut record = json!({
            "$type": POST_COLLECTION,
            "text": text,
            "createdAt": Utc::now().to_rfc3339(),
        });
        if let Some(reply) = reply_to {
            record["reply"] = serde_json::to_value(reply)?;
        }
        self.create_record(POST_COLLECTION, record).await
    }

    async fn create_like(&self, uri: &str, cid: Option<&str>) -> DomainResult<()> {
        let cid = match cid {
            Some(cid) => cid.to_string(),
            None => self
                .resolve_cid(uri)
                .await?
                .ok_or_else(|| DomainError::NetworkError(format!("post not found: {uri}")))?,
        };
        let record = json!({
            "$type": LIKE_COLLECTION,
            "subject": { "uri": uri, "cid": cid },
            "createdAt": Utc::now().to_rfc3339(),
        });
        self.create_record(LIKE_COLLECTION, record).await.map(|_| ())
    }

    /// `getPostThread` has no cursor; one request bounded by `depth` returns
    /// the whole tree the appview will serve.
    async fn get_thread_replies(&self, uri: &str, max_depth: u32) -> DomainResult<ThreadReplies> {
        let depth = max_depth.to_string();
        let url = Self::xrpc_url(
            &self.config.appview_url,
            "app.bsky.feed.getPostThread",
            &[("uri", uri), ("depth", &depth), ("parentHeight", "0")],
        )?;
        let thread: Option<GetPostThreadResponse> = self.get_json(url).await?;
        Ok(thread.map(|t| flatten_thread(&t.thread, max_depth)).unwrap_or_default())
    }

    async fn get_record(&self, uri: &str) -> DomainResult<Option<serde_json::Value>> {
        let (repo, collection, rkey) = parse_at_uri(uri)?;
        let pds = match did_of_uri(uri) {
            Some(did) => self.resolve_pds(did).await?,
            None => self.config.pds_url.clone(),
        };
        let url = Self::xrpc_url(
            &pds,
            "com.atproto.repo.getRecord",
            &[("repo", repo), ("collection", collection), ("rkey", rkey)],
        )?;
        let record: Option<GetRecordResponse> = self.get_json(url).await?;
        Ok(record.map(|r| r.value))
    }
}
