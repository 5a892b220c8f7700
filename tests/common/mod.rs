//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use questline::adapters::network::MockNetworkClient;
use questline::adapters::sqlite::{create_migrated_test_pool, SqliteDomainStore};
use questline::domain::models::{Config, PostEvent, Quest, TriggerConfig, TriggerEvent};
use questline::services::{Engine, ImportMode, ProcessRequest};

pub const QUEST_POST: &str = "at://did:plc:quest/app.bsky.feed.post/3kquest";

pub struct TestEngine {
    pub engine: Engine,
    pub store: SqliteDomainStore,
    pub network: MockNetworkClient,
}

impl TestEngine {
    pub async fn new(network: MockNetworkClient) -> Self {
        let pool = create_migrated_test_pool().await.expect("test pool");
        let engine = Engine::with_clients(Config::default(), pool.clone(), Arc::new(network.clone()), None);
        Self {
            engine,
            store: SqliteDomainStore::new(pool),
            network,
        }
    }

    /// Import quests and load them into the live snapshot.
    pub async fn with_quests(self, quests: Vec<Quest>) -> Self {
        for quest in quests {
            self.engine
                .registry()
                .import(quest, ImportMode::CreateOnly)
                .await
                .expect("import quest");
        }
        self.engine.dispatcher().snapshots().reload().await.expect("reload");
        self
    }
}

pub fn reply_quest(title: &str) -> Quest {
    Quest::new(
        title,
        TriggerConfig::ReplyToPost {
            post_uri: QUEST_POST.to_string(),
            known_authors_only: false,
        },
    )
}

pub fn request(did: &str, rkey: &str, text: &str) -> ProcessRequest {
    ProcessRequest {
        reply_uri: format!("at://{did}/app.bsky.feed.post/{rkey}"),
        author_did: did.to_string(),
        author_handle: format!("{}.bsky.social", did.rsplit(':').next().unwrap_or("user")),
        text: text.to_string(),
        created_at: Some("2026-03-01T12:00:00Z".to_string()),
        quest_uri: QUEST_POST.to_string(),
    }
}

/// A top-level post as either stream would decode it.
pub fn post(did: &str, rkey: &str, text: &str) -> TriggerEvent {
    TriggerEvent::Post(PostEvent {
        uri: format!("at://{did}/app.bsky.feed.post/{rkey}"),
        cid: Some(format!("bafy{rkey}")),
        author_did: did.to_string(),
        author_handle: None,
        text: text.to_string(),
        created_at: "2026-03-01T12:00:00Z".to_string(),
        reply_parent: None,
        reply_root: None,
    })
}
