//! Event stream adapters.
//!
//! Each protocol turns websocket messages into [`StreamItem`]s: the position
//! the consumer should resume after, plus whatever trigger events survived the
//! collection pre-filter. The consumer owns the socket and the reconnect loop.

pub mod car;
pub mod firehose;
pub mod jetstream;

pub use firehose::FirehoseProtocol;
pub use jetstream::JetstreamProtocol;

use std::collections::HashSet;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use regex::{RegexSet, RegexSetBuilder};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::domain::models::{ReconnectConfig, TriggerEvent, POST_COLLECTION};

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Invalid stream url: {0}")]
    InvalidUrl(String),
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Stream reported error {error}: {message}")]
    Remote { error: String, message: String },
}

impl From<tokio_tungstenite::tungstenite::Error> for StreamError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        StreamError::Transport(err.to_string())
    }
}

/// One consumed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamItem {
    pub position: i64,
    pub events: Vec<TriggerEvent>,
}

impl StreamItem {
    pub fn position_only(position: i64) -> Self {
        Self {
            position,
            events: Vec::new(),
        }
    }
}

/// A websocket protocol the consumer can speak.
pub trait StreamProtocol: Send + Sync {
    /// Cursor row name.
    fn service_name(&self) -> &'static str;

    fn subscribe_url(&self, filter: &StreamFilter, cursor: Option<i64>) -> Result<Url, StreamError>;

    /// `Ok(None)` for frames that carry no position (control frames, keepalives).
    fn decode(&self, message: Message, filter: &StreamFilter) -> Result<Option<StreamItem>, StreamError>;
}

/// Cheap checks applied before any trigger handler runs.
#[derive(Debug, Clone, Default)]
pub struct StreamFilter {
    collections: HashSet<String>,
    monitored_uris: HashSet<String>,
    phrases: Option<RegexSet>,
}

impl StreamFilter {
    pub fn new(
        collections: impl IntoIterator<Item = String>,
        monitored_uris: impl IntoIterator<Item = String>,
        phrases: &[String],
    ) -> Result<Self, regex::Error> {
        let mut collections: HashSet<String> = collections.into_iter().collect();
        collections.insert(POST_COLLECTION.to_string());

        let phrases = if phrases.is_empty() {
            None
        } else {
            Some(
                RegexSetBuilder::new(phrases.iter().map(|p| regex::escape(p)))
                    .case_insensitive(true)
                    .build()?,
            )
        };

        Ok(Self {
            collections,
            monitored_uris: monitored_uris.into_iter().collect(),
            phrases,
        })
    }

    pub fn wants_collection(&self, collection: &str) -> bool {
        self.collections.contains(collection)
    }

    pub fn collections(&self) -> impl Iterator<Item = &str> {
        self.collections.iter().map(String::as_str)
    }

    pub fn is_monitored(&self, uri: &str) -> bool {
        self.monitored_uris.contains(uri)
    }

    /// Whether any handler could possibly care about this event.
    pub fn admits(&self, event: &TriggerEvent) -> bool {
        match event {
            TriggerEvent::Post(post) => {
                let replies_to_monitored = [&post.reply_parent, &post.reply_root]
                    .into_iter()
                    .flatten()
                    .any(|uri| self.is_monitored(uri));
                let has_phrase = self.phrases.as_ref().is_some_and(|set| set.is_match(&post.text));
                replies_to_monitored || has_phrase
            }
            TriggerEvent::Record(record) => {
                self.wants_collection(&record.collection)
                    && (self.monitored_uris.is_empty() || references_any(&record.record, &self.monitored_uris))
            }
            TriggerEvent::Tick { .. } => true,
        }
    }
}

/// Whether a record value contains any of `uris` as a string leaf.
pub fn references_any(value: &serde_json::Value, uris: &HashSet<String>) -> bool {
    match value {
        serde_json::Value::String(s) => uris.contains(s),
        serde_json::Value::Array(items) => items.iter().any(|v| references_any(v, uris)),
        serde_json::Value::Object(map) => map.values().any(|v| references_any(v, uris)),
        _ => false,
    }
}

/// Randomized exponential reconnect delays, capped.
pub struct ReconnectPolicy {
    backoff: ExponentialBackoff,
    max: Duration,
}

impl ReconnectPolicy {
    pub fn new(config: &ReconnectConfig) -> Self {
        let max = Duration::from_millis(config.max_backoff_ms);
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(config.initial_backoff_ms))
            .with_max_interval(max)
            .with_randomization_factor(config.jitter)
            .with_multiplier(2.0)
            .with_max_elapsed_time(None)
            .build();
        Self { backoff, max }
    }

    pub fn next_delay(&mut self) -> Duration {
        self.backoff.next_backoff().unwrap_or(self.max)
    }

    /// Call after a connection delivered at least one frame.
    pub fn reset(&mut self) {
        self.backoff.reset();
    }
}
