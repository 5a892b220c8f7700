//! Jetstream JSON event stream.

use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use super::{StreamError, StreamFilter, StreamItem, StreamProtocol};
use crate::domain::models::{PostEvent, RecordEvent, TriggerEvent, POST_COLLECTION};

pub const JETSTREAM_SERVICE: &str = "jetstream";

#[derive(Debug, Deserialize)]
struct JetstreamEvent {
    did: String,
    time_us: i64,
    kind: String,
    #[serde(default)]
    commit: Option<JetstreamCommit>,
}

#[derive(Debug, Deserialize)]
struct JetstreamCommit {
    operation: String,
    collection: String,
    rkey: String,
    #[serde(default)]
    cid: Option<String>,
    #[serde(default)]
    record: Option<serde_json::Value>,
}

pub struct JetstreamProtocol {
    endpoint: String,
}

impl JetstreamProtocol {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    pub fn decode_text(&self, text: &str, filter: &StreamFilter) -> Result<Option<StreamItem>, StreamError> {
        let event: JetstreamEvent =
            serde_json::from_str(text).map_err(|e| StreamError::Decode(format!("jetstream event: {e}")))?;
        let mut item = StreamItem::position_only(event.time_us);

        let Some(commit) = event.commit.filter(|_| event.kind == "commit") else {
            return Ok(Some(item));
        };
        if commit.operation != "create" || !filter.wants_collection(&commit.collection) {
            return Ok(Some(item));
        }
        let Some(record) = commit.record else {
            return Ok(Some(item));
        };

        let trigger = if commit.collection == POST_COLLECTION {
            PostEvent::from_record(&event.did, &commit.rkey, commit.cid, &record).map(TriggerEvent::Post)
        } else {
            Some(TriggerEvent::Record(RecordEvent {
                did: event.did,
                collection: commit.collection,
                rkey: commit.rkey,
                cid: commit.cid,
                record,
            }))
        };
        item.events.extend(trigger);
        Ok(Some(item))
    }
}

impl StreamProtocol for JetstreamProtocol {
    fn service_name(&self) -> &'static str {
        JETSTREAM_SERVICE
    }

    fn subscribe_url(&self, filter: &StreamFilter, cursor: Option<i64>) -> Result<Url, StreamError> {
        let mut url = Url::parse(&self.endpoint).map_err(|e| StreamError::InvalidUrl(format!("{}: {e}", self.endpoint)))?;
        {
            let mut query = url.query_pairs_mut();
            let mut collections: Vec<&str> = filter.collections().collect();
            collections.sort_unstable();
            for collection in collections {
                query.append_pair("wantedCollections", collection);
            }
            if let Some(cursor) = cursor {
                query.append_pair("cursor", &cursor.to_string());
            }
        }
        Ok(url)
    }

    fn decode(&self, message: Message, filter: &StreamFilter) -> Result<Option<StreamItem>, StreamError> {
        match message {
            Message::Text(text) => self.decode_text(&text, filter),
            _ => Ok(None),
        }
    }
}
