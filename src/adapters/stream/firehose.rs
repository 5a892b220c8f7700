//! Repository commit firehose (`com.atproto.sync.subscribeRepos`).
//!
//! Each binary frame is two concatenated DAG-CBOR values: a header
//! `{op, t}` and a body. Only `#commit` bodies carry records; their ops are
//! checked against the watched collections before the CAR block is touched.

use std::io::Cursor;

use ciborium::Value as Cbor;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use super::car::{decode_block, find_block, link_to_cid, map_get};
use super::{StreamError, StreamFilter, StreamItem, StreamProtocol};
use crate::domain::models::{PostEvent, RecordEvent, TriggerEvent, POST_COLLECTION};

pub const FIREHOSE_SERVICE: &str = "firehose";

pub struct FirehoseProtocol {
    endpoint: String,
}

impl FirehoseProtocol {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    /// Decode one binary frame.
    pub fn decode_frame(&self, bytes: &[u8], filter: &StreamFilter) -> Result<Option<StreamItem>, StreamError> {
        let mut reader = Cursor::new(bytes);
        let header: Cbor =
            ciborium::de::from_reader(&mut reader).map_err(|e| StreamError::Decode(format!("header: {e}")))?;
        let body: Cbor =
            ciborium::de::from_reader(&mut reader).map_err(|e| StreamError::Decode(format!("body: {e}")))?;

        let op = map_get(&header, "op").and_then(as_i64).unwrap_or(0);
        if op == -1 {
            return Err(StreamError::Remote {
                error: text_field(&body, "error").unwrap_or("unknown").to_string(),
                message: text_field(&body, "message").unwrap_or_default().to_string(),
            });
        }

        let frame_type = map_get(&header, "t").and_then(Cbor::as_text).unwrap_or_default();
        let seq = map_get(&body, "seq").and_then(as_i64);

        match frame_type {
            "#commit" => {
                let seq = seq.ok_or_else(|| StreamError::Decode("commit without seq".to_string()))?;
                Ok(Some(StreamItem {
                    position: seq,
                    events: commit_events(&body, filter)?,
                }))
            }
            "#info" => {
                tracing::info!(
                    name = text_field(&body, "name").unwrap_or_default(),
                    message = text_field(&body, "message").unwrap_or_default(),
                    "firehose info frame"
                );
                Ok(None)
            }
            _ => Ok(seq.map(StreamItem::position_only)),
        }
    }
}

fn as_i64(value: &Cbor) -> Option<i64> {
    value.as_integer().and_then(|i| i64::try_from(i).ok())
}

fn text_field<'a>(value: &'a Cbor, key: &str) -> Option<&'a str> {
    map_get(value, key).and_then(Cbor::as_text)
}

fn commit_events(body: &Cbor, filter: &StreamFilter) -> Result<Vec<TriggerEvent>, StreamError> {
    if map_get(body, "tooBig").and_then(Cbor::as_bool).unwrap_or(false) {
        return Ok(Vec::new());
    }
    let Some(repo) = text_field(body, "repo") else {
        return Ok(Vec::new());
    };
    let ops = map_get(body, "ops").and_then(Cbor::as_array).map_or(&[][..], Vec::as_slice);

    let mut events = Vec::new();
    for op in ops {
        if text_field(op, "action") != Some("create") {
            continue;
        }
        let Some((collection, rkey)) = text_field(op, "path").and_then(|p| p.split_once('/')) else {
            continue;
        };
        if !filter.wants_collection(collection) {
            continue;
        }
        let Some(cid) = map_get(op, "cid").and_then(link_to_cid) else {
            continue;
        };

        let blocks = map_get(body, "blocks")
            .and_then(Cbor::as_bytes)
            .ok_or_else(|| StreamError::Decode("commit without blocks".to_string()))?;
        let Some(block) = find_block(blocks, &cid)? else {
            tracing::debug!(repo, path = %format!("{collection}/{rkey}"), "block missing from commit");
            continue;
        };
        let record = decode_block(block)?;

        let event = if collection == POST_COLLECTION {
            PostEvent::from_record(repo, rkey, Some(cid.to_string()), &record).map(TriggerEvent::Post)
        } else {
            Some(TriggerEvent::Record(RecordEvent {
                did: repo.to_string(),
                collection: collection.to_string(),
                rkey: rkey.to_string(),
                cid: Some(cid.to_string()),
                record,
            }))
        };
        events.extend(event);
    }
    Ok(events)
}

impl StreamProtocol for FirehoseProtocol {
    fn service_name(&self) -> &'static str {
        FIREHOSE_SERVICE
    }

    fn subscribe_url(&self, _filter: &StreamFilter, cursor: Option<i64>) -> Result<Url, StreamError> {
        let mut url = Url::parse(&self.endpoint).map_err(|e| StreamError::InvalidUrl(format!("{}: {e}", self.endpoint)))?;
        if let Some(cursor) = cursor {
            url.query_pairs_mut().append_pair("cursor", &cursor.to_string());
        }
        Ok(url)
    }

    fn decode(&self, message: Message, filter: &StreamFilter) -> Result<Option<StreamItem>, StreamError> {
        match message {
            Message::Binary(bytes) => self.decode_frame(&bytes, filter),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::stream::car::test_support::{build_car, cbor_bytes, fake_cid, link};

    fn text(s: &str) -> Cbor {
        Cbor::Text(s.to_string())
    }

    fn frame(header: Cbor, body: Cbor) -> Vec<u8> {
        let mut out = cbor_bytes(&header);
        out.extend(cbor_bytes(&body));
        out
    }

    fn commit_frame(seq: i64, ops: Vec<(&str, &str, u8)>, blocks: Vec<(u8, Vec<u8>)>) -> Vec<u8> {
        let car = build_car(
            &blocks
                .into_iter()
                .map(|(seed, data)| (fake_cid(seed), data))
                .collect::<Vec<_>>(),
        );
        let ops = ops
            .into_iter()
            .map(|(action, path, seed)| {
                Cbor::Map(vec![
                    (text("action"), text(action)),
                    (text("path"), text(path)),
                    (text("cid"), link(&fake_cid(seed))),
                ])
            })
            .collect();
        frame(
            Cbor::Map(vec![(text("op"), Cbor::Integer(1u8.into())), (text("t"), text("#commit"))]),
            Cbor::Map(vec![
                (text("seq"), Cbor::Integer(seq.into())),
                (text("repo"), text("did:plc:author")),
                (text("ops"), Cbor::Array(ops)),
                (text("blocks"), Cbor::Bytes(car)),
            ]),
        )
    }

    fn post_block(body: &str) -> Vec<u8> {
        cbor_bytes(&Cbor::Map(vec![
            (text("$type"), text(POST_COLLECTION)),
            (text("text"), text(body)),
            (text("createdAt"), text("2026-01-01T00:00:00Z")),
        ]))
    }

    #[test]
    fn test_commit_with_post_is_decoded() {
        let protocol = FirehoseProtocol::new("wss://relay.test/xrpc/com.atproto.sync.subscribeRepos");
        let watching_posts = StreamFilter::new(Vec::new(), Vec::new(), &[]).unwrap();
        let bytes = commit_frame(
            77,
            vec![("create", "app.bsky.feed.post/3kabc", 1)],
            vec![(1, post_block("#FlawedCenter rocks"))],
        );

        let item = protocol.decode_frame(&bytes, &watching_posts).unwrap().unwrap();
        assert_eq!(item.position, 77);
        match &item.events[..] {
            [TriggerEvent::Post(post)] => {
                assert_eq!(post.uri, "at://did:plc:author/app.bsky.feed.post/3kabc");
                assert_eq!(post.text, "#FlawedCenter rocks");
                assert_eq!(post.cid, Some(fake_cid(1).to_string()));
            }
            other => panic!("unexpected events {other:?}"),
        }

        let watching_nothing = StreamFilter::default();
        assert!(protocol.decode_frame(&bytes, &watching_nothing).unwrap().unwrap().events.is_empty());
    }

    #[test]
    fn test_unwatched_collection_is_skipped_before_decoding() {
        let protocol = FirehoseProtocol::new("wss://relay.test");
        let filter = StreamFilter::new(Vec::new(), Vec::new(), &[]).unwrap();
        // Block 2 is not valid CBOR; decoding it would fail the frame.
        let bytes = commit_frame(
            5,
            vec![("create", "app.bsky.feed.like/1", 2), ("delete", "app.bsky.feed.post/2", 1)],
            vec![(1, post_block("x")), (2, vec![0xff, 0xff])],
        );
        let item = protocol.decode_frame(&bytes, &filter).unwrap().unwrap();
        assert_eq!(item.position, 5);
        assert!(item.events.is_empty());
    }

    #[test]
    fn test_error_and_info_frames() {
        let protocol = FirehoseProtocol::new("wss://relay.test");
        let filter = StreamFilter::default();

        let err = frame(
            Cbor::Map(vec![(text("op"), Cbor::Integer((-1i64).into()))]),
            Cbor::Map(vec![(text("error"), text("FutureCursor")), (text("message"), text("too new"))]),
        );
        assert!(matches!(
            protocol.decode_frame(&err, &filter),
            Err(StreamError::Remote { error, .. }) if error == "FutureCursor"
        ));

        let info = frame(
            Cbor::Map(vec![(text("op"), Cbor::Integer(1u8.into())), (text("t"), text("#info"))]),
            Cbor::Map(vec![(text("name"), text("OutdatedCursor"))]),
        );
        assert_eq!(protocol.decode_frame(&info, &filter).unwrap(), None);

        let identity = frame(
            Cbor::Map(vec![(text("op"), Cbor::Integer(1u8.into())), (text("t"), text("#identity"))]),
            Cbor::Map(vec![(text("seq"), Cbor::Integer(9u8.into())), (text("did"), text("did:plc:x"))]),
        );
        assert_eq!(protocol.decode_frame(&identity, &filter).unwrap(), Some(StreamItem::position_only(9)));
    }

    #[test]
    fn test_subscribe_url_carries_cursor() {
        let protocol = FirehoseProtocol::new("wss://relay.test/xrpc/com.atproto.sync.subscribeRepos");
        let url = protocol.subscribe_url(&StreamFilter::default(), Some(1234)).unwrap();
        assert_eq!(url.as_str(), "wss://relay.test/xrpc/com.atproto.sync.subscribeRepos?cursor=1234");
    }
}
