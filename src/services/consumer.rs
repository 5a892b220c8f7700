//! Stream consumer service: one receive loop per protocol.
//!
//! The receive loop alone owns the cursor. It decodes frames, drops what the
//! snapshot filter rejects, submits the rest to the worker pool and advances
//! the cursor whether or not the submitted work later succeeds.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::adapters::stream::{ReconnectPolicy, StreamError, StreamProtocol};
use crate::domain::errors::DomainResult;
use crate::domain::models::{ReconnectConfig, WorkerConfig};
use crate::services::cursor_store::CursorStore;
use crate::services::dispatcher::{QuestDispatcher, WorkerPool};
use crate::services::shutdown::Shutdown;
use crate::services::stats::StatsSnapshot;

/// Runtime knobs for a consumer.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub workers: WorkerConfig,
    pub reconnect: ReconnectConfig,
    pub stats_interval: Duration,
}

pub struct StreamConsumer<P: StreamProtocol> {
    protocol: P,
    dispatcher: Arc<QuestDispatcher>,
    cursor: CursorStore,
    reconnect: ReconnectPolicy,
    settings: ConsumerSettings,
    shutdown: Shutdown,
}

impl<P: StreamProtocol> StreamConsumer<P> {
    pub fn new(
        protocol: P,
        dispatcher: Arc<QuestDispatcher>,
        cursor: CursorStore,
        settings: ConsumerSettings,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            reconnect: ReconnectPolicy::new(&settings.reconnect),
            protocol,
            dispatcher,
            cursor,
            settings,
            shutdown,
        }
    }

    /// Consume until shutdown, then drain workers and flush the cursor.
    pub async fn run(mut self) -> DomainResult<StatsSnapshot> {
        let service = self.protocol.service_name();
        let resume = self.cursor.load().await?;
        tracing::info!(service, cursor = ?resume, "consumer starting");

        let pool = WorkerPool::spawn(
            Arc::clone(&self.dispatcher),
            self.settings.workers.pool_size,
            self.settings.workers.queue_capacity,
        );

        while !self.shutdown.is_triggered() {
            match self.connect_and_consume(&pool).await {
                Ok(()) if self.shutdown.is_triggered() => break,
                Ok(()) => tracing::info!(service, "stream closed by remote"),
                Err(e) => {
                    let reconnects = self.dispatcher.stats().reconnected();
                    tracing::warn!(service, reconnects, error = %e, "stream error, reconnecting");
                    if let Err(db) = self.cursor.record_error(&e.to_string()).await {
                        tracing::warn!(service, error = %db, "failed to record stream error");
                    }
                }
            }

            let delay = self.reconnect.next_delay();
            tracing::debug!(service, delay_ms = delay.as_millis() as u64, "waiting before reconnect");
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown.wait() => break,
            }
        }

        let backlog = pool.backlog();
        let drained = pool
            .shutdown(Duration::from_secs(self.settings.workers.drain_timeout_secs))
            .await;
        if !drained {
            tracing::warn!(service, backlog, "in-flight events abandoned at shutdown");
        }
        self.cursor.finalize().await?;

        let stats = self.dispatcher.stats().snapshot();
        tracing::info!(service, cursor = ?self.cursor.position(), ?stats, "consumer stopped");
        Ok(stats)
    }

    async fn connect_and_consume(&mut self, pool: &WorkerPool) -> Result<(), StreamError> {
        let service = self.protocol.service_name();
        let url = {
            let snapshot = self.dispatcher.snapshots().load();
            self.protocol.subscribe_url(&snapshot.filter, self.cursor.position())?
        };
        tracing::info!(service, url = %url, "connecting");

        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;
        let (mut write, mut read) = ws.split();
        let mut stats_tick = tokio::time::interval(self.settings.stats_interval);
        stats_tick.tick().await;
        let mut delivered = false;
        let shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                () = shutdown.wait() => {
                    if let Err(e) = write.close().await {
                        tracing::debug!(service, error = %e, "websocket close failed");
                    }
                    return Ok(());
                }
                _ = stats_tick.tick() => {
                    let stats = self.dispatcher.stats().snapshot();
                    tracing::info!(
                        service,
                        consumed = stats.events_consumed,
                        relevant = stats.relevant,
                        matches = stats.matches,
                        fired = stats.triggers_fired,
                        errors = stats.errors,
                        reconnects = stats.reconnects,
                        backlog = pool.backlog(),
                        "stream stats"
                    );
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(service, ?frame, "close frame received");
                        return Ok(());
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(message)) => {
                        if !delivered {
                            delivered = true;
                            self.reconnect.reset();
                        }
                        self.handle_message(message, pool).await?;
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(StreamError::Transport("stream ended".to_string())),
                }
            }
        }
    }

    async fn handle_message(&mut self, message: Message, pool: &WorkerPool) -> Result<(), StreamError> {
        let service = self.protocol.service_name();
        let snapshot = self.dispatcher.snapshots().load();
        let item = match self.protocol.decode(message, &snapshot.filter) {
            Ok(Some(item)) => item,
            Ok(None) => return Ok(()),
            Err(e @ StreamError::Remote { .. }) => return Err(e),
            Err(e) => {
                tracing::warn!(service, error = %e, "frame skipped");
                return Ok(());
            }
        };

        let stats = self.dispatcher.stats();
        stats.consumed();
        for event in item.events {
            if snapshot.is_relevant(&event) {
                stats.relevant();
                pool.submit(event).await;
            }
        }

        if let Err(e) = self.cursor.advance(item.position, false).await {
            tracing::warn!(service, position = item.position, error = %e, "cursor flush failed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::network::MockNetworkClient;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteCursorRepository, SqliteQuestRepository};
    use crate::adapters::stream::JetstreamProtocol;
    use crate::domain::models::{Command, Quest, TriggerConfig};
    use crate::domain::ports::{CursorRepository, DomainStore};
    use crate::services::quest_registry::{ImportMode, QuestRegistry};
    use crate::services::triggers::test_support::deps_with;
    use tokio::net::TcpListener;

    const QUEST_POST: &str = "at://did:plc:quest/app.bsky.feed.post/1";

    fn reply_frame(did: &str, time_us: i64) -> String {
        serde_json::json!({
            "did": did,
            "time_us": time_us,
            "kind": "commit",
            "commit": {
                "operation": "create",
                "collection": "app.bsky.feed.post",
                "rkey": format!("r{time_us}"),
                "cid": "bafyreply",
                "record": {
                    "text": "hello",
                    "createdAt": "2026-01-01T00:00:00Z",
                    "reply": {
                        "parent": {"uri": QUEST_POST, "cid": "bafyq"},
                        "root": {"uri": QUEST_POST, "cid": "bafyq"}
                    }
                }
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_consumes_frames_and_flushes_cursor_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            for (i, did) in ["did:plc:a", "did:plc:b", "did:plc:c"].iter().enumerate() {
                ws.send(Message::Text(reply_frame(did, 100 + i as i64))).await.unwrap();
            }
            // Hold the socket open until the client goes away.
            while let Some(Ok(_)) = ws.next().await {}
        });

        let pool = create_migrated_test_pool().await.unwrap();
        let registry = Arc::new(QuestRegistry::new(Arc::new(SqliteQuestRepository::new(pool.clone()))));
        registry
            .import(
                Quest::new(
                    "shells",
                    TriggerConfig::ReplyToPost {
                        post_uri: QUEST_POST.into(),
                        known_authors_only: false,
                    },
                )
                .with_command(Command::new("grant-collectible", vec!["shell".into()])),
                ImportMode::CreateOnly,
            )
            .await
            .unwrap();

        let deps = deps_with(MockNetworkClient::new()).await;
        let store = Arc::clone(&deps.store);
        let dispatcher = Arc::new(QuestDispatcher::assemble(Arc::clone(&registry), deps, vec![]));
        dispatcher.snapshots().reload().await.unwrap();

        let cursors = Arc::new(SqliteCursorRepository::new(pool));
        let cursor = CursorStore::new(cursors.clone(), "jetstream", 100);
        let shutdown = Shutdown::new();
        let consumer = StreamConsumer::new(
            JetstreamProtocol::new(format!("ws://{addr}/subscribe")),
            Arc::clone(&dispatcher),
            cursor,
            ConsumerSettings {
                workers: WorkerConfig::default(),
                reconnect: ReconnectConfig::default(),
                stats_interval: Duration::from_secs(60),
            },
            shutdown.clone(),
        );
        let handle = tokio::spawn(consumer.run());

        for _ in 0..100 {
            if dispatcher.stats().snapshot().events_consumed == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        shutdown.trigger();
        let stats = handle.await.unwrap().unwrap();
        server.abort();

        assert_eq!(stats.events_consumed, 3);
        assert_eq!(stats.relevant, 3);
        let record = cursors.load("jetstream").await.unwrap().unwrap();
        assert_eq!(record.position, 102);
        assert_eq!(record.events_processed, 3);
        for did in ["did:plc:a", "did:plc:b", "did:plc:c"] {
            assert!(store.has_collectible(did, "shell").await.unwrap());
        }
    }
}
