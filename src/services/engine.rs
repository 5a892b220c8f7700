//! Composition root for the consumer and poll services.

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::adapters::network::{HttpPartnerClient, XrpcClient};
use crate::adapters::sqlite::{SqliteCursorRepository, SqliteDomainStore, SqliteQuestRepository};
use crate::adapters::stream::{FirehoseProtocol, JetstreamProtocol, StreamProtocol};
use crate::domain::errors::DomainResult;
use crate::domain::models::Config;
use crate::domain::ports::{CursorRepository, DomainStore, NetworkClient, PartnerClient};
use crate::services::consumer::{ConsumerSettings, StreamConsumer};
use crate::services::cursor_store::CursorStore;
use crate::services::dispatcher::QuestDispatcher;
use crate::services::identities::IdentitySet;
use crate::services::poller::PollService;
use crate::services::quest_registry::QuestRegistry;
use crate::services::shutdown::Shutdown;
use crate::services::stats::StatsSnapshot;
use crate::services::triggers::TriggerDeps;

/// Which event stream a consumer reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Firehose,
    Jetstream,
}

pub struct Engine {
    config: Config,
    registry: Arc<QuestRegistry>,
    cursors: Arc<dyn CursorRepository>,
    store: Arc<dyn DomainStore>,
    identities: Arc<IdentitySet>,
    dispatcher: Arc<QuestDispatcher>,
}

impl Engine {
    /// Wire the engine against the configured network and partner services.
    pub fn build(config: Config, pool: SqlitePool) -> DomainResult<Self> {
        let network: Arc<dyn NetworkClient> = Arc::new(XrpcClient::new(config.network.clone())?);
        let partner: Option<Arc<dyn PartnerClient>> = match &config.partner.api_base {
            Some(base) => Some(Arc::new(HttpPartnerClient::new(
                base.clone(),
                Duration::from_millis(config.partner.lookup_timeout_ms),
            )?)),
            None => None,
        };
        Ok(Self::with_clients(config, pool, network, partner))
    }

    pub fn with_clients(
        config: Config,
        pool: SqlitePool,
        network: Arc<dyn NetworkClient>,
        partner: Option<Arc<dyn PartnerClient>>,
    ) -> Self {
        let registry = Arc::new(QuestRegistry::new(Arc::new(SqliteQuestRepository::new(pool.clone()))));
        let cursors: Arc<dyn CursorRepository> = Arc::new(SqliteCursorRepository::new(pool.clone()));
        let store: Arc<dyn DomainStore> = Arc::new(SqliteDomainStore::new(pool));
        let identities = Arc::new(IdentitySet::default());

        let deps = TriggerDeps {
            store: Arc::clone(&store),
            network,
            partner,
            identities: Arc::clone(&identities),
            partner_timeout: Duration::from_millis(config.partner.lookup_timeout_ms),
        };
        let dispatcher = Arc::new(QuestDispatcher::assemble(
            Arc::clone(&registry),
            deps,
            config.streams.extra_collections.clone(),
        ));

        Self {
            config,
            registry,
            cursors,
            store,
            identities,
            dispatcher,
        }
    }

    pub fn registry(&self) -> &Arc<QuestRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<QuestDispatcher> {
        &self.dispatcher
    }

    pub fn cursors(&self) -> &Arc<dyn CursorRepository> {
        &self.cursors
    }

    /// Load identities and quests, then keep both fresh until shutdown.
    pub async fn start_background(&self, shutdown: &Shutdown) -> DomainResult<()> {
        let known = self.identities.refresh(self.store.as_ref()).await?;
        let quests = self.dispatcher.snapshots().reload().await?;
        tracing::info!(identities = known, quests, "engine state loaded");

        self.identities.spawn_refresh_loop(
            Arc::clone(&self.store),
            Duration::from_secs(self.config.quests.identity_refresh_secs),
            shutdown.clone(),
        );
        self.dispatcher.snapshots().spawn_reload_loop(
            Duration::from_secs(self.config.quests.reload_interval_secs),
            shutdown.clone(),
        );
        Ok(())
    }

    fn consumer_settings(&self) -> ConsumerSettings {
        ConsumerSettings {
            workers: self.config.workers.clone(),
            reconnect: self.config.streams.reconnect.clone(),
            stats_interval: Duration::from_secs(self.config.stats.interval_secs.max(1)),
        }
    }

    async fn consume<P: StreamProtocol>(&self, protocol: P, shutdown: Shutdown) -> DomainResult<StatsSnapshot> {
        let cursor = CursorStore::new(
            Arc::clone(&self.cursors),
            protocol.service_name(),
            u64::from(self.config.streams.cursor_flush_every),
        );
        StreamConsumer::new(
            protocol,
            Arc::clone(&self.dispatcher),
            cursor,
            self.consumer_settings(),
            shutdown,
        )
        .run()
        .await
    }

    /// Run one stream consumer until shutdown.
    pub async fn run_consumer(&self, kind: StreamKind, shutdown: Shutdown) -> DomainResult<StatsSnapshot> {
        self.start_background(&shutdown).await?;
        match kind {
            StreamKind::Firehose => {
                self.consume(FirehoseProtocol::new(self.config.streams.firehose_url.clone()), shutdown)
                    .await
            }
            StreamKind::Jetstream => {
                self.consume(JetstreamProtocol::new(self.config.streams.jetstream_url.clone()), shutdown)
                    .await
            }
        }
    }

    /// Run the poll service until shutdown.
    pub async fn run_poll(&self, shutdown: Shutdown) -> DomainResult<StatsSnapshot> {
        self.start_background(&shutdown).await?;
        Ok(PollService::new(Arc::clone(&self.dispatcher), shutdown).run().await)
    }
}
