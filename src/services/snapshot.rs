//! The immutable engine snapshot readers share.
//!
//! A snapshot bundles the enabled quests, one trigger handler per trigger
//! type, and the stream pre-filter derived from them. Reloads build a new
//! snapshot and swap it in; an event already in flight keeps the snapshot it
//! started with.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};

use crate::adapters::stream::StreamFilter;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Quest, TriggerConfig, TriggerEvent};
use crate::services::overlay::QuestOverlay;
use crate::services::quest_registry::{validate_quest, QuestRegistry};
use crate::services::shutdown::Shutdown;
use crate::services::triggers::{build_handlers, TriggerDeps, TriggerHandler};

pub struct EngineSnapshot {
    pub quests: Vec<Arc<Quest>>,
    pub handlers: Vec<Arc<dyn TriggerHandler>>,
    pub filter: StreamFilter,
    pub loaded_at: DateTime<Utc>,
}

impl EngineSnapshot {
    pub fn empty() -> Self {
        Self {
            quests: Vec::new(),
            handlers: Vec::new(),
            filter: StreamFilter::default(),
            loaded_at: Utc::now(),
        }
    }

    /// Quests that fail validation are left out and logged.
    pub fn build(quests: Vec<Quest>, deps: &TriggerDeps, extra_collections: &[String]) -> DomainResult<Self> {
        let quests: Vec<Arc<Quest>> = quests
            .into_iter()
            .filter(|q| match validate_quest(q) {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!(quest = %q.title, error = %e, "quest skipped: invalid definition");
                    false
                }
            })
            .map(Arc::new)
            .collect();

        let handlers = build_handlers(&quests, deps);

        let mut collections: HashSet<String> = extra_collections.iter().cloned().collect();
        let mut monitored = HashSet::new();
        let mut phrases = Vec::new();
        for quest in &quests {
            match &quest.trigger {
                TriggerConfig::ReplyToPost { post_uri, .. } => {
                    monitored.insert(post_uri.clone());
                }
                TriggerConfig::NetworkPhrase { phrases: watched } => {
                    phrases.extend(watched.iter().map(|p| p.phrase.trim().to_string()).filter(|p| !p.is_empty()));
                }
                TriggerConfig::PartnerCompletion { collection, .. } => {
                    collections.insert(collection.clone());
                }
                TriggerConfig::Poll { .. } => {}
            }
        }
        for handler in &handlers {
            if handler.trigger_type() == crate::domain::models::TriggerType::PartnerCompletion {
                monitored.extend(handler.monitored_keys());
            }
        }

        let filter = StreamFilter::new(collections, monitored, &phrases)
            .map_err(|e| DomainError::ValidationFailed(format!("phrase filter: {e}")))?;

        Ok(Self {
            quests,
            handlers,
            filter,
            loaded_at: Utc::now(),
        })
    }

    /// `(title, interval_secs)` for every poll quest, sorted by title.
    pub fn poll_schedule(&self) -> Vec<(String, u64)> {
        let mut schedule: Vec<_> = self
            .quests
            .iter()
            .filter_map(|q| match q.trigger {
                TriggerConfig::Poll { interval_secs, .. } => Some((q.title.clone(), interval_secs)),
                _ => None,
            })
            .collect();
        schedule.sort();
        schedule
    }

    /// Whether any handler wants this event. Runs the pre-filter first.
    pub fn is_relevant(&self, event: &TriggerEvent) -> bool {
        self.filter.admits(event) && self.handlers.iter().any(|h| h.should_activate(event))
    }
}

/// Lock-free holder of the current snapshot.
pub struct SnapshotStore {
    inner: ArcSwap<EngineSnapshot>,
    reloading: AtomicBool,
    overlay: Arc<QuestOverlay>,
    registry: Arc<QuestRegistry>,
    deps: TriggerDeps,
    extra_collections: Vec<String>,
}

impl SnapshotStore {
    pub fn new(registry: Arc<QuestRegistry>, deps: TriggerDeps, extra_collections: Vec<String>) -> Self {
        Self {
            inner: ArcSwap::from_pointee(EngineSnapshot::empty()),
            reloading: AtomicBool::new(false),
            overlay: Arc::new(QuestOverlay::new()),
            registry,
            deps,
            extra_collections,
        }
    }

    pub fn load(&self) -> Arc<EngineSnapshot> {
        self.inner.load_full()
    }

    /// Disables recorded since the last reload.
    pub fn overlay(&self) -> &Arc<QuestOverlay> {
        &self.overlay
    }

    /// Rebuild from the registry. A failed reload keeps the previous snapshot.
    pub async fn reload(&self) -> DomainResult<usize> {
        if self
            .reloading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("snapshot reload already in progress, skipping");
            return Ok(self.load().quests.len());
        }

        let started = self.overlay.begin_reload();
        let result = async {
            let quests = self.registry.list_enabled().await?;
            EngineSnapshot::build(quests, &self.deps, &self.extra_collections)
        }
        .await;
        self.reloading.store(false, Ordering::SeqCst);

        let snapshot = result?;
        let count = snapshot.quests.len();
        self.inner.store(Arc::new(snapshot));
        self.overlay.finish_reload(started);
        tracing::info!(quests = count, "quest snapshot loaded");
        Ok(count)
    }

    pub fn spawn_reload_loop(self: &Arc<Self>, every: Duration, shutdown: Shutdown) {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tokio::time::sleep(every) => {}
                    () = shutdown.wait() => break,
                }
                if let Err(e) = store.reload().await {
                    tracing::error!(error = %e, "quest snapshot reload failed, keeping stale snapshot");
                }
            }
        });
        tracing::info!(interval_secs = every.as_secs(), "quest reload loop started");
    }
}
