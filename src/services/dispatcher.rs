//! Routes trigger events to quests and runs them.
//!
//! For one quest the order is fixed: build the context, evaluate every
//! condition, then execute commands. Events are handed to a bounded worker
//! pool by the stream consumers; the pool applies backpressure to the receive
//! loop when full.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::domain::errors::DomainResult;
use crate::domain::models::{did_of_uri, Command, CommandKind, EvaluationContext, Quest, ReplyEvent, TriggerEvent};
use crate::services::commands::CommandExecutor;
use crate::services::conditions::ConditionEvaluator;
use crate::services::quest_registry::QuestRegistry;
use crate::services::snapshot::SnapshotStore;
use crate::services::stats::DispatchStats;
use crate::services::triggers::{TriggerDeps, TriggerHandler};

/// A reply submitted directly, outside any stream.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub reply_uri: String,
    pub author_did: String,
    pub author_handle: String,
    pub text: String,
    pub created_at: Option<String>,
    pub quest_uri: String,
}

/// Result of running one quest for one event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessOutcome {
    pub success: bool,
    pub quest_title: Option<String>,
    pub executed: Vec<String>,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    pub errors: Vec<String>,
}

impl ProcessOutcome {
    fn skipped(quest_title: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            success: true,
            quest_title,
            skipped: true,
            skip_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    fn failed(quest_title: String, error: String) -> Self {
        Self {
            success: false,
            quest_title: Some(quest_title),
            errors: vec![error],
            ..Self::default()
        }
    }
}

pub struct QuestDispatcher {
    snapshots: Arc<SnapshotStore>,
    registry: Arc<QuestRegistry>,
    evaluator: ConditionEvaluator,
    executor: CommandExecutor,
    stats: Arc<DispatchStats>,
}

impl QuestDispatcher {
    pub fn new(
        snapshots: Arc<SnapshotStore>,
        registry: Arc<QuestRegistry>,
        evaluator: ConditionEvaluator,
        executor: CommandExecutor,
        stats: Arc<DispatchStats>,
    ) -> Self {
        Self {
            snapshots,
            registry,
            evaluator,
            executor,
            stats,
        }
    }

    /// Wire a dispatcher and its snapshot store from shared collaborators.
    pub fn assemble(registry: Arc<QuestRegistry>, deps: TriggerDeps, extra_collections: Vec<String>) -> Self {
        let evaluator = ConditionEvaluator::new(Arc::clone(&deps.store));
        let executor = CommandExecutor::new(
            Arc::clone(&deps.store),
            Arc::clone(&deps.network),
            Arc::clone(&registry),
            Arc::clone(&deps.identities),
        );
        let snapshots = Arc::new(SnapshotStore::new(Arc::clone(&registry), deps, extra_collections));
        let executor = executor.with_overlay(Arc::clone(snapshots.overlay()));
        Self::new(snapshots, registry, evaluator, executor, Arc::new(DispatchStats::new()))
    }

    pub fn stats(&self) -> &Arc<DispatchStats> {
        &self.stats
    }

    pub fn snapshots(&self) -> &Arc<SnapshotStore> {
        &self.snapshots
    }

    /// Run every quest the current snapshot routes `event` to.
    pub async fn handle_event(&self, event: &TriggerEvent) -> Vec<ProcessOutcome> {
        let snapshot = self.snapshots.load();
        let mut outcomes = Vec::new();
        for handler in snapshot.handlers.iter().filter(|h| h.should_activate(event)) {
            for quest in handler.quests_for(event) {
                outcomes.push(self.run_handler_quest(handler.as_ref(), event, &quest).await);
            }
        }
        outcomes
    }

    async fn run_handler_quest(&self, handler: &dyn TriggerHandler, event: &TriggerEvent, quest: &Quest) -> ProcessOutcome {
        let ctx = match handler.evaluation_context(event, quest).await {
            Ok(ctx) => ctx,
            Err(e) => {
                self.stats.error();
                tracing::warn!(quest = %quest.title, trigger = %handler.trigger_type(), error = %e, "evaluation context failed");
                return ProcessOutcome::failed(quest.title.clone(), e.to_string());
            }
        };
        self.run_quest(quest, &ctx).await
    }

    /// Evaluate a quest against a context and, when it passes, execute its commands.
    ///
    /// Disables recorded since the snapshot was built are applied first.
    pub async fn run_quest(&self, quest: &Quest, ctx: &EvaluationContext) -> ProcessOutcome {
        let overlay = self.snapshots.overlay();
        let _gate = overlay.gate(quest).await;
        let Some(quest) = overlay.apply(quest) else {
            tracing::debug!(quest = %quest.title, "quest disabled since snapshot load");
            return ProcessOutcome::skipped(Some(quest.title.clone()), "quest disabled");
        };
        let quest: &Quest = &quest;

        let outcome = match self.evaluator.evaluate(quest, ctx).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.stats.error();
                tracing::error!(quest = %quest.title, error = %e, "quest configuration rejected, quest stays enabled");
                return ProcessOutcome::failed(quest.title.clone(), e.to_string());
            }
        };

        if !outcome.success {
            tracing::debug!(quest = %quest.title, "conditions not met");
            return ProcessOutcome::skipped(Some(quest.title.clone()), "conditions not met");
        }
        self.stats.matched();

        let commands = batch(quest, outcome.custom_commands, &outcome.once_only_matched);
        let report = self
            .executor
            .execute(&commands, &outcome.matching_replies, ctx, quest)
            .await;

        if report.success {
            self.stats.fired();
            tracing::info!(
                quest = %quest.title,
                replies = outcome.matching_replies.len(),
                executed = ?report.executed,
                "quest fired"
            );
        } else {
            self.stats.error();
        }

        ProcessOutcome {
            success: report.success,
            quest_title: Some(quest.title.clone()),
            executed: report.executed,
            skipped: false,
            skip_reason: None,
            errors: report.errors,
        }
    }

    /// Run the first enabled quest watching `quest_uri` for one reply.
    pub async fn process_event(&self, request: ProcessRequest) -> DomainResult<ProcessOutcome> {
        let quest = self
            .registry
            .list_enabled()
            .await?
            .into_iter()
            .find(|q| q.trigger.post_uri() == Some(request.quest_uri.as_str()));
        let Some(quest) = quest else {
            return Ok(ProcessOutcome::skipped(None, format!("no enabled quest watches {}", request.quest_uri)));
        };

        let reply = ReplyEvent::new(
            request.reply_uri,
            request.author_did,
            request.author_handle,
            request.text,
            request
                .created_at
                .unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
        );
        let ctx = EvaluationContext::new(quest.trigger_type(), vec![reply])
            .with_subject_author(did_of_uri(&request.quest_uri).map(str::to_string));
        Ok(self.run_quest(&quest, &ctx).await)
    }
}

/// Custom commands of passing conditions, then the quest's commands, then one
/// `disable-conditions` for every passing once-only condition.
fn batch(quest: &Quest, mut commands: Vec<Command>, once_only: &[usize]) -> Vec<Command> {
    commands.extend(quest.commands.iter().cloned());
    if !once_only.is_empty() {
        commands.push(Command::new(
            CommandKind::DisableConditions.canonical_name(),
            once_only.iter().map(ToString::to_string).collect(),
        ));
    }
    commands
}

/// Bounded queue drained by a fixed set of workers.
pub struct WorkerPool {
    tx: mpsc::Sender<TriggerEvent>,
    workers: Vec<JoinHandle<()>>,
    backlog: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn spawn(dispatcher: Arc<QuestDispatcher>, size: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<TriggerEvent>(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let backlog = Arc::new(AtomicUsize::new(0));

        let workers = (0..size.max(1))
            .map(|id| {
                let rx = Arc::clone(&rx);
                let backlog = Arc::clone(&backlog);
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    loop {
                        let next = rx.lock().await.recv().await;
                        let Some(event) = next else { break };
                        backlog.fetch_sub(1, Ordering::Relaxed);
                        dispatcher.handle_event(&event).await;
                    }
                    tracing::debug!(worker = id, "worker stopped");
                })
            })
            .collect();

        Self { tx, workers, backlog }
    }

    /// Queue an event, waiting while the queue is full.
    pub async fn submit(&self, event: TriggerEvent) -> bool {
        self.backlog.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(event).await.is_err() {
            self.backlog.fetch_sub(1, Ordering::Relaxed);
            tracing::warn!("worker pool closed, event dropped");
            return false;
        }
        true
    }

    pub fn backlog(&self) -> usize {
        self.backlog.load(Ordering::Relaxed)
    }

    /// Stop accepting events and wait for queued ones. Returns `false` if the
    /// timeout expired and workers were aborted.
    pub async fn shutdown(self, timeout: Duration) -> bool {
        let Self { tx, workers, backlog } = self;
        drop(tx);

        let aborts: Vec<_> = workers.iter().map(JoinHandle::abort_handle).collect();
        if tokio::time::timeout(timeout, futures_util::future::join_all(workers))
            .await
            .is_ok()
        {
            tracing::info!("worker pool drained");
            return true;
        }

        tracing::warn!(
            backlog = backlog.load(Ordering::Relaxed),
            timeout_secs = timeout.as_secs(),
            "worker pool drain timed out, aborting workers"
        );
        for handle in aborts {
            handle.abort();
        }
        false
    }
}
