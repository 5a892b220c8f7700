//! Poll service: re-runs poll quests on their own intervals.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use crate::domain::models::TriggerEvent;
use crate::services::dispatcher::{ProcessOutcome, QuestDispatcher};
use crate::services::shutdown::Shutdown;
use crate::services::stats::StatsSnapshot;

const RESOLUTION: Duration = Duration::from_secs(1);

pub struct PollService {
    dispatcher: Arc<QuestDispatcher>,
    shutdown: Shutdown,
    last_run: HashMap<String, Instant>,
}

impl PollService {
    pub fn new(dispatcher: Arc<QuestDispatcher>, shutdown: Shutdown) -> Self {
        Self {
            dispatcher,
            shutdown,
            last_run: HashMap::new(),
        }
    }

    pub async fn run(mut self) -> StatsSnapshot {
        tracing::info!(
            quests = self.dispatcher.snapshots().load().poll_schedule().len(),
            "poll service starting"
        );
        let mut ticker = tokio::time::interval(RESOLUTION);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = self.shutdown.wait() => break,
            }
            self.tick_due(Instant::now()).await;
        }
        let stats = self.dispatcher.stats().snapshot();
        tracing::info!(?stats, "poll service stopped");
        stats
    }

    /// Fire every quest whose interval has elapsed since its last run. A
    /// quest that has never run is due immediately.
    pub async fn tick_due(&mut self, now: Instant) -> Vec<ProcessOutcome> {
        let schedule = self.dispatcher.snapshots().load().poll_schedule();
        self.last_run.retain(|title, _| schedule.iter().any(|(t, _)| t == title));

        let mut outcomes = Vec::new();
        for (title, interval_secs) in schedule {
            let due = self
                .last_run
                .get(&title)
                .is_none_or(|last| now.duration_since(*last) >= Duration::from_secs(interval_secs));
            if !due {
                continue;
            }
            self.last_run.insert(title.clone(), now);
            tracing::debug!(quest = %title, "poll tick");

            let event = TriggerEvent::Tick {
                quest_title: title,
                at: Utc::now(),
            };
            self.dispatcher.stats().consumed();
            outcomes.extend(self.dispatcher.handle_event(&event).await);
        }
        outcomes
    }
}
