//! Quest disables that take effect before the next snapshot reload.
//!
//! `disable-self` and `disable-conditions` write the registry, but the
//! snapshot workers read still holds the old quest until it is rebuilt. The
//! overlay records those disables in memory and is applied to every quest
//! before evaluation. A reload prunes entries it has already picked up from
//! the registry.
//!
//! Quests able to disable themselves also run one event at a time, so two
//! workers cannot both satisfy a once-only condition.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OwnedMutexGuard;

use crate::domain::models::{CommandKind, Quest};

#[derive(Debug, Default)]
struct Pending {
    quest_disabled: bool,
    conditions: BTreeSet<usize>,
    epoch: u64,
}

#[derive(Debug, Default)]
pub struct QuestOverlay {
    pending: Mutex<HashMap<String, Pending>>,
    gates: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    epoch: AtomicU64,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl QuestOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, title: &str, apply: impl FnOnce(&mut Pending)) {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let mut pending = locked(&self.pending);
        let entry = pending.entry(title.to_string()).or_default();
        apply(&mut *entry);
        entry.epoch = epoch;
    }

    pub fn disable_quest(&self, title: &str) {
        self.record(title, |p| p.quest_disabled = true);
    }

    pub fn disable_conditions(&self, title: &str, indices: &[usize]) {
        self.record(title, |p| p.conditions.extend(indices.iter().copied()));
    }

    /// The quest as workers should see it, or `None` once it is disabled.
    pub fn apply<'a>(&self, quest: &'a Quest) -> Option<Cow<'a, Quest>> {
        if !quest.enabled {
            return None;
        }
        let pending = locked(&self.pending);
        let Some(entry) = pending.get(&quest.title) else {
            return Some(Cow::Borrowed(quest));
        };
        if entry.quest_disabled {
            return None;
        }

        let needs_change = entry
            .conditions
            .iter()
            .any(|&i| quest.conditions.get(i).is_some_and(|c| !c.disabled));
        if !needs_change {
            return Some(Cow::Borrowed(quest));
        }
        let mut quest = quest.clone();
        for &i in &entry.conditions {
            if let Some(condition) = quest.conditions.get_mut(i) {
                condition.disabled = true;
            }
        }
        Some(Cow::Owned(quest))
    }

    /// Serialize runs of a quest that can disable itself. Other quests run
    /// concurrently and get `None`.
    pub async fn gate(&self, quest: &Quest) -> Option<OwnedMutexGuard<()>> {
        if !can_disable_itself(quest) {
            return None;
        }
        let gate = {
            let mut gates = locked(&self.gates);
            Arc::clone(gates.entry(quest.title.clone()).or_default())
        };
        Some(gate.lock_owned().await)
    }

    /// Mark the start of a registry read. Pass the result to [`Self::finish_reload`].
    pub fn begin_reload(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::SeqCst)
    }

    /// Drop entries recorded before the matching [`Self::begin_reload`]; the
    /// registry already reflected them when the new snapshot was read.
    pub fn finish_reload(&self, started: u64) {
        locked(&self.pending).retain(|_, p| p.epoch > started);
    }

    pub fn len(&self) -> usize {
        locked(&self.pending).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn can_disable_itself(quest: &Quest) -> bool {
    let disables = |name: &str| {
        matches!(
            CommandKind::resolve(name),
            Some(CommandKind::DisableSelf | CommandKind::DisableConditions)
        )
    };
    quest.conditions.iter().any(|c| c.once_only && !c.disabled)
        || quest.commands.iter().any(|c| disables(&c.name))
        || quest
            .conditions
            .iter()
            .flat_map(|c| c.custom_commands.iter())
            .any(|c| disables(&c.name))
}
