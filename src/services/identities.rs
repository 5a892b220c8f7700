//! The tracked identity set consulted by the reply trigger.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

use crate::domain::errors::DomainResult;
use crate::domain::ports::DomainStore;
use crate::services::shutdown::Shutdown;

/// Lock-free set of registered DIDs, replaced on refresh.
#[derive(Debug, Default)]
pub struct IdentitySet {
    inner: ArcSwap<HashSet<String>>,
}

impl IdentitySet {
    pub fn new(initial: HashSet<String>) -> Self {
        Self {
            inner: ArcSwap::from_pointee(initial),
        }
    }

    pub fn contains(&self, did: &str) -> bool {
        self.inner.load().contains(did)
    }

    pub fn len(&self) -> usize {
        self.inner.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.load().is_empty()
    }

    /// Add a newly registered DID without waiting for the next refresh.
    pub fn insert(&self, did: &str) {
        if self.contains(did) {
            return;
        }
        self.inner.rcu(|current| {
            let mut next = HashSet::clone(current);
            next.insert(did.to_string());
            next
        });
    }

    pub async fn refresh(&self, store: &dyn DomainStore) -> DomainResult<usize> {
        let dids = store.user_dids().await?;
        let count = dids.len();
        self.inner.store(Arc::new(dids));
        Ok(count)
    }

    pub fn spawn_refresh_loop(self: &Arc<Self>, store: Arc<dyn DomainStore>, every: Duration, shutdown: Shutdown) {
        let identities = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tokio::time::sleep(every) => {}
                    () = shutdown.wait() => break,
                }
                match identities.refresh(store.as_ref()).await {
                    Ok(count) => tracing::debug!(count, "tracked identities refreshed"),
                    Err(e) => tracing::warn!(error = %e, "identity refresh failed, keeping previous set"),
                }
            }
        });
        tracing::info!(interval_secs = every.as_secs(), "identity refresh loop started");
    }
}
