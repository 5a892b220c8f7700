//! Buffered cursor persistence for one consumer service.
//!
//! Only the receive loop touches a `CursorStore`, so it needs no locking.
//! Positions are flushed on every K-th advance, on forced advances and on
//! [`CursorStore::finalize`]; a crash loses at most K-1 positions.

use std::sync::Arc;

use crate::domain::errors::DomainResult;
use crate::domain::ports::CursorRepository;

pub struct CursorStore {
    repo: Arc<dyn CursorRepository>,
    service: String,
    flush_every: u64,
    pending: Option<i64>,
    since_flush: u64,
    events_processed: i64,
    last_flushed: Option<i64>,
}

impl CursorStore {
    pub fn new(repo: Arc<dyn CursorRepository>, service: impl Into<String>, flush_every: u64) -> Self {
        Self {
            repo,
            service: service.into(),
            flush_every: flush_every.max(1),
            pending: None,
            since_flush: 0,
            events_processed: 0,
            last_flushed: None,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Last durable position, also seeding the processed counter.
    pub async fn load(&mut self) -> DomainResult<Option<i64>> {
        let record = self.repo.load(&self.service).await?;
        if let Some(record) = &record {
            self.events_processed = record.events_processed;
            self.last_flushed = Some(record.position);
        }
        Ok(record.map(|r| r.position))
    }

    /// Where a reconnect should resume: the newest position seen, flushed or not.
    pub fn position(&self) -> Option<i64> {
        match (self.pending, self.last_flushed) {
            (Some(p), Some(f)) => Some(p.max(f)),
            (p, f) => p.or(f),
        }
    }

    /// Record a consumed position. Returns whether it was written through.
    pub async fn advance(&mut self, position: i64, force: bool) -> DomainResult<bool> {
        self.events_processed += 1;
        self.since_flush += 1;
        self.pending = Some(self.pending.map_or(position, |p| p.max(position)));

        if force || self.since_flush >= self.flush_every {
            self.flush().await?;
            return Ok(true);
        }
        Ok(false)
    }

    pub async fn record_error(&self, message: &str) -> DomainResult<()> {
        self.repo.record_error(&self.service, message).await
    }

    /// Flush whatever is pending.
    pub async fn finalize(&mut self) -> DomainResult<()> {
        if self.pending.is_some() {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> DomainResult<()> {
        let Some(position) = self.pending else {
            return Ok(());
        };
        self.repo.save(&self.service, position, self.events_processed).await?;
        tracing::debug!(service = %self.service, position, events_processed = self.events_processed, "cursor flushed");
        self.last_flushed = Some(position);
        self.pending = None;
        self.since_flush = 0;
        Ok(())
    }
}
