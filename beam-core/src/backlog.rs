//! Send backlog: bytes handed to the transport but not yet flushed.
//!
//! The transport side calls `add` when it accepts a frame and `drain` when
//! the bytes leave its buffer. Crossing back to the ceiling or below wakes
//! the paced sender once (edge-triggered); nothing polls.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

use crate::frame::TransferError;

/// Default backlog ceiling in bytes.
pub const DEFAULT_BACKLOG_CEILING: u64 = 1024 * 1024; // 1 MiB

#[derive(Debug)]
pub struct Backlog {
    pending: AtomicU64,
    ceiling: u64,
    closed: AtomicBool,
    drained: Notify,
}

impl Backlog {
    pub fn new(ceiling: u64) -> Self {
        Self {
            pending: AtomicU64::new(0),
            ceiling,
            closed: AtomicBool::new(false),
            drained: Notify::new(),
        }
    }

    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_over_ceiling(&self) -> bool {
        self.pending() > self.ceiling
    }

    pub fn add(&self, bytes: u64) {
        self.pending.fetch_add(bytes, Ordering::AcqRel);
    }

    /// Record `bytes` as flushed. Signals the sender on the falling edge.
    pub fn drain(&self, bytes: u64) {
        let prev = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |p| {
                Some(p.saturating_sub(bytes))
            })
            .unwrap_or_else(|p| p);
        let now = prev.saturating_sub(bytes);
        if prev > self.ceiling && now <= self.ceiling {
            self.drained.notify_one();
        }
    }

    /// Transport is gone. Wakes a waiting sender, which then aborts.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.drained.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Return once the backlog is at or below the ceiling.
    pub async fn wait_below_ceiling(&self) -> Result<(), TransferError> {
        loop {
            if self.is_closed() {
                return Err(TransferError::Aborted);
            }
            if !self.is_over_ceiling() {
                return Ok(());
            }
            // notify_one stores a permit when nobody waits, so a drain that
            // lands between the check and this await is not lost.
            self.drained.notified().await;
        }
    }

    /// Like `wait_below_ceiling`, failing with `Stalled` after `limit`.
    pub async fn wait_below_ceiling_for(
        &self,
        limit: Option<Duration>,
    ) -> Result<(), TransferError> {
        match limit {
            Some(limit) => tokio::time::timeout(limit, self.wait_below_ceiling())
                .await
                .map_err(|_| TransferError::Stalled)?,
            None => self.wait_below_ceiling().await,
        }
    }
}

impl Default for Backlog {
    fn default() -> Self {
        Self::new(DEFAULT_BACKLOG_CEILING)
    }
}
