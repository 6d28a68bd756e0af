//! Shared trace budget.
//!
//! Workers claim a trace before generating it and report completion after it
//! is sent. A budget with no limit never completes.

use std::{
    num::NonZeroU64,
    sync::atomic::{AtomicU64, Ordering},
};

#[derive(Debug)]
/// Counts claimed and completed traces against an optional limit.
pub struct TraceBudget {
    limit: Option<NonZeroU64>,
    claimed: AtomicU64,
    completed: AtomicU64,
}

impl TraceBudget {
    /// Create a budget of `limit` traces, or an unlimited one.
    #[must_use]
    pub fn new(limit: Option<NonZeroU64>) -> Self {
        Self {
            limit,
            claimed: AtomicU64::new(0),
            completed: AtomicU64::new(0),
        }
    }

    /// Claim the next trace. Returns its 1-based ordinal, or `None` once the
    /// limit has been claimed.
    pub fn try_claim(&self) -> Option<u64> {
        let limit = self.limit.map_or(u64::MAX, NonZeroU64::get);
        self.claimed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |claimed| {
                (claimed < limit).then_some(claimed + 1)
            })
            .ok()
            .map(|previous| previous + 1)
    }

    /// Record a finished trace.
    pub fn complete(&self) {
        self.completed.fetch_add(1, Ordering::AcqRel);
    }

    /// Whether every trace in a limited budget has finished.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.limit
            .is_some_and(|limit| self.completed.load(Ordering::Acquire) >= limit.get())
    }

    /// Traces claimed so far.
    #[must_use]
    pub fn claimed(&self) -> u64 {
        self.claimed.load(Ordering::Acquire)
    }

    /// Traces completed so far.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }
}
