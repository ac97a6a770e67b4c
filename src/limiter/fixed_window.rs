//! Fixed Window Rate Limiter
//!
//! Counts requests per identity inside fixed windows. A window is replaced
//! wholesale once it runs out instead of sliding, which keeps one small
//! record per identity and needs no timer, at the cost of admitting up to
//! twice the quota across a window boundary.

use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use crate::cache::current_timestamp_ms;
use crate::limiter::{RateDecision, RateWindow};

// == Rate Limiter ==
/// Identity-agnostic fixed-window limiter.
///
/// Windows live in a sharded map; each admission check runs under the
/// shard lock for that identity, so increments are never lost.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
}

impl RateLimiter {
    // == Constructor ==
    /// Creates an empty limiter.
    pub fn new() -> Self {
        Self::default()
    }

    // == Allow ==
    /// Counts one request for `identity` and decides whether to admit it.
    ///
    /// The first request creates a window ending `window` from now. Later
    /// requests in that window increment the count and are rejected once it
    /// exceeds `max_requests`. After the reset time, the next request opens
    /// a fresh window.
    pub fn allow(&self, identity: &str, max_requests: u32, window: Duration) -> RateDecision {
        let now = current_timestamp_ms();

        let mut slot = self
            .windows
            .entry(identity.to_string())
            .or_insert_with(|| RateWindow::open(now, window));
        if slot.is_expired(now) {
            *slot = RateWindow::open(now, window);
        }
        slot.count = slot.count.saturating_add(1);

        let allowed = slot.count <= max_requests;
        let reset_at = slot.window_reset_at;
        let decision = RateDecision {
            allowed,
            limit: max_requests,
            remaining: max_requests.saturating_sub(slot.count),
            reset_at,
            retry_after: (!allowed).then(|| Duration::from_millis(reset_at.saturating_sub(now))),
        };
        drop(slot);

        if !allowed {
            debug!(
                "Rate limit exceeded for {}: {} requests allowed per {:?}",
                identity, max_requests, window
            );
        }
        decision
    }

    // == Administration ==
    /// Returns the live window for `identity`, if any.
    pub fn status(&self, identity: &str) -> Option<RateWindow> {
        let now = current_timestamp_ms();
        self.windows
            .get(identity)
            .filter(|window| !window.is_expired(now))
            .map(|window| window.value().clone())
    }

    /// Lists identities with a live window, sorted.
    pub fn tracked_identities(&self) -> Vec<String> {
        let now = current_timestamp_ms();
        let mut identities: Vec<String> = self
            .windows
            .iter()
            .filter(|item| !item.value().is_expired(now))
            .map(|item| item.key().clone())
            .collect();
        identities.sort();
        identities
    }

    /// Forgets the window for `identity`. Returns whether one existed.
    pub fn reset(&self, identity: &str) -> bool {
        self.windows.remove(identity).is_some()
    }

    /// Forgets every window, returning how many were dropped.
    pub fn reset_all(&self) -> usize {
        let count = self.windows.len();
        self.windows.clear();
        count
    }

    // == Purge Expired ==
    /// Drops windows that have run out. Returns the number removed.
    ///
    /// Optional: expired windows are also replaced on the identity's next
    /// request.
    pub fn purge_expired(&self) -> usize {
        let now = current_timestamp_ms();
        let before = self.windows.len();
        self.windows.retain(|_, window| !window.is_expired(now));
        before.saturating_sub(self.windows.len())
    }

    /// Number of tracked windows, expired ones included.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Returns true when no windows are tracked.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
