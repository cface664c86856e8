//! Time-ordered vote ledger.
//!
//! A vote is the timestamp of a frame whose fused risk crossed the probability
//! threshold. Evidence decays as a whole: once the gap since the most recent
//! vote exceeds the staleness window the ledger is emptied, never trimmed.
//!
//! Eviction only happens in `record_vote` and `evict_stale`; every query is a
//! plain snapshot.

use anyhow::{anyhow, Result};

use crate::clock::Timestamp;

/// Five minutes.
pub const DEFAULT_STALENESS_WINDOW_MS: u64 = 300_000;
pub const DEFAULT_ALERT_THRESHOLD: usize = 5;

#[derive(Clone, Debug)]
pub struct VoteLedger {
    votes: Vec<Timestamp>,
    staleness_window_ms: u64,
    alert_threshold: usize,
}

impl VoteLedger {
    pub fn new(staleness_window_ms: u64, alert_threshold: usize) -> Result<Self> {
        if staleness_window_ms == 0 {
            return Err(anyhow!("staleness window must be greater than zero"));
        }
        if alert_threshold == 0 {
            return Err(anyhow!("alert threshold must be at least one vote"));
        }
        Ok(Self {
            votes: Vec::new(),
            staleness_window_ms,
            alert_threshold,
        })
    }

    /// Append a vote at `t`, first discarding all evidence if it went stale.
    ///
    /// `t` must not precede the last recorded vote.
    pub fn record_vote(&mut self, t: Timestamp) {
        debug_assert!(
            self.last_vote().is_none_or(|last| t >= last),
            "votes must be recorded in time order"
        );
        self.evict_stale(t);
        self.votes.push(t);
    }

    /// Clear the ledger when `now` is more than the window past the last vote.
    /// Returns true when evidence was discarded.
    pub fn evict_stale(&mut self, now: Timestamp) -> bool {
        match self.last_vote() {
            Some(last) if now.saturating_sub(last) > self.staleness_window_ms => {
                log::debug!(
                    "discarding {} stale votes (last vote {} ms ago)",
                    self.votes.len(),
                    now - last
                );
                self.votes.clear();
                true
            }
            _ => false,
        }
    }

    pub fn vote_count(&self) -> usize {
        self.votes.len()
    }

    pub fn should_alert(&self) -> bool {
        self.vote_count() >= self.alert_threshold
    }

    pub fn clear(&mut self) {
        self.votes.clear();
    }

    pub fn votes(&self) -> &[Timestamp] {
        &self.votes
    }

    pub fn last_vote(&self) -> Option<Timestamp> {
        self.votes.last().copied()
    }

    /// Votes recorded at or after `t`.
    pub fn count_since(&self, t: Timestamp) -> usize {
        let first = self.votes.partition_point(|&v| v < t);
        self.votes.len() - first
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    pub fn staleness_window_ms(&self) -> u64 {
        self.staleness_window_ms
    }

    pub fn alert_threshold(&self) -> usize {
        self.alert_threshold
    }
}

impl Default for VoteLedger {
    fn default() -> Self {
        Self {
            votes: Vec::new(),
            staleness_window_ms: DEFAULT_STALENESS_WINDOW_MS,
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
        }
    }
}
