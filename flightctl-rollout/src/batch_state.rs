//! Per-fleet rollout bookkeeping that the controller needs between
//! reconciles but that the data model has no durable home for.
//!
//! `batchStartedAt` isn't in the annotation set §3 enumerates, and the
//! spec leaves exactly how a restarted controller recovers a batch's
//! elapsed time as an open question. We keep it in memory, keyed by
//! fleet, and accept that a controller restart resets each in-flight
//! batch's timeout clock — a batch that was about to time out simply
//! gets a fresh window instead of being evaluated mid-restart. Nothing
//! about correctness depends on the clock surviving a restart: the
//! timeout only ever widens the set of devices counted as failures, it
//! never narrows it (§4.4).

use std::time::Duration;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default)]
pub struct FleetRuntimeState {
    batch_started_at: Option<DateTime<Utc>>,
    tracked_batch_number: Option<u32>,
}

impl FleetRuntimeState {
    /// Record that `batch_number` just became the active batch, resetting
    /// the timeout clock if it wasn't already running for this batch.
    pub fn note_active_batch(&mut self, batch_number: u32, now: DateTime<Utc>) {
        if self.tracked_batch_number != Some(batch_number) {
            self.tracked_batch_number = Some(batch_number);
            self.batch_started_at = Some(now);
        }
    }

    pub fn has_timed_out(&self, now: DateTime<Utc>, timeout_seconds: u64) -> bool {
        match self.batch_started_at {
            None => false,
            Some(started) => {
                let elapsed = (now - started).to_std().unwrap_or(Duration::ZERO);
                elapsed >= Duration::from_secs(timeout_seconds)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_batch_has_not_timed_out() {
        let mut state = FleetRuntimeState::default();
        let now = Utc::now();
        state.note_active_batch(1, now);
        assert!(!state.has_timed_out(now, 600));
    }

    #[test]
    fn elapsed_past_timeout_reports_timed_out() {
        let mut state = FleetRuntimeState::default();
        let start = Utc::now();
        state.note_active_batch(1, start);
        let later = start + chrono::Duration::seconds(700);
        assert!(state.has_timed_out(later, 600));
    }

    #[test]
    fn advancing_to_a_new_batch_number_resets_the_clock() {
        let mut state = FleetRuntimeState::default();
        let start = Utc::now();
        state.note_active_batch(1, start);
        let later = start + chrono::Duration::seconds(700);
        state.note_active_batch(2, later);
        assert!(!state.has_timed_out(later, 600));
    }
}
