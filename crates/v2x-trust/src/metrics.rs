//! Outcome and timing aggregation.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use v2x_core::{Outcome, TimingBreakdown};

/// Receives one record per classified response.
///
/// Called from listener tasks, so implementations must be thread-safe.
pub trait MetricsSink: Send + Sync {
    /// A response for `round` was classified.
    fn record(&self, round: u64, outcome: Outcome, timing: &TimingBreakdown);

    /// The query for `round` took `elapsed` to hand to the network.
    fn record_send(&self, _round: u64, _elapsed: Duration) {}
}

#[derive(Debug, Default)]
struct TallyState {
    counts: BTreeMap<Outcome, u64>,
    process: Vec<Duration>,
    round_trip: Vec<Duration>,
    send: Vec<Duration>,
}

/// In-memory counts per outcome with mean timings.
#[derive(Debug, Default)]
pub struct OutcomeTally {
    state: Mutex<TallyState>,
}

/// Snapshot of an [`OutcomeTally`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TallySummary {
    /// Responses classified
    pub total: u64,
    /// Count per outcome; every outcome is present
    pub counts: BTreeMap<Outcome, u64>,
    /// Share of responses that passed every trust check, in percent
    pub trusted_percent: f64,
    /// Mean receipt-to-classification time, milliseconds
    pub mean_process_ms: Option<f64>,
    /// Mean dispatch-to-classification time, milliseconds
    pub mean_round_trip_ms: Option<f64>,
    /// Mean query send time, milliseconds
    pub mean_send_ms: Option<f64>,
}

impl OutcomeTally {
    /// Empty tally.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Responses recorded with `outcome`.
    #[must_use]
    pub fn count(&self, outcome: Outcome) -> u64 {
        self.lock().counts.get(&outcome).copied().unwrap_or(0)
    }

    /// Responses recorded in total.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.lock().counts.values().sum()
    }

    /// Current counts and mean timings.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn summary(&self) -> TallySummary {
        let state = self.lock();
        let counts: BTreeMap<Outcome, u64> = Outcome::ALL
            .iter()
            .map(|o| (*o, state.counts.get(o).copied().unwrap_or(0)))
            .collect();
        let total: u64 = counts.values().sum();
        let trusted: u64 = counts
            .iter()
            .filter(|(o, _)| o.is_trusted())
            .map(|(_, n)| n)
            .sum();
        let trusted_percent = if total == 0 {
            0.0
        } else {
            trusted as f64 * 100.0 / total as f64
        };
        TallySummary {
            total,
            counts,
            trusted_percent,
            mean_process_ms: mean_ms(&state.process),
            mean_round_trip_ms: mean_ms(&state.round_trip),
            mean_send_ms: mean_ms(&state.send),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TallyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MetricsSink for OutcomeTally {
    fn record(&self, _round: u64, outcome: Outcome, timing: &TimingBreakdown) {
        let mut state = self.lock();
        *state.counts.entry(outcome).or_insert(0) += 1;
        state.process.push(timing.process_response);
        if let Some(rtt) = timing.round_trip {
            state.round_trip.push(rtt);
        }
    }

    fn record_send(&self, _round: u64, elapsed: Duration) {
        self.lock().send.push(elapsed);
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean_ms(samples: &[Duration]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let total: f64 = samples.iter().map(|d| d.as_micros() as f64 / 1000.0).sum();
    Some(total / samples.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing(process_ms: u64, rtt_ms: Option<u64>) -> TimingBreakdown {
        TimingBreakdown {
            process_response: Duration::from_millis(process_ms),
            round_trip: rtt_ms.map(Duration::from_millis),
        }
    }

    #[test]
    fn test_counts_and_means() {
        let tally = OutcomeTally::new();
        tally.record(0, Outcome::TrustedBenign, &timing(2, Some(10)));
        tally.record(1, Outcome::TrustedBenign, &timing(4, Some(30)));
        tally.record(2, Outcome::UntrustedFilterMiss, &timing(6, None));
        tally.record_send(0, Duration::from_millis(1));

        assert_eq!(tally.count(Outcome::TrustedBenign), 2);
        assert_eq!(tally.count(Outcome::UntrustedRevoked), 0);
        assert_eq!(tally.total(), 3);

        let summary = tally.summary();
        assert_eq!(summary.counts.len(), Outcome::ALL.len());
        assert_eq!(summary.mean_process_ms, Some(4.0));
        assert_eq!(summary.mean_round_trip_ms, Some(20.0));
        assert_eq!(summary.mean_send_ms, Some(1.0));
        assert!((summary.trusted_percent - 66.666).abs() < 0.01);
    }

    #[test]
    fn test_empty_summary() {
        let summary = OutcomeTally::new().summary();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.trusted_percent, 0.0);
        assert_eq!(summary.mean_process_ms, None);
    }

    #[test]
    fn test_summary_serializes_with_outcome_labels() {
        let tally = OutcomeTally::new();
        tally.record(0, Outcome::UntrustedRevoked, &timing(1, None));
        let json = serde_json::to_value(tally.summary()).unwrap();
        assert_eq!(json["counts"]["untrusted-revoked"], 1);
        assert_eq!(json["counts"]["trusted-benign"], 0);
    }

    #[test]
    fn test_shared_across_threads() {
        let tally = std::sync::Arc::new(OutcomeTally::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let tally = tally.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        tally.record(t * 25 + i, Outcome::TrustedMalicious, &timing(1, None));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(tally.count(Outcome::TrustedMalicious), 100);
    }
}
