use std::time::{Duration, Instant};

/// Lifecycle of a round attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundStatus {
    /// Query dispatched, waiting for the listener's readiness signal
    Pending,
    /// Listener signalled readiness
    Completed,
    /// Deadline passed without a readiness signal
    TimedOut,
}

/// One attempt at a logical query/response round.
#[derive(Debug, Clone)]
pub struct Round {
    /// Logical sequence number; retries reuse it
    pub number: u64,
    /// Attempt count for this sequence number, starting at 1
    pub attempt: u32,
    /// When the query was handed to the issuer
    pub dispatched_at: Instant,
    /// When the coordinator gives up on this attempt
    pub deadline: Instant,
    /// Current status
    pub status: RoundStatus,
}

impl Round {
    /// Start a pending attempt dispatched now.
    #[must_use]
    pub fn dispatch(number: u64, attempt: u32, timeout: Duration) -> Self {
        let dispatched_at = Instant::now();
        Self {
            number,
            attempt,
            dispatched_at,
            deadline: dispatched_at + timeout,
            status: RoundStatus::Pending,
        }
    }

    /// Mark the attempt completed. Only a pending attempt can complete.
    pub fn complete(&mut self) -> bool {
        self.transition(RoundStatus::Completed)
    }

    /// Mark the attempt timed out. Only a pending attempt can time out.
    pub fn time_out(&mut self) -> bool {
        self.transition(RoundStatus::TimedOut)
    }

    fn transition(&mut self, to: RoundStatus) -> bool {
        if self.status == RoundStatus::Pending {
            self.status = to;
            true
        } else {
            false
        }
    }
}
