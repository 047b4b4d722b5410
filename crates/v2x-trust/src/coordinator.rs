//! Round coordinator.
//!
//! Drives a fixed number of query/response rounds. Each attempt binds a
//! fresh reply socket, starts a listener on it, dispatches the query and
//! waits for the listener's readiness signal until the round deadline. A
//! round counts as completed only once its listener signals; otherwise the
//! same round number is retried.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::issuer::{QueryIssuer, RoundContext};
use crate::listener::{ListenerExit, ReadySignal, ResponseListener};
use crate::metrics::MetricsSink;
use crate::pipeline::TrustPipeline;
use v2x_core::{Result, Round, V2xError};

/// Coordinator settings.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Rounds to complete
    pub target_rounds: u64,
    /// Deadline per attempt
    pub round_timeout: Duration,
    /// Give up on a round after this many attempts; `None` retries forever
    pub max_attempts_per_round: Option<u32>,
    /// Local address each round's listener binds
    pub reply_addr: SocketAddr,
    /// Log progress every this many completed rounds
    pub progress_every: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            target_rounds: 1000,
            round_timeout: Duration::from_secs(5),
            max_attempts_per_round: None,
            reply_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 2021)),
            progress_every: 25,
        }
    }
}

/// Totals for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Rounds whose listener signalled readiness
    pub completed: u64,
    /// Attempts dispatched, including retries
    pub attempts: u64,
    /// Attempts abandoned at the deadline
    pub timeouts: u64,
    /// Attempts whose listener reported a socket failure
    pub listener_failures: u64,
    /// Wall time of the run
    pub elapsed: Duration,
}

/// Runs the query/response loop.
pub struct RoundCoordinator {
    config: CoordinatorConfig,
    issuer: Arc<dyn QueryIssuer>,
    pipeline: Arc<TrustPipeline>,
    metrics: Arc<dyn MetricsSink>,
}

impl RoundCoordinator {
    /// Assemble a coordinator.
    pub fn new(
        config: CoordinatorConfig,
        issuer: Arc<dyn QueryIssuer>,
        pipeline: Arc<TrustPipeline>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            config,
            issuer,
            pipeline,
            metrics,
        }
    }

    /// Run until `target_rounds` rounds have completed.
    ///
    /// # Errors
    ///
    /// Fails if the reply socket cannot be bound, if the issuer fails with
    /// anything but a transport error, or with [`V2xError::RoundExhausted`]
    /// when a round exceeds its attempt budget.
    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let mut summary = RunSummary::default();
        let mut attempt: u32 = 0;

        info!(
            rounds = self.config.target_rounds,
            timeout_ms = self.config.round_timeout.as_millis(),
            reply = %self.config.reply_addr,
            "starting rounds"
        );

        while summary.completed < self.config.target_rounds {
            let number = summary.completed;
            attempt += 1;
            if let Some(max) = self.config.max_attempts_per_round {
                if attempt > max {
                    return Err(V2xError::RoundExhausted {
                        round: number,
                        attempts: max,
                    });
                }
            }
            summary.attempts += 1;

            let mut round = Round::dispatch(number, attempt, self.config.round_timeout);
            match self.attempt(&round).await? {
                Some(ListenerExit::Classified { verdict, .. }) => {
                    round.complete();
                    summary.completed += 1;
                    attempt = 0;
                    debug!(round = number, outcome = %verdict.outcome, "round completed");
                    if self.config.progress_every > 0
                        && summary.completed % self.config.progress_every == 0
                    {
                        info!(
                            completed = summary.completed,
                            target = self.config.target_rounds,
                            "progress"
                        );
                    }
                }
                Some(ListenerExit::Failed { reason, .. }) => {
                    summary.listener_failures += 1;
                    warn!(round = number, attempt, %reason, "listener failed, retrying round");
                }
                None => {
                    round.time_out();
                    summary.timeouts += 1;
                    warn!(round = number, attempt, "round timed out, retrying");
                }
            }
        }

        summary.elapsed = started.elapsed();
        info!(
            completed = summary.completed,
            attempts = summary.attempts,
            timeouts = summary.timeouts,
            elapsed_ms = summary.elapsed.as_millis(),
            "all rounds completed"
        );
        Ok(summary)
    }

    /// One attempt. `None` means the deadline passed without a signal.
    async fn attempt(&self, round: &Round) -> Result<Option<ListenerExit>> {
        let socket = UdpSocket::bind(self.config.reply_addr).await?;
        let reply_addr = socket.local_addr()?;

        let (ready, mut ready_rx) = ReadySignal::channel();
        let (abandon_tx, abandon_rx) = oneshot::channel::<()>();
        let handle = ResponseListener::new(
            socket,
            round.number,
            Arc::clone(&self.pipeline),
            Arc::clone(&self.metrics),
            ready,
            abandon_rx,
        )
        .spawn();

        let ctx = RoundContext {
            round: round.number,
            attempt: round.attempt,
            reply_addr,
        };
        let send_started = Instant::now();
        match self.issuer.send(&ctx).await {
            Ok(()) => self.metrics.record_send(round.number, send_started.elapsed()),
            // The deadline retries the round.
            Err(e) if e.is_transport() => {
                warn!(round = round.number, error = %e, "query dispatch failed");
            }
            Err(e) => {
                drop(abandon_tx);
                if let Err(join) = handle.await {
                    warn!(round = round.number, error = %join, "listener task failed");
                }
                return Err(e);
            }
        }

        let deadline = tokio::time::Instant::from_std(round.deadline);
        let signalled = tokio::time::timeout_at(deadline, &mut ready_rx).await;

        // The listener owns the reply socket; it must be gone before the next bind.
        drop(abandon_tx);
        if let Err(e) = handle.await {
            warn!(round = round.number, error = %e, "listener task failed");
        }

        match signalled {
            Ok(Ok(exit)) => Ok(Some(exit)),
            Ok(Err(_)) => {
                warn!(round = round.number, "listener exited without signalling");
                Ok(None)
            }
            // A response may have been classified just as the deadline hit.
            Err(_) => Ok(ready_rx.try_recv().ok()),
        }
    }
}
