//! Single-shot response listener.
//!
//! A listener owns the round's reply socket, waits for one reply to its own
//! round, runs it through the pipeline, reports metrics and signals the
//! coordinator. Replies echoing another round number are skipped unread.
//! Once a reply is accepted it is always reported, even if the round's
//! deadline passes during classification. It never signals more than once:
//! the readiness sender is consumed by the signal.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::metrics::MetricsSink;
use crate::pipeline::{TrustPipeline, Verdict};
use v2x_core::{Envelope, TimingBreakdown, MAX_DATAGRAM};

/// How a listener finished its round.
#[derive(Debug, Clone)]
pub enum ListenerExit {
    /// A response was received and classified
    Classified {
        /// Round the listener was started for
        round: u64,
        /// Pipeline decision
        verdict: Verdict,
        /// Measured timings
        timing: TimingBreakdown,
    },
    /// The socket failed before any response arrived
    Failed {
        /// Round the listener was started for
        round: u64,
        /// Socket error
        reason: String,
    },
}

/// One-shot readiness flag handed from the coordinator to a listener.
#[derive(Debug)]
pub struct ReadySignal {
    tx: oneshot::Sender<ListenerExit>,
}

impl ReadySignal {
    /// Create a signal and the receiver the coordinator waits on.
    #[must_use]
    pub fn channel() -> (Self, oneshot::Receiver<ListenerExit>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Raise the flag. Consumes the signal.
    pub fn signal(self, exit: ListenerExit) {
        if self.tx.send(exit).is_err() {
            debug!("coordinator stopped waiting before readiness signal");
        }
    }
}

/// Listener for one round attempt.
pub struct ResponseListener {
    socket: UdpSocket,
    round: u64,
    pipeline: Arc<TrustPipeline>,
    metrics: Arc<dyn MetricsSink>,
    ready: ReadySignal,
    abandon: oneshot::Receiver<()>,
}

impl ResponseListener {
    /// Build a listener. Dropping the sender half of `abandon` tells it the
    /// round was given up on.
    pub fn new(
        socket: UdpSocket,
        round: u64,
        pipeline: Arc<TrustPipeline>,
        metrics: Arc<dyn MetricsSink>,
        ready: ReadySignal,
        abandon: oneshot::Receiver<()>,
    ) -> Self {
        Self {
            socket,
            round,
            pipeline,
            metrics,
            ready,
            abandon,
        }
    }

    /// Run on the tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Receive one response and report it. Returns without signalling if the
    /// round is abandoned before a reply arrives.
    pub async fn run(self) {
        let Self {
            socket,
            round,
            pipeline,
            metrics,
            ready,
            mut abandon,
        } = self;
        let mut buf = vec![0u8; MAX_DATAGRAM];

        let (len, peer, received_at) = loop {
            let received = tokio::select! {
                biased;
                _ = &mut abandon => {
                    debug!(round, "listener abandoned before any response");
                    return;
                }
                res = socket.recv_from(&mut buf) => res,
            };

            match received {
                Ok((len, peer)) => {
                    let received_at = Instant::now();
                    match answered_round(&buf[..len]) {
                        Some(answered) if answered != round => {
                            debug!(round, answered, %peer, "ignoring reply to another round");
                        }
                        _ => break (len, peer, received_at),
                    }
                }
                Err(e) => {
                    warn!(round, error = %e, "receive failed");
                    ready.signal(ListenerExit::Failed {
                        round,
                        reason: e.to_string(),
                    });
                    return;
                }
            }
        };
        // Free the port for a retried round.
        drop(socket);

        let verdict = pipeline.process(&buf[..len]).await;
        let timing = TimingBreakdown {
            process_response: received_at.elapsed(),
            round_trip: verdict.dispatched_at_ms.and_then(elapsed_since_epoch_ms),
        };

        debug!(
            round,
            %peer,
            outcome = %verdict.outcome,
            stage = %verdict.stage,
            process_us = timing.process_response.as_micros(),
            "response classified"
        );
        metrics.record(round, verdict.outcome, &timing);
        ready.signal(ListenerExit::Classified {
            round,
            verdict,
            timing,
        });
    }
}

/// Round number echoed by a reply, if it carries a readable one.
fn answered_round(datagram: &[u8]) -> Option<u64> {
    Envelope::from_bytes(datagram).ok()?.test_number()
}

fn elapsed_since_epoch_ms(dispatched_ms: i64) -> Option<Duration> {
    let now = Utc::now().timestamp_millis();
    u64::try_from(now.checked_sub(dispatched_ms)?)
        .ok()
        .map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_pki::TestPki;
    use crate::crypto::TrustVerifier;
    use crate::metrics::OutcomeTally;
    use crate::pipeline::PipelinePolicy;
    use crate::revocation::RevocationRegistry;
    use v2x_core::{Field, Outcome, BENIGN_RECORD, MALICIOUS_RECORD};

    fn plain_pipeline(dir: &std::path::Path) -> Arc<TrustPipeline> {
        Arc::new(TrustPipeline::new(
            TrustVerifier::new(TestPki::new().ca),
            RevocationRegistry::new(dir.join("CRL-A.crl")),
            PipelinePolicy::plain(),
            BENIGN_RECORD,
        ))
    }

    #[tokio::test]
    async fn test_signals_once_with_classification() {
        let dir = tempfile::tempdir().unwrap();
        let tally = Arc::new(OutcomeTally::new());
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let (ready, ready_rx) = ReadySignal::channel();
        let (_abandon_tx, abandon_rx) = oneshot::channel();

        let handle = ResponseListener::new(
            socket,
            5,
            plain_pipeline(dir.path()),
            tally.clone(),
            ready,
            abandon_rx,
        )
        .spawn();

        let sent_ms = Utc::now().timestamp_millis().to_string();
        let answer = Envelope::new()
            .with(Field::Answer, BENIGN_RECORD)
            .with(Field::Time, sent_ms)
            .to_bytes()
            .unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(&answer, addr).await.unwrap();

        match ready_rx.await.unwrap() {
            ListenerExit::Classified {
                round,
                verdict,
                timing,
            } => {
                assert_eq!(round, 5);
                assert_eq!(verdict.outcome, Outcome::TrustedBenign);
                assert!(timing.round_trip.is_some());
            }
            ListenerExit::Failed { reason, .. } => panic!("listener failed: {reason}"),
        }
        handle.await.unwrap();
        assert_eq!(tally.count(Outcome::TrustedBenign), 1);
    }

    #[tokio::test]
    async fn test_reply_to_previous_round_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let tally = Arc::new(OutcomeTally::new());
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let (ready, ready_rx) = ReadySignal::channel();
        let (_abandon_tx, abandon_rx) = oneshot::channel();

        let handle = ResponseListener::new(
            socket,
            4,
            plain_pipeline(dir.path()),
            tally.clone(),
            ready,
            abandon_rx,
        )
        .spawn();

        let stale = Envelope::new()
            .with(Field::Answer, MALICIOUS_RECORD)
            .with(Field::TestNumber, "3")
            .to_bytes()
            .unwrap();
        let current = Envelope::new()
            .with(Field::Answer, BENIGN_RECORD)
            .with(Field::TestNumber, "4")
            .to_bytes()
            .unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(&stale, addr).await.unwrap();
        client.send_to(&current, addr).await.unwrap();

        match ready_rx.await.unwrap() {
            ListenerExit::Classified { round, verdict, .. } => {
                assert_eq!(round, 4);
                assert_eq!(verdict.outcome, Outcome::TrustedBenign);
                assert_eq!(verdict.test_number, Some(4));
            }
            ListenerExit::Failed { reason, .. } => panic!("listener failed: {reason}"),
        }
        handle.await.unwrap();
        assert_eq!(tally.total(), 1);
        assert_eq!(tally.count(Outcome::TrustedMalicious), 0);
    }

    #[tokio::test]
    async fn test_abandoned_listener_exits_silently_and_frees_port() {
        let dir = tempfile::tempdir().unwrap();
        let tally = Arc::new(OutcomeTally::new());
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let (ready, mut ready_rx) = ReadySignal::channel();
        let (abandon_tx, abandon_rx) = oneshot::channel::<()>();

        let handle = ResponseListener::new(
            socket,
            0,
            plain_pipeline(dir.path()),
            tally.clone(),
            ready,
            abandon_rx,
        )
        .spawn();

        drop(abandon_tx);
        handle.await.unwrap();

        assert!(ready_rx.try_recv().is_err());
        assert_eq!(tally.total(), 0);
        // Same port can be bound again for the retry.
        UdpSocket::bind(addr).await.unwrap();
    }

    #[test]
    fn test_future_timestamps_have_no_round_trip() {
        let future = Utc::now().timestamp_millis() + 60_000;
        assert_eq!(elapsed_since_epoch_ms(future), None);
        assert!(elapsed_since_epoch_ms(0).is_some());
    }
}
