//! Trust decision engine and round harness for the V2X testbed.
//!
//! The engine classifies a response datagram by layering outer signature and
//! certificate checks, a revocation-list lookup and a signed-record filter
//! over a nested inner record ([`TrustPipeline`]). The harness drives
//! query/response rounds with a per-round listener, a one-shot readiness
//! signal and timeout-based retry ([`RoundCoordinator`]).

pub mod config;
pub mod coordinator;
pub mod crypto;
pub mod filter;
pub mod issuer;
pub mod listener;
pub mod metrics;
pub mod pipeline;
pub mod pki;
pub mod responder;
pub mod revocation;
pub mod scenario;

pub use config::TestbedConfig;
pub use coordinator::{CoordinatorConfig, RoundCoordinator, RunSummary};
pub use crypto::{Certificate, Credentials, Signer, TrustVerifier};
pub use filter::SignedRecordFilter;
pub use issuer::{DatagramIssuer, QueryIssuer, RoundContext};
pub use listener::{ListenerExit, ReadySignal, ResponseListener};
pub use metrics::{MetricsSink, OutcomeTally, TallySummary};
pub use pipeline::{InnerCheck, PipelinePolicy, Stage, TrustPipeline, Verdict};
pub use pki::{CertificateStore, KeyId, OpensslPki};
pub use responder::{Responder, ResponderConfig};
pub use revocation::RevocationRegistry;
pub use scenario::Scenario;
