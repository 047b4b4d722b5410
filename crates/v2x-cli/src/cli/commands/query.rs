//! `v2x query` - run rounds as the querying participant.

use anyhow::{Context as _, Result};
use std::sync::Arc;
use tracing::info;

use super::Context;
use crate::cli::args::QueryArgs;
use crate::output;
use v2x_trust::{
    Certificate, DatagramIssuer, OutcomeTally, RevocationRegistry, RoundCoordinator,
    TrustPipeline, TrustVerifier,
};

pub async fn execute(ctx: Context, args: QueryArgs) -> Result<()> {
    let mut config = ctx.config;
    if let Some(scenario) = args.scenario {
        config.scenario = scenario.into();
    }
    if let Some(timeout) = args.timeout {
        config.round_timeout_secs = timeout;
    }
    if args.max_attempts.is_some() {
        config.max_attempts_per_round = args.max_attempts;
    }
    config.validate()?;

    let auth = &config.auth;
    let ca_path = auth.ca_certificate_path();
    let ca = Certificate::load(&ca_path)
        .with_context(|| format!("loading authority certificate {}", ca_path.display()))?;

    let registry = RevocationRegistry::new(auth.revocation_list_path());
    if !args.keep_revocations {
        registry.reset().await?;
    }
    for path in &args.revoke {
        let cert = Certificate::load(path)
            .with_context(|| format!("loading certificate to revoke {}", path.display()))?;
        registry.revoke(cert.encoded()).await?;
        info!(subject = %cert.subject(), "pre-revoked certificate");
    }

    let policy = config
        .policy()
        .with_context(|| format!("preparing scenario {}", config.scenario))?;
    let pipeline = Arc::new(TrustPipeline::new(
        TrustVerifier::new(ca),
        registry,
        policy,
        config.expected_answer.clone(),
    ));

    let mut issuer = DatagramIssuer::multicast(config.group_addr());
    if config.scenario.is_signed() {
        let own = auth.own_id();
        let credentials = auth
            .store()
            .credentials(&own)
            .with_context(|| format!("loading credentials for {own}"))?;
        issuer = issuer.signed(Arc::new(credentials));
    }

    let tally = Arc::new(OutcomeTally::new());
    let coordinator = RoundCoordinator::new(
        config.coordinator(args.rounds),
        Arc::new(issuer),
        pipeline,
        tally.clone(),
    );
    let run = coordinator.run().await?;

    output::print_run(ctx.output, config.scenario, &run, &tally.summary())
}
