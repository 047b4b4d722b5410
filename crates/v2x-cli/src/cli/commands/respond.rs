//! `v2x respond` - answer queries as a benign or compromised participant.

use anyhow::{Context as _, Result};

use super::Context;
use crate::cli::args::RespondArgs;
use v2x_trust::{Certificate, Responder, ResponderConfig, Scenario, TrustVerifier};

pub async fn execute(ctx: Context, args: RespondArgs) -> Result<()> {
    let config = ctx.config;
    let scenario: Scenario = args.scenario.map_or(config.scenario, Into::into);
    let auth = &config.auth;
    let store = auth.store();

    let pseudonyms = if scenario.is_signed() {
        store
            .pseudonyms(&args.group, args.pseudonyms)
            .with_context(|| format!("loading {} pseudonyms of {}", args.pseudonyms, args.group))?
    } else {
        Vec::new()
    };

    let verifier = if scenario.is_signed() && !args.no_verify {
        let ca_path = auth.ca_certificate_path();
        let ca = Certificate::load(&ca_path)
            .with_context(|| format!("loading authority certificate {}", ca_path.display()))?;
        Some(TrustVerifier::new(ca))
    } else {
        None
    };

    let authority = if scenario == Scenario::Nested {
        let id = auth.authority_id();
        Some(
            store
                .signer(&id)
                .with_context(|| format!("loading signing key for {id}"))?,
        )
    } else {
        None
    };

    let responder = Responder::new(
        ResponderConfig {
            scenario,
            answer: args
                .record
                .unwrap_or_else(|| args.answer.record().to_string()),
            rotate_every: args.rate,
            reply_port: config.unicast_port,
        },
        pseudonyms,
        verifier,
        authority,
    )?;

    responder.serve(config.group_addr()).await?;
    Ok(())
}
