//! `v2x pki` - certificate issuance through openssl.

use anyhow::Result;

use super::Context;
use crate::cli::args::{PkiArgs, PkiCommands};
use crate::output;
use v2x_trust::{KeyId, OpensslPki};

pub fn execute(ctx: Context, args: PkiArgs) -> Result<()> {
    let pki = OpensslPki::new(ctx.config.auth.store())
        .with_program(args.openssl)
        .with_validity_days(args.days);

    match args.command {
        PkiCommands::Ca => {
            let ca = pki.create_authority()?;
            output::print_field(ctx.output, "authority", ca.subject());
            output::print_field(ctx.output, "fingerprint", ca.fingerprint());
        }
        PkiCommands::Pseudonyms { group, count } => {
            let issued = pki.issue_pseudonyms(&group, count)?;
            for (index, cert) in issued.iter().enumerate() {
                output::print_field(
                    ctx.output,
                    &format!("{group}#{index}"),
                    cert.fingerprint(),
                );
            }
        }
        PkiCommands::Authority { name } => {
            let id = name.map_or_else(|| ctx.config.auth.authority_id(), KeyId::single);
            let cert = pki.issue(&id)?;
            output::print_field(ctx.output, &id.to_string(), cert.fingerprint());
        }
    }
    Ok(())
}
