//! v2x - V2X trust-verification testbed
//!
//! Runs querier and responder roles, mints pseudonym certificates and
//! publishes signed-record filters.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    v2x_cli::run().await
}
