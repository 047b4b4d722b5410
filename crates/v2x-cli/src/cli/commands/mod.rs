//! Command implementations.

pub mod filter;
pub mod pki;
pub mod query;
pub mod respond;

use crate::output::OutputFormat;
use v2x_trust::TestbedConfig;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Loaded testbed configuration
    pub config: TestbedConfig,

    /// Output format
    pub output: OutputFormat,
}
