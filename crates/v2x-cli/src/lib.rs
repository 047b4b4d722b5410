//! # v2x-cli
//!
//! Command-line driver for the V2X trust-verification testbed.
//!
//! ## Commands
//!
//! - **query**: run N query/response rounds of a scenario and print the tally
//! - **respond**: answer queries as a benign or compromised participant
//! - **pki**: create the pseudonym authority and issue certificates via `openssl`
//! - **filter**: publish a signed-record filter or test a record against one

pub mod cli;
pub mod output;

pub use cli::run;
