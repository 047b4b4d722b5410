//! Core types for the V2X trust-verification testbed.
//!
//! This crate provides the foundational types shared by the testbed crates:
//!
//! - **Envelope**: the CBOR wire format for queries and answers, with nesting
//! - **Outcome**: the terminal classification of a response, plus timings
//! - **Round**: one attempt at a query/response round
//! - **Records**: AAAA address records in their canonical text form
//! - **Errors**: [`V2xError`] and the crate [`Result`] alias
//!
//! # Example
//!
//! ```rust,ignore
//! use v2x_core::{Envelope, Field, QUERY_TOKEN};
//!
//! let query = Envelope::new()
//!     .with(Field::Query, QUERY_TOKEN)
//!     .with(Field::TestNumber, "0");
//! let bytes = query.to_bytes()?;
//! ```

mod error;
pub mod types;

pub use error::{Result, V2xError};
pub use types::*;
