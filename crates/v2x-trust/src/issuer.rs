//! Query dispatch.

use async_trait::async_trait;
use chrono::Utc;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::crypto::Credentials;
use v2x_core::{Envelope, Field, Result, QUERY_TOKEN};

/// Everything an issuer needs to know about the round it is querying for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundContext {
    /// Logical round number
    pub round: u64,
    /// Attempt at this round, starting at 1
    pub attempt: u32,
    /// Where the round's listener is waiting for the reply
    pub reply_addr: SocketAddr,
}

/// Sends the query that opens a round.
///
/// The coordinator stays oblivious to transport and scenario details; an
/// issuer may broadcast, unicast, or (in tests) answer the round itself.
#[async_trait]
pub trait QueryIssuer: Send + Sync {
    /// Dispatch the query for `ctx.round`.
    async fn send(&self, ctx: &RoundContext) -> Result<()>;
}

/// Sends CBOR query envelopes over UDP, optionally signed.
#[derive(Debug, Clone)]
pub struct DatagramIssuer {
    target: SocketAddr,
    credentials: Option<Arc<Credentials>>,
}

impl DatagramIssuer {
    /// Send unsigned queries to `target`.
    #[must_use]
    pub const fn new(target: SocketAddr) -> Self {
        Self {
            target,
            credentials: None,
        }
    }

    /// Send to a multicast group.
    #[must_use]
    pub const fn multicast(group: SocketAddrV4) -> Self {
        Self::new(SocketAddr::V4(group))
    }

    /// Sign every query with `credentials`.
    #[must_use]
    pub fn signed(mut self, credentials: Arc<Credentials>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Build the query envelope for a round.
    pub fn build_query(&self, ctx: &RoundContext) -> Result<Envelope> {
        let mut query = Envelope::new()
            .with(Field::Query, QUERY_TOKEN)
            .with(Field::Time, Utc::now().timestamp_millis().to_string())
            .with(Field::TestNumber, ctx.round.to_string());
        if let Some(creds) = &self.credentials {
            query.insert(Field::Certificate, creds.certificate.encoded());
            query.insert(Field::Hash, creds.signer.sign_payload(QUERY_TOKEN)?);
        }
        Ok(query)
    }
}

#[async_trait]
impl QueryIssuer for DatagramIssuer {
    async fn send(&self, ctx: &RoundContext) -> Result<()> {
        let bytes = self.build_query(ctx)?.to_bytes()?;
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        if self.target.ip().is_multicast() {
            socket.set_multicast_ttl_v4(1)?;
            socket.set_multicast_loop_v4(true)?;
        }
        socket.send_to(&bytes, self.target).await?;
        debug!(
            round = ctx.round,
            attempt = ctx.attempt,
            target = %self.target,
            bytes = bytes.len(),
            "query sent"
        );
        Ok(())
    }
}
