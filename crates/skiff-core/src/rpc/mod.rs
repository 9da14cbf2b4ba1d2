//! Streaming RPC client for the skiff server.
//!
//! - [`proto`]: wire messages of the `rpc.Skiff` service
//! - [`transport`]: the [`Connector`]/[`Transport`] seam and its gRPC implementation
//! - [`client`]: the session orchestrator behind `up` and `version`

pub mod client;
pub mod proto;
pub mod transport;

use std::time::Duration;

pub use client::Client;
pub use proto::{AppArchive, BuildRequest, StatusCode, UpMessage, UpSummary};
pub use transport::{Connector, GrpcConnector, GrpcTransport, InboundStream, OutboundStream, Transport};

use crate::error::ClientError;

impl Client<GrpcConnector> {
    /// Client for the server at `addr` (`host:port` or an http(s) URL).
    pub fn connect_to(addr: &str, connect_timeout: Duration) -> Result<Self, ClientError> {
        Ok(Client::new(GrpcConnector::new(addr, connect_timeout)?))
    }
}
