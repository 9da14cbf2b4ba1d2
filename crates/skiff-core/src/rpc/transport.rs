//! The connection seam between the orchestrator and the network.
//!
//! [`Transport`] is the bidirectional message channel pair the orchestrator
//! needs; [`Connector`] dials one. The gRPC implementations below are what
//! the CLI uses, tests plug in scripted ones.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};

use super::proto::{Empty, UpMessage, Version, methods};
use crate::error::ClientError;

/// Messages received from the server until end-of-stream or error.
pub type InboundStream = Pin<Box<dyn Stream<Item = Result<UpMessage, Status>> + Send + 'static>>;

/// Messages sent to the server. Dropping the feeding sender closes the send
/// side of the stream.
pub type OutboundStream = ReceiverStream<UpMessage>;

/// One open connection to the server.
///
/// Dropping the transport closes the connection.
pub trait Transport: Send + 'static {
    fn get_version(&mut self) -> impl Future<Output = Result<Version, Status>> + Send;

    /// Server-streaming build of a single request.
    fn up_build(
        &mut self,
        message: UpMessage,
    ) -> impl Future<Output = Result<InboundStream, Status>> + Send;

    /// Bidirectional stream: requests flow out of `outbound` while summaries
    /// flow back through the returned stream.
    fn up_stream(
        &mut self,
        outbound: OutboundStream,
    ) -> impl Future<Output = Result<InboundStream, Status>> + Send;
}

/// Establishes transports. Each client operation dials a fresh one.
pub trait Connector: Send + Sync {
    type Transport: Transport;

    fn connect(&self) -> impl Future<Output = Result<Self::Transport, ClientError>> + Send;
}

/// Dials the server over HTTP/2.
#[derive(Debug, Clone)]
pub struct GrpcConnector {
    addr: String,
    endpoint: Endpoint,
}

impl GrpcConnector {
    /// Validate `addr` (`host:port` or a full `http(s)://` URL) and prepare
    /// an endpoint. No connection is made until [`Connector::connect`].
    pub fn new(addr: &str, connect_timeout: Duration) -> Result<Self, ClientError> {
        let uri = normalize_address(addr)?;
        let endpoint = Endpoint::from_shared(uri)
            .map_err(|e| ClientError::InvalidAddress {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?
            .connect_timeout(connect_timeout);

        Ok(Self {
            addr: addr.to_string(),
            endpoint,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Connector for GrpcConnector {
    type Transport = GrpcTransport;

    async fn connect(&self) -> Result<GrpcTransport, ClientError> {
        let channel = self
            .endpoint
            .connect()
            .await
            .map_err(|e| ClientError::Connect {
                addr: self.addr.clone(),
                source: Box::new(e),
            })?;
        tracing::debug!(addr = %self.addr, "connected");
        Ok(GrpcTransport::new(channel))
    }
}

/// gRPC client for the `rpc.Skiff` service over one channel.
#[derive(Debug, Clone)]
pub struct GrpcTransport {
    inner: Grpc<Channel>,
}

impl GrpcTransport {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: Grpc::new(channel),
        }
    }

    async fn ready(&mut self) -> Result<(), Status> {
        self.inner
            .ready()
            .await
            .map_err(|e| Status::unknown(format!("service was not ready: {e}")))
    }
}

impl Transport for GrpcTransport {
    async fn get_version(&mut self) -> Result<Version, Status> {
        self.ready().await?;
        let path = PathAndQuery::from_static(methods::GET_VERSION);
        let response = self
            .inner
            .unary(Request::new(Empty {}), path, ProstCodec::default())
            .await?;
        Ok(response.into_inner())
    }

    async fn up_build(&mut self, message: UpMessage) -> Result<InboundStream, Status> {
        self.ready().await?;
        let path = PathAndQuery::from_static(methods::UP_BUILD);
        let response = self
            .inner
            .server_streaming(Request::new(message), path, ProstCodec::default())
            .await?;
        Ok(Box::pin(response.into_inner()))
    }

    async fn up_stream(&mut self, outbound: OutboundStream) -> Result<InboundStream, Status> {
        self.ready().await?;
        let path = PathAndQuery::from_static(methods::UP_STREAM);
        let response = self
            .inner
            .streaming(Request::new(outbound), path, ProstCodec::default())
            .await?;
        Ok(Box::pin(response.into_inner()))
    }
}

/// Turn `host:port` into `http://host:port` and reject anything that is not
/// an absolute http(s) URL with a host.
fn normalize_address(addr: &str) -> Result<String, ClientError> {
    let invalid = |reason: String| ClientError::InvalidAddress {
        addr: addr.to_string(),
        reason,
    };

    let trimmed = addr.trim();
    if trimmed.is_empty() {
        return Err(invalid("address is empty".to_string()));
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let parsed = url::Url::parse(&candidate).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme '{other}'"))),
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(candidate)
}
