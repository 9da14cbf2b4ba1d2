//! In-process stand-in for the skiff server.
//!
//! A [`FakeConnector`] hands out transports that all share one scripted
//! wire. The test keeps the [`FakeServer`] end: whatever it pushes into
//! `replies` comes back to the client as the inbound stream, and every
//! message the client sends shows up on `requests`. Dropping `replies`
//! ends the inbound stream.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Status;

use skiff_core::error::ClientError;
use skiff_core::rpc::proto::{Version, up_message};
use skiff_core::rpc::{
    BuildRequest, Connector, InboundStream, OutboundStream, StatusCode, Transport, UpMessage,
    UpSummary,
};

struct Wire {
    inbound: mpsc::Receiver<Result<UpMessage, Status>>,
    requests: mpsc::UnboundedSender<UpMessage>,
}

pub struct FakeServer {
    pub replies: mpsc::Sender<Result<UpMessage, Status>>,
    pub requests: mpsc::UnboundedReceiver<UpMessage>,
}

impl FakeServer {
    pub async fn reply(&self, stage: &str, status: StatusCode) {
        self.replies
            .send(Ok(UpMessage::summary(UpSummary::new(stage, status))))
            .await
            .expect("client stopped reading replies");
    }

    pub async fn fail(&self, status: Status) {
        self.replies
            .send(Err(status))
            .await
            .expect("client stopped reading replies");
    }

    /// Next build request the client sent, if any.
    pub async fn next_request(&mut self) -> Option<BuildRequest> {
        next_request(&mut self.requests).await
    }
}

/// Next build request on `requests`, skipping other payloads.
pub async fn next_request(
    requests: &mut mpsc::UnboundedReceiver<UpMessage>,
) -> Option<BuildRequest> {
    loop {
        match requests.recv().await?.payload {
            Some(up_message::Payload::Request(request)) => return Some(request),
            _ => continue,
        }
    }
}

#[derive(Clone)]
pub struct FakeConnector {
    wire: Arc<Mutex<Option<Wire>>>,
    version: Version,
    drop_send_side: bool,
}

/// A connector plus the server end of its wire. `capacity` bounds the
/// replies the server can queue ahead of the client.
pub fn fake_server(capacity: usize) -> (FakeConnector, FakeServer) {
    let (replies_tx, replies_rx) = mpsc::channel(capacity);
    let (requests_tx, requests_rx) = mpsc::unbounded_channel();
    let connector = FakeConnector {
        wire: Arc::new(Mutex::new(Some(Wire {
            inbound: replies_rx,
            requests: requests_tx,
        }))),
        version: Version {
            sem_ver: format!("v{}", env!("CARGO_PKG_VERSION")),
            git_commit: "fake".to_string(),
            git_tree_state: "clean".to_string(),
        },
        drop_send_side: false,
    };
    let server = FakeServer {
        replies: replies_tx,
        requests: requests_rx,
    };
    (connector, server)
}

impl FakeConnector {
    pub fn with_version(mut self, sem_ver: &str) -> Self {
        self.version.sem_ver = sem_ver.to_string();
        self
    }

    /// Duplex calls drop the client's outbound stream as soon as they open,
    /// so every send after that fails.
    pub fn closing_send_side(mut self) -> Self {
        self.drop_send_side = true;
        self
    }
}

impl Connector for FakeConnector {
    type Transport = FakeTransport;

    async fn connect(&self) -> Result<FakeTransport, ClientError> {
        Ok(FakeTransport {
            wire: Arc::clone(&self.wire),
            version: self.version.clone(),
            drop_send_side: self.drop_send_side,
        })
    }
}

pub struct FakeTransport {
    wire: Arc<Mutex<Option<Wire>>>,
    version: Version,
    drop_send_side: bool,
}

impl FakeTransport {
    fn take_wire(&self) -> Result<Wire, Status> {
        self.wire
            .lock()
            .expect("wire lock poisoned")
            .take()
            .ok_or_else(|| Status::unavailable("fake wire already used"))
    }
}

impl Transport for FakeTransport {
    async fn get_version(&mut self) -> Result<Version, Status> {
        Ok(self.version.clone())
    }

    async fn up_build(&mut self, message: UpMessage) -> Result<InboundStream, Status> {
        let wire = self.take_wire()?;
        let _ = wire.requests.send(message);
        Ok(Box::pin(ReceiverStream::new(wire.inbound)))
    }

    async fn up_stream(&mut self, mut outbound: OutboundStream) -> Result<InboundStream, Status> {
        let wire = self.take_wire()?;
        if self.drop_send_side {
            drop(outbound);
            return Ok(Box::pin(ReceiverStream::new(wire.inbound)));
        }
        let requests = wire.requests;
        tokio::spawn(async move {
            while let Some(message) = outbound.next().await {
                if requests.send(message).is_err() {
                    break;
                }
            }
        });
        Ok(Box::pin(ReceiverStream::new(wire.inbound)))
    }
}

/// Drain `out` until it closes.
pub async fn collect(mut out: mpsc::Receiver<UpSummary>) -> Vec<UpSummary> {
    let mut summaries = Vec::new();
    while let Some(summary) = out.recv().await {
        summaries.push(summary);
    }
    summaries
}
