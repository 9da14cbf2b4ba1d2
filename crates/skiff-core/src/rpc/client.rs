//! Stream orchestration for the `up` operations.
//!
//! Both streaming operations share one fan-in shape:
//!
//! ```text
//! network ──► receive loop ──► message channel ──► forwarder ──► caller `out`
//!                 ▲                                    │
//!     send loop ──┘ (up_stream only)                   └─ summaries only
//! ```
//!
//! Every loop runs on its own task and watches the session scope, a child of
//! the caller's cancellation token. The calling task joins all of them
//! before it returns, so nothing outlives the call and `out` is closed
//! exactly once: when the last owner of the sender drops it.

use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::proto::{BuildRequest, UpMessage, UpSummary};
use super::transport::{Connector, GrpcConnector, InboundStream, Transport};
use crate::error::ClientError;
use crate::version::VersionInfo;

/// Messages buffered between the receive loop and the forwarder.
const RECEIVE_BUFFER: usize = 2;

/// Requests buffered between the send loop and the transport.
const SEND_BUFFER: usize = 8;

const GET_VERSION: &str = "get_version";
const UP_BUILD: &str = "up_build";
const UP_STREAM: &str = "up_stream";

/// Client for the skiff server. Each operation opens its own connection
/// and closes it before returning.
#[derive(Debug, Clone)]
pub struct Client<C = GrpcConnector> {
    connector: C,
}

impl<C: Connector> Client<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    /// Ask the server for its version.
    pub async fn version(&self) -> Result<VersionInfo, ClientError> {
        let never = CancellationToken::new();
        let mut session = Session::open(&self.connector, &never, GET_VERSION).await?;
        let version = session.transport.get_version().await.map_err(|source| {
            ClientError::Rpc {
                op: GET_VERSION,
                source,
            }
        })?;
        Ok(VersionInfo::from(version))
    }

    /// Submit one build request and relay every stage summary the server
    /// streams back into `out` until end-of-stream.
    ///
    /// Summaries already delivered stay delivered when the stream later
    /// fails. `out` is closed when this returns, whatever the outcome.
    /// Dropping the receiving half of `out` ends the session early with
    /// `Ok(())`.
    pub async fn up_build(
        &self,
        cancel: &CancellationToken,
        request: BuildRequest,
        out: mpsc::Sender<UpSummary>,
    ) -> Result<(), ClientError> {
        let mut session = Session::open(&self.connector, cancel, UP_BUILD).await?;
        let scope = session.scope.clone();

        let inbound = open_call(
            UP_BUILD,
            &scope,
            session.transport.up_build(UpMessage::request(request)),
        )
        .await?;

        let (messages_tx, messages_rx) = mpsc::channel(RECEIVE_BUFFER);
        let receiver = tokio::spawn(receive_messages(
            UP_BUILD,
            inbound,
            messages_tx,
            scope.clone(),
        ));

        let forwarded = forward_summaries(messages_rx, out, scope.clone()).await;
        let received = join(UP_BUILD, receiver).await;
        drop(session);

        settle(UP_BUILD, forwarded, Ok(()), received.map(drop))
    }

    /// Duplex build: send every request from `requests` while relaying the
    /// summaries the server streams back into `out`.
    ///
    /// The send side is closed once `requests` ends. The call completes when
    /// the server ends its stream and the send loop has finished, or as soon
    /// as either direction fails. At most one error is returned; a send-side
    /// failure wins over whatever the receive side saw afterwards.
    pub async fn up_stream(
        &self,
        cancel: &CancellationToken,
        requests: mpsc::Receiver<BuildRequest>,
        out: mpsc::Sender<UpSummary>,
    ) -> Result<(), ClientError> {
        let mut session = Session::open(&self.connector, cancel, UP_STREAM).await?;
        let scope = session.scope.clone();
        // Fired when the receive loop exits, for any reason.
        let server_done = CancellationToken::new();

        let (outbound_tx, outbound_rx) = mpsc::channel(SEND_BUFFER);
        // The send loop starts before the call is open: some servers hold
        // back response headers until the first request arrives.
        let sender = tokio::spawn(send_requests(
            UP_STREAM,
            requests,
            outbound_tx,
            scope.clone(),
            server_done.clone(),
        ));

        let opened = open_call(
            UP_STREAM,
            &scope,
            session.transport.up_stream(ReceiverStream::new(outbound_rx)),
        )
        .await;
        let inbound = match opened {
            Ok(inbound) => inbound,
            Err(err) => {
                scope.cancel();
                let _ = join(UP_STREAM, sender).await;
                return Err(err);
            }
        };

        let (messages_tx, messages_rx) = mpsc::channel(RECEIVE_BUFFER);
        let receiver = {
            let scope = scope.clone();
            let server_done = server_done.clone();
            tokio::spawn(async move {
                let _done = server_done.drop_guard();
                receive_messages(UP_STREAM, inbound, messages_tx, scope).await
            })
        };
        let forwarder = tokio::spawn(forward_summaries(messages_rx, out, scope.clone()));

        let sent = join(UP_STREAM, sender).await;
        if sent.is_err() {
            scope.cancel();
        }
        let received = join(UP_STREAM, receiver).await;
        let forwarded = match forwarder.await {
            Ok(forwarded) => forwarded,
            Err(source) => {
                return Err(ClientError::Task {
                    op: UP_STREAM,
                    source,
                });
            }
        };
        drop(session);

        settle(UP_STREAM, forwarded, sent.map(drop), received.map(drop))
    }
}

/// One connection plus the cancellation scope of the call using it.
struct Session<T: Transport> {
    op: &'static str,
    transport: T,
    scope: CancellationToken,
}

impl<T: Transport> Session<T> {
    async fn open<C>(
        connector: &C,
        parent: &CancellationToken,
        op: &'static str,
    ) -> Result<Self, ClientError>
    where
        C: Connector<Transport = T>,
    {
        let scope = parent.child_token();
        let transport = tokio::select! {
            biased;
            _ = scope.cancelled() => return Err(ClientError::Cancelled { op }),
            connected = connector.connect() => connected?,
        };
        debug!(op, "session opened");
        Ok(Self {
            op,
            transport,
            scope,
        })
    }
}

impl<T: Transport> Drop for Session<T> {
    /// Releases the connection on every exit path and stops anything still
    /// watching the scope.
    fn drop(&mut self) {
        self.scope.cancel();
        debug!(op = self.op, "session closed");
    }
}

/// Await the call that opens a stream, giving up if the scope is cancelled.
async fn open_call<F>(
    op: &'static str,
    scope: &CancellationToken,
    call: F,
) -> Result<InboundStream, ClientError>
where
    F: Future<Output = Result<InboundStream, tonic::Status>>,
{
    tokio::select! {
        biased;
        _ = scope.cancelled() => Err(ClientError::Cancelled { op }),
        opened = call => opened.map_err(|source| ClientError::Rpc { op, source }),
    }
}

/// Read server messages until end-of-stream and push them into `messages`.
///
/// Returns how many messages were received. A closed `messages` channel
/// means nobody is listening any more and ends the loop quietly.
async fn receive_messages(
    op: &'static str,
    mut inbound: InboundStream,
    messages: mpsc::Sender<UpMessage>,
    scope: CancellationToken,
) -> Result<usize, ClientError> {
    let mut received = 0;
    loop {
        let next = tokio::select! {
            biased;
            _ = scope.cancelled() => return Err(ClientError::Cancelled { op }),
            next = inbound.next() => next,
        };
        let message = match next {
            None => {
                debug!(op, received, "server closed the stream");
                return Ok(received);
            }
            Some(Err(source)) => return Err(ClientError::Receive { op, source }),
            Some(Ok(message)) => message,
        };
        received += 1;

        tokio::select! {
            biased;
            _ = scope.cancelled() => return Err(ClientError::Cancelled { op }),
            sent = messages.send(message) => {
                if sent.is_err() {
                    return Ok(received);
                }
            }
        }
    }
}

/// Drain `requests` onto the outbound stream. Dropping `outbound` on return
/// closes the send side.
async fn send_requests(
    op: &'static str,
    mut requests: mpsc::Receiver<BuildRequest>,
    outbound: mpsc::Sender<UpMessage>,
    scope: CancellationToken,
    server_done: CancellationToken,
) -> Result<usize, ClientError> {
    let mut sent = 0;
    loop {
        let request = tokio::select! {
            biased;
            _ = scope.cancelled() => return Err(ClientError::Cancelled { op }),
            _ = server_done.cancelled() => return Ok(sent),
            next = requests.recv() => match next {
                Some(request) => request,
                None => {
                    debug!(op, sent, "request sequence ended, closing send side");
                    return Ok(sent);
                }
            },
        };

        tokio::select! {
            biased;
            _ = scope.cancelled() => return Err(ClientError::Cancelled { op }),
            _ = server_done.cancelled() => return Ok(sent),
            result = outbound.send(UpMessage::request(request)) => {
                result.map_err(|_| ClientError::Send { op })?;
            }
        }
        sent += 1;
    }
}

/// How the forwarder stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Forwarded {
    /// The message channel closed: the receive loop is done.
    Drained,
    /// The caller dropped its receiver.
    ConsumerGone,
    /// The session scope was cancelled while waiting.
    Cancelled,
}

/// Relay the summaries among `messages` to the caller. Other payloads are
/// not progress and are skipped.
async fn forward_summaries(
    mut messages: mpsc::Receiver<UpMessage>,
    out: mpsc::Sender<UpSummary>,
    scope: CancellationToken,
) -> Forwarded {
    loop {
        let message = tokio::select! {
            biased;
            next = messages.recv() => match next {
                Some(message) => message,
                None => return Forwarded::Drained,
            },
            _ = scope.cancelled() => return Forwarded::Cancelled,
        };
        let Some(summary) = message.into_summary() else {
            continue;
        };

        tokio::select! {
            biased;
            _ = scope.cancelled() => return Forwarded::Cancelled,
            sent = out.send(summary) => {
                if sent.is_err() {
                    debug!("summary consumer went away, ending session");
                    scope.cancel();
                    return Forwarded::ConsumerGone;
                }
            }
        }
    }
}

async fn join<T>(
    op: &'static str,
    handle: JoinHandle<Result<T, ClientError>>,
) -> Result<T, ClientError> {
    handle
        .await
        .map_err(|source| ClientError::Task { op, source })?
}

/// Pick the single outcome of a session: a consumer that left early is not
/// a failure, otherwise the send side's error wins over the receive side's.
/// A forwarder cut short by cancellation is never a success, even when both
/// loops finished cleanly: summaries were left undelivered.
fn settle(
    op: &'static str,
    forwarded: Forwarded,
    sent: Result<(), ClientError>,
    received: Result<(), ClientError>,
) -> Result<(), ClientError> {
    match forwarded {
        Forwarded::ConsumerGone => Ok(()),
        Forwarded::Drained => {
            sent?;
            received
        }
        Forwarded::Cancelled => {
            sent?;
            received?;
            Err(ClientError::Cancelled { op })
        }
    }
}
