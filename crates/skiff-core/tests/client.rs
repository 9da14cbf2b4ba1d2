mod support;

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tonic::Status;

use skiff_core::error::ClientError;
use skiff_core::rpc::{BuildRequest, Client, StatusCode, UpMessage, UpSummary};

use support::{FakeServer, collect, fake_server, next_request};

const DEADLINE: Duration = Duration::from_secs(5);

fn request(app: &str) -> BuildRequest {
    BuildRequest {
        app_name: app.to_string(),
        namespace: "default".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn version_comes_from_the_server() {
    let (connector, _server) = fake_server(1);
    let client = Client::new(connector.with_version("v9.9.9"));

    let version = client.version().await.unwrap();
    assert_eq!(version.sem_ver, "v9.9.9");
    assert_eq!(version.git_commit, "fake");
}

#[tokio::test]
async fn up_build_empty_stream_closes_output() {
    let (connector, server) = fake_server(1);
    drop(server.replies);
    let client = Client::new(connector);

    let (out_tx, out_rx) = mpsc::channel(4);
    let result = timeout(
        DEADLINE,
        client.up_build(&CancellationToken::new(), request("web"), out_tx),
    )
    .await
    .expect("up_build hung");

    assert!(result.is_ok());
    assert!(collect(out_rx).await.is_empty());
}

#[tokio::test]
async fn up_build_sends_the_request_once() {
    let (connector, server) = fake_server(1);
    let FakeServer {
        replies,
        mut requests,
    } = server;
    let client = Client::new(connector);

    let (out_tx, _out_rx) = mpsc::channel(4);
    let done = tokio::spawn(async move {
        client
            .up_build(&CancellationToken::new(), request("web"), out_tx)
            .await
    });

    let sent = next_request(&mut requests).await.expect("no request sent");
    assert_eq!(sent.app_name, "web");
    drop(replies);
    assert!(done.await.unwrap().is_ok());
    assert!(next_request(&mut requests).await.is_none());
}

#[tokio::test]
async fn up_build_delivers_summaries_before_stream_error() {
    let (connector, server) = fake_server(4);
    server.reply("build", StatusCode::Pending).await;
    server.reply("build", StatusCode::Success).await;
    server.fail(Status::internal("disk full")).await;
    drop(server);
    let client = Client::new(connector);

    let (out_tx, out_rx) = mpsc::channel(8);
    let result = timeout(
        DEADLINE,
        client.up_build(&CancellationToken::new(), request("web"), out_tx),
    )
    .await
    .expect("up_build hung");

    let summaries = collect(out_rx).await;
    assert_eq!(
        summaries,
        vec![
            UpSummary::new("build", StatusCode::Pending),
            UpSummary::new("build", StatusCode::Success),
        ]
    );
    let err = result.unwrap_err();
    assert!(matches!(err, ClientError::Receive { op: "up_build", .. }));
    assert!(err.to_string().starts_with("rpc error handling up_build recv:"));
}

#[tokio::test]
async fn up_build_ends_quietly_when_consumer_leaves() {
    let (connector, server) = fake_server(4);
    server.reply("build", StatusCode::Pending).await;
    let client = Client::new(connector);

    // The server keeps its end open; only the consumer leaving can end this.
    let (out_tx, out_rx) = mpsc::channel(1);
    drop(out_rx);
    let result = timeout(
        DEADLINE,
        client.up_build(&CancellationToken::new(), request("web"), out_tx),
    )
    .await
    .expect("up_build did not notice the consumer leaving");

    assert!(result.is_ok());
    drop(server);
}

#[tokio::test]
async fn up_build_cancelled_with_summaries_undelivered_is_an_error() {
    let (connector, server) = fake_server(4);
    for stage in ["build", "test", "push", "deploy"] {
        server.reply(stage, StatusCode::Success).await;
    }
    drop(server);
    let client = Client::new(connector);
    let cancel = CancellationToken::new();

    // The server has finished, but nobody reads `out` past its first slot.
    let (out_tx, out_rx) = mpsc::channel(1);
    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        })
    };
    let result = timeout(DEADLINE, client.up_build(&cancel, request("web"), out_tx))
        .await
        .expect("cancel not honoured");
    canceller.await.unwrap();

    let err = result.unwrap_err();
    assert!(matches!(err, ClientError::Cancelled { op: "up_build" }));
    assert_eq!(
        collect(out_rx).await,
        vec![UpSummary::new("build", StatusCode::Success)]
    );
}

#[tokio::test]
async fn up_build_cancelled_while_waiting() {
    let (connector, server) = fake_server(1);
    let client = Client::new(connector);
    let cancel = CancellationToken::new();

    let (out_tx, out_rx) = mpsc::channel(1);
    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cancel.cancel();
        })
    };
    let result = timeout(DEADLINE, client.up_build(&cancel, request("web"), out_tx))
        .await
        .expect("cancel not honoured");
    canceller.await.unwrap();

    assert!(result.unwrap_err().is_cancelled());
    assert!(collect(out_rx).await.is_empty());
    drop(server);
}

#[tokio::test]
async fn up_build_with_cancelled_token_never_connects() {
    let (connector, server) = fake_server(1);
    let FakeServer {
        replies,
        mut requests,
    } = server;
    drop(replies);
    let client = Client::new(connector);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let (out_tx, _out_rx) = mpsc::channel(1);
    let err = client
        .up_build(&cancel, request("web"), out_tx)
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Cancelled { op: "up_build" }));
    drop(client);
    assert!(next_request(&mut requests).await.is_none());
}

#[tokio::test]
async fn up_stream_relays_both_directions() {
    let (connector, server) = fake_server(4);
    let client = Client::new(connector);

    let (requests_tx, requests_rx) = mpsc::channel(4);
    requests_tx.send(request("api")).await.unwrap();
    requests_tx.send(request("web")).await.unwrap();
    drop(requests_tx);

    // Answer each request with one summary, then end the stream.
    let server_task = tokio::spawn(async move {
        let mut server = server;
        let mut seen = Vec::new();
        while let Some(request) = server.next_request().await {
            server
                .reply(&format!("{} build", request.app_name), StatusCode::Success)
                .await;
            seen.push(request.app_name);
            if seen.len() == 2 {
                break;
            }
        }
        seen
    });

    let (out_tx, out_rx) = mpsc::channel(8);
    let result = timeout(
        DEADLINE,
        client.up_stream(&CancellationToken::new(), requests_rx, out_tx),
    )
    .await
    .expect("up_stream hung");

    assert!(result.is_ok());
    assert_eq!(server_task.await.unwrap(), vec!["api", "web"]);
    let stages: Vec<_> = collect(out_rx)
        .await
        .into_iter()
        .map(|s| s.stage_desc)
        .collect();
    assert_eq!(stages, vec!["api build", "web build"]);
}

#[tokio::test]
async fn up_stream_cancelled_mid_send_returns_promptly() {
    let (connector, server) = fake_server(1);
    let client = Client::new(connector);
    let cancel = CancellationToken::new();

    // Requests never end and the server never answers.
    let (requests_tx, requests_rx) = mpsc::channel(1);
    requests_tx.send(request("web")).await.unwrap();

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cancel.cancel();
        })
    };
    let (out_tx, out_rx) = mpsc::channel(1);
    let result = timeout(DEADLINE, client.up_stream(&cancel, requests_rx, out_tx))
        .await
        .expect("cancel not honoured");
    canceller.await.unwrap();

    let err = result.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.operation(), Some("up_stream"));
    assert!(collect(out_rx).await.is_empty());
    drop((requests_tx, server));
}

#[tokio::test]
async fn up_stream_stops_sending_once_server_ends() {
    let (connector, server) = fake_server(1);
    drop(server.replies);
    let client = Client::new(connector);

    // The request side stays open; the server ending must still finish the call.
    let (requests_tx, requests_rx) = mpsc::channel(1);
    let (out_tx, out_rx) = mpsc::channel(1);
    let result = timeout(
        DEADLINE,
        client.up_stream(&CancellationToken::new(), requests_rx, out_tx),
    )
    .await
    .expect("up_stream kept waiting for requests");

    assert!(result.is_ok());
    assert!(collect(out_rx).await.is_empty());
    drop(requests_tx);
}

#[tokio::test]
async fn up_stream_delivers_summaries_before_stream_error() {
    let (connector, server) = fake_server(4);
    server.reply("build", StatusCode::Pending).await;
    server.fail(Status::internal("boom")).await;
    drop(server);
    let client = Client::new(connector);

    let (requests_tx, requests_rx) = mpsc::channel(1);
    drop(requests_tx);
    let (out_tx, out_rx) = mpsc::channel(4);
    let result = timeout(
        DEADLINE,
        client.up_stream(&CancellationToken::new(), requests_rx, out_tx),
    )
    .await
    .expect("up_stream hung");

    assert_eq!(
        collect(out_rx).await,
        vec![UpSummary::new("build", StatusCode::Pending)]
    );
    let err = result.unwrap_err();
    assert!(matches!(err, ClientError::Receive { op: "up_stream", .. }));
    assert!(err.to_string().starts_with("rpc error handling up_stream recv:"));
}

#[tokio::test]
async fn up_stream_send_failure_wins_over_receive_side() {
    let (connector, server) = fake_server(1);
    let client = Client::new(connector.closing_send_side());

    // Keep feeding requests; once the send side is gone the next one fails.
    let (requests_tx, requests_rx) = mpsc::channel(1);
    let feeder = tokio::spawn(async move {
        for _ in 0..64 {
            if requests_tx.send(request("web")).await.is_err() {
                break;
            }
        }
    });

    // The server stays open, so only the send failure can end the call.
    let (out_tx, out_rx) = mpsc::channel(1);
    let result = timeout(
        DEADLINE,
        client.up_stream(&CancellationToken::new(), requests_rx, out_tx),
    )
    .await
    .expect("send failure did not end the call");
    feeder.await.unwrap();

    assert!(matches!(
        result,
        Err(ClientError::Send { op: "up_stream" })
    ));
    assert!(collect(out_rx).await.is_empty());
    drop(server);
}

#[tokio::test]
async fn up_stream_skips_non_summary_replies() {
    let (connector, server) = fake_server(4);
    server
        .replies
        .send(Ok(UpMessage::request(request("echo"))))
        .await
        .unwrap();
    server.reply("deploy", StatusCode::Failure).await;
    drop(server);
    let client = Client::new(connector);

    let (requests_tx, requests_rx) = mpsc::channel(1);
    drop(requests_tx);
    let (out_tx, out_rx) = mpsc::channel(4);
    let result = timeout(
        DEADLINE,
        client.up_stream(&CancellationToken::new(), requests_rx, out_tx),
    )
    .await
    .expect("up_stream hung");

    assert!(result.is_ok());
    assert_eq!(
        collect(out_rx).await,
        vec![UpSummary::new("deploy", StatusCode::Failure)]
    );
}
