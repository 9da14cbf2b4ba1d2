mod support;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tonic::Status;

use skiff_core::commands::{UpCommand, UpError, UpOptions};
use skiff_core::error::ClientError;
use skiff_core::progress::{LineSink, Palette};
use skiff_core::rpc::{Client, StatusCode};
use skiff_core::storage::{BuildStore, FileStore, StageStatus};

use support::{FakeConnector, FakeServer, fake_server};

const DEADLINE: Duration = Duration::from_secs(5);

fn app_dir(root: &Path, name: &str) -> std::path::PathBuf {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("Dockerfile"), "FROM scratch\n").unwrap();
    dir
}

fn command(connector: FakeConnector, state: &Path) -> UpCommand<FakeConnector> {
    UpCommand::new(
        Client::new(connector),
        Box::new(FileStore::new(state.to_path_buf())),
    )
    .with_palette(Palette::plain())
    .with_tick(Duration::from_millis(5))
}

#[tokio::test]
async fn up_renders_and_records_a_successful_build() {
    let tmp = TempDir::new().unwrap();
    let dir = app_dir(tmp.path(), "web");
    let state = tmp.path().join("state");

    let (connector, server) = fake_server(4);
    server.reply("build", StatusCode::Success).await;
    server.reply("deploy", StatusCode::Pending).await;
    server.reply("deploy", StatusCode::Success).await;
    let FakeServer {
        replies,
        mut requests,
    } = server;
    drop(replies);

    let cmd = command(connector, &state);
    let options = UpOptions::default()
        .with_app_dir(&dir)
        .with_source_ref("main@abc1234");
    let sink = Arc::new(LineSink::new(Vec::new()));
    let report = timeout(
        DEADLINE,
        cmd.execute(&CancellationToken::new(), &options, Arc::clone(&sink)),
    )
    .await
    .expect("up hung")
    .unwrap();

    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.apps, vec!["web".to_string()]);
    let mut succeeded = report.render.succeeded.clone();
    succeeded.sort();
    assert_eq!(succeeded, vec!["build", "deploy"]);
    assert!(report.warnings.is_empty());

    let request = support::next_request(&mut requests).await.unwrap();
    assert_eq!(request.app_name, "web");
    assert_eq!(request.namespace, "default");
    assert_eq!(request.source_ref, "main@abc1234");
    assert!(request.app_archive.is_some_and(|a| !a.content.is_empty()));

    let record = FileStore::new(state)
        .get_build("web", &report.build_id)
        .unwrap();
    assert_eq!(record.source_ref.as_deref(), Some("main@abc1234"));
    assert_eq!(record.stages.len(), 2);
    assert!(record.stages.iter().all(|s| s.status == StageStatus::Succeeded));
    assert!(record.error.is_none());
}

#[tokio::test]
async fn transport_error_is_reported_after_the_display() {
    let tmp = TempDir::new().unwrap();
    let dir = app_dir(tmp.path(), "web");
    let state = tmp.path().join("state");

    let (connector, server) = fake_server(4);
    server.reply("build", StatusCode::Pending).await;
    server.fail(Status::unavailable("builder restarted")).await;
    drop(server);

    let cmd = command(connector, &state);
    let options = UpOptions::default()
        .with_app_dir(&dir)
        .with_source_ref("manual");
    let report = timeout(
        DEADLINE,
        cmd.execute(
            &CancellationToken::new(),
            &options,
            Arc::new(LineSink::new(Vec::new())),
        ),
    )
    .await
    .expect("up hung")
    .unwrap();

    assert!(!report.is_success());
    assert!(matches!(
        report.error,
        Some(UpError::Client(ClientError::Receive { .. }))
    ));
    assert_eq!(report.render.incomplete, vec!["build".to_string()]);

    let record = FileStore::new(state)
        .get_build("web", &report.build_id)
        .unwrap();
    assert_eq!(record.stages[0].status, StageStatus::Incomplete);
    assert!(record.error.unwrap().contains("builder restarted"));
}

#[tokio::test]
async fn several_directories_use_the_duplex_stream() {
    let tmp = TempDir::new().unwrap();
    let api = app_dir(tmp.path(), "api");
    let web = app_dir(tmp.path(), "web");
    let state = tmp.path().join("state");

    let (connector, server) = fake_server(4);
    let server_task = tokio::spawn(async move {
        let mut server = server;
        let mut apps = Vec::new();
        while let Some(request) = server.next_request().await {
            server
                .reply(&format!("{} build", request.app_name), StatusCode::Success)
                .await;
            apps.push(request.app_name);
            if apps.len() == 2 {
                break;
            }
        }
        apps
    });

    let cmd = command(connector, &state);
    let options = UpOptions::default()
        .with_app_dir(&api)
        .with_app_dir(&web)
        .with_source_ref("manual")
        .with_record(false);
    let report = timeout(
        DEADLINE,
        cmd.execute(
            &CancellationToken::new(),
            &options,
            Arc::new(LineSink::new(Vec::new())),
        ),
    )
    .await
    .expect("up hung")
    .unwrap();

    assert!(report.is_success(), "{report:?}");
    assert_eq!(server_task.await.unwrap(), vec!["api", "web"]);
    assert_eq!(report.render.succeeded.len(), 2);
    assert!(!state.exists(), "--no-record must not write records");
}

#[tokio::test]
async fn version_mismatch_warns_but_proceeds() {
    let tmp = TempDir::new().unwrap();
    let dir = app_dir(tmp.path(), "web");

    let (connector, server) = fake_server(4);
    server.reply("build", StatusCode::Success).await;
    drop(server);

    let cmd = command(connector.with_version("v99.0.0"), &tmp.path().join("state"));
    let options = UpOptions::default()
        .with_app_dir(&dir)
        .with_source_ref("manual");
    let report = cmd
        .execute(
            &CancellationToken::new(),
            &options,
            Arc::new(LineSink::new(Vec::new())),
        )
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("v99.0.0"));
}

#[tokio::test]
async fn missing_directory_fails_before_connecting() {
    let tmp = TempDir::new().unwrap();
    let (connector, _server) = fake_server(1);
    let cmd = command(connector, &tmp.path().join("state"));
    let options = UpOptions::default().with_app_dir(tmp.path().join("nope"));

    let result = cmd
        .execute(
            &CancellationToken::new(),
            &options,
            Arc::new(LineSink::new(Vec::new())),
        )
        .await;
    assert!(result.is_err());
}
