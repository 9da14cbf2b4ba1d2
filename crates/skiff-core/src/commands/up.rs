//! Up command implementation.
//!
//! Packs each application directory, submits the build over the RPC client
//! and renders the stage summaries while they stream in. The transport and
//! the display run side by side; both are joined before anything is
//! reported, so errors never interleave with progress lines.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::archive;
use crate::error::{ClientError, DisplayError};
use crate::progress::{
    AnomalyPolicy, DEFAULT_TICK, LineSink, Palette, ProgressDisplay, RenderReport,
};
use crate::rpc::{BuildRequest, Client, Connector, GrpcConnector, UpSummary};
use crate::source;
use crate::storage::{BuildRecord, BuildStore, new_build_id};
use crate::version::{Compatibility, VersionInfo, check_compatibility};

/// Namespace used when none is given
pub const DEFAULT_NAMESPACE: &str = "default";

/// Summaries buffered between the client and the display
const SUMMARY_BUFFER: usize = 16;

/// Options for the up command
#[derive(Debug, Clone)]
pub struct UpOptions {
    /// Application directories; empty means the current directory
    pub app_dirs: Vec<PathBuf>,
    /// Application name; defaults to each directory's name
    pub app_name: Option<String>,
    /// Target namespace
    pub namespace: String,
    /// Source reference; defaults to the git HEAD of each directory
    pub source_ref: Option<String>,
    /// Use the duplex stream even for a single directory
    pub stream: bool,
    /// Keep a local build record
    pub record: bool,
}

impl Default for UpOptions {
    fn default() -> Self {
        Self {
            app_dirs: Vec::new(),
            app_name: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            source_ref: None,
            stream: false,
            record: true,
        }
    }
}

impl UpOptions {
    pub fn with_app_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.app_dirs.push(dir.into());
        self
    }

    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_source_ref(mut self, source_ref: impl Into<String>) -> Self {
        self.source_ref = Some(source_ref.into());
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_record(mut self, record: bool) -> Self {
        self.record = record;
        self
    }
}

/// What ended an `up` session early.
#[derive(Debug, thiserror::Error)]
pub enum UpError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Display(#[from] DisplayError),
}

/// Result of an up command
#[derive(Debug)]
pub struct UpReport {
    /// Id shared by the records of this session
    pub build_id: String,
    /// Applications submitted, in request order
    pub apps: Vec<String>,
    /// How each stage ended
    pub render: RenderReport,
    /// Transport or display failure, surfaced after the display finished
    pub error: Option<UpError>,
    /// Non-fatal problems (version mismatch, record not saved)
    pub warnings: Vec<String>,
}

impl UpReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.render.is_success()
    }
}

/// A packed application, ready to submit.
struct Prepared {
    request: BuildRequest,
    digest: String,
}

/// Up command orchestrator
pub struct UpCommand<C = GrpcConnector> {
    client: Client<C>,
    store: Box<dyn BuildStore>,
    palette: Palette,
    tick: Duration,
    anomalies: AnomalyPolicy,
    check_version: bool,
}

impl<C: Connector> UpCommand<C> {
    pub fn new(client: Client<C>, store: Box<dyn BuildStore>) -> Self {
        Self {
            client,
            store,
            palette: Palette::default(),
            tick: DEFAULT_TICK,
            anomalies: AnomalyPolicy::default(),
            check_version: true,
        }
    }

    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_anomaly_policy(mut self, policy: AnomalyPolicy) -> Self {
        self.anomalies = policy;
        self
    }

    /// Skip the GetVersion round trip before submitting.
    pub fn with_version_check(mut self, check: bool) -> Self {
        self.check_version = check;
        self
    }

    /// Run one `up` session, drawing progress into `sink`.
    ///
    /// Errors returned here are local (unreadable directory, bad archive).
    /// Anything that goes wrong once the session started is carried in
    /// [`UpReport::error`].
    pub async fn execute<W>(
        &self,
        cancel: &CancellationToken,
        options: &UpOptions,
        sink: Arc<LineSink<W>>,
    ) -> anyhow::Result<UpReport>
    where
        W: Write + Send + 'static,
    {
        let dirs = if options.app_dirs.is_empty() {
            vec![PathBuf::from(".")]
        } else {
            options.app_dirs.clone()
        };
        let prepared = dirs
            .iter()
            .map(|dir| self.prepare(dir, options))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut warnings = Vec::new();
        if self.check_version {
            warnings.extend(self.version_warning(cancel).await);
        }

        let apps: Vec<String> = prepared
            .iter()
            .map(|p| p.request.app_name.clone())
            .collect();
        let sources: Vec<String> = prepared
            .iter()
            .map(|p| p.request.source_ref.clone())
            .collect();
        let digest = session_digest(&prepared);
        let requests: Vec<BuildRequest> = prepared.into_iter().map(|p| p.request).collect();

        let display = ProgressDisplay::new(apps.join(","))
            .with_palette(self.palette.clone())
            .with_tick(self.tick)
            .with_anomaly_policy(self.anomalies);
        let (out_tx, out_rx) = mpsc::channel::<UpSummary>(SUMMARY_BUFFER);

        let duplex = options.stream || requests.len() > 1;
        debug!(apps = ?apps, duplex, "submitting build");
        let transport = self.submit(cancel, requests, duplex, out_tx);
        let (sent, rendered) = tokio::join!(transport, display.render(cancel, out_rx, sink));

        let (render, error) = match (rendered, sent) {
            (Err(e), _) => (RenderReport::default(), Some(UpError::from(e))),
            (Ok(render), Err(e)) => (render, Some(UpError::from(e))),
            (Ok(render), Ok(())) => (render, None),
        };

        let build_id = new_build_id(chrono::Utc::now(), &digest);
        if options.record {
            let recorded = self.record(
                &build_id,
                &apps,
                &sources,
                &digest,
                &render,
                error.as_ref(),
            );
            if let Err(e) = recorded {
                warn!(error = %e, "build record not saved");
                warnings.push(format!("Build record not saved: {:#}", e));
            }
        }

        Ok(UpReport {
            build_id,
            apps,
            render,
            error,
            warnings,
        })
    }

    fn prepare(&self, dir: &Path, options: &UpOptions) -> anyhow::Result<Prepared> {
        let app_name = match &options.app_name {
            Some(name) => name.clone(),
            None => dir_name(dir)?,
        };
        let source_ref = match &options.source_ref {
            Some(r) => r.clone(),
            None => source::source_ref(dir)
                .with_context(|| format!("Failed to read git state of {}", dir.display()))?
                .unwrap_or_default(),
        };
        let archive = archive::pack_dir(dir, &app_name)?;
        let digest = archive.digest.clone();

        Ok(Prepared {
            request: BuildRequest {
                app_name,
                namespace: options.namespace.clone(),
                source_ref,
                app_archive: Some(archive.into_proto()),
                values: String::new(),
            },
            digest,
        })
    }

    async fn submit(
        &self,
        cancel: &CancellationToken,
        requests: Vec<BuildRequest>,
        duplex: bool,
        out: mpsc::Sender<UpSummary>,
    ) -> Result<(), ClientError> {
        if !duplex {
            // Exactly one request when not duplex.
            let Some(request) = requests.into_iter().next() else {
                return Ok(());
            };
            return self.client.up_build(cancel, request, out).await;
        }

        let (requests_tx, requests_rx) = mpsc::channel(requests.len().max(1));
        for request in requests {
            // Capacity covers every request, so this never waits.
            if requests_tx.try_send(request).is_err() {
                break;
            }
        }
        drop(requests_tx);
        self.client.up_stream(cancel, requests_rx, out).await
    }

    async fn version_warning(&self, cancel: &CancellationToken) -> Option<String> {
        let server = tokio::select! {
            _ = cancel.cancelled() => return None,
            server = self.client.version() => server,
        };
        let server = match server {
            Ok(server) => server,
            Err(e) => {
                debug!(error = %e, "version check skipped");
                return None;
            }
        };
        let client = VersionInfo::client();
        match check_compatibility(&client, &server) {
            Ok(Compatibility::Compatible) => None,
            Ok(Compatibility::Mismatch { client, server }) => {
                warn!(%client, %server, "client and server versions are incompatible");
                Some(format!(
                    "Client version {} may not be compatible with server version {}",
                    client, server
                ))
            }
            Err(e) => {
                debug!(error = %e, "version check skipped");
                None
            }
        }
    }

    fn record(
        &self,
        build_id: &str,
        apps: &[String],
        sources: &[String],
        digest: &str,
        render: &RenderReport,
        error: Option<&UpError>,
    ) -> anyhow::Result<()> {
        for (app, source_ref) in apps.iter().zip(sources) {
            let mut record = BuildRecord::new(app.clone(), digest);
            record.build_id = build_id.to_string();
            record.source_ref = Some(source_ref.clone()).filter(|r| !r.is_empty());
            record.record_stages(render);
            record.error = error.map(|e| e.to_string());
            self.store.create_build(&record)?;
        }
        Ok(())
    }
}

/// Archive digest for one app; a digest of the digests for several.
fn session_digest(prepared: &[Prepared]) -> String {
    match prepared {
        [single] => single.digest.clone(),
        many => {
            let mut hasher = blake3::Hasher::new();
            for p in many {
                hasher.update(p.digest.as_bytes());
                hasher.update(&[0x00]);
            }
            hasher.finalize().to_hex().to_string()
        }
    }
}

fn dir_name(dir: &Path) -> anyhow::Result<String> {
    let canonical = dir
        .canonicalize()
        .with_context(|| format!("Application directory not found: {}", dir.display()))?;
    canonical
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| anyhow::anyhow!("Cannot derive an application name from {}", dir.display()))
}
