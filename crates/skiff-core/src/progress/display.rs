//! The render loop: fans stage summaries out to per-stage renderer tasks.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::palette::Palette;
use super::sink::LineSink;
use super::stage::{StageOutcome, StageRenderer};
use crate::error::DisplayError;
use crate::rpc::{StatusCode, UpSummary};

/// Default redraw interval of a pending stage.
pub const DEFAULT_TICK: Duration = Duration::from_millis(50);

/// What to do with a summary that does not fit the stage lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalyPolicy {
    /// Log at debug level and drop the summary.
    #[default]
    Ignore,
    /// Stop rendering with [`DisplayError::Anomaly`].
    Strict,
}

/// A summary that does not fit the stage lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    /// The status code is not one this client knows.
    UnknownStatus { stage: String, code: i32 },
    /// The stage already reported SUCCESS or FAILURE.
    AlreadyFinished { stage: String },
}

impl std::fmt::Display for Anomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Anomaly::UnknownStatus { stage, code } => {
                write!(f, "stage '{stage}' reported unknown status code {code}")
            }
            Anomaly::AlreadyFinished { stage } => {
                write!(f, "stage '{stage}' reported after it finished")
            }
        }
    }
}

/// Stages as they ended, in completion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub incomplete: Vec<String>,
    /// Summaries dropped under [`AnomalyPolicy::Ignore`].
    pub ignored: usize,
}

impl RenderReport {
    /// True when no stage failed or was left unfinished.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.incomplete.is_empty()
    }

    fn record(&mut self, outcome: StageOutcome) {
        match outcome {
            StageOutcome::Succeeded { stage, .. } => self.succeeded.push(stage),
            StageOutcome::Failed { stage, .. } => self.failed.push(stage),
            StageOutcome::Incomplete { stage } => self.incomplete.push(stage),
        }
    }
}

/// Renders the progress of one `up` session.
#[derive(Debug, Clone)]
pub struct ProgressDisplay {
    app: Arc<str>,
    palette: Palette,
    tick: Duration,
    anomalies: AnomalyPolicy,
}

/// Directory entry of a live stage. Dropping it closes the stage's updates.
struct StageHandle {
    updates: mpsc::UnboundedSender<StatusCode>,
}

impl ProgressDisplay {
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: Arc::from(app.into()),
            palette: Palette::default(),
            tick: DEFAULT_TICK,
            anomalies: AnomalyPolicy::default(),
        }
    }

    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    pub fn with_anomaly_policy(mut self, policy: AnomalyPolicy) -> Self {
        self.anomalies = policy;
        self
    }

    /// Consume `summaries` until the sender side closes or `cancel` fires,
    /// drawing one line per distinct stage into `sink`.
    ///
    /// Every stage that receives SUCCESS or FAILURE before the input ends
    /// gets exactly one final line. On return every stage task has been
    /// joined, so nothing writes to `sink` afterwards; stages that never
    /// finished are listed as incomplete.
    pub async fn render<W>(
        &self,
        cancel: &CancellationToken,
        mut summaries: mpsc::Receiver<UpSummary>,
        sink: Arc<LineSink<W>>,
    ) -> Result<RenderReport, DisplayError>
    where
        W: Write + Send + 'static,
    {
        let scope = cancel.child_token();
        let mut active: HashMap<String, StageHandle> = HashMap::new();
        let mut finished: HashSet<String> = HashSet::new();
        let mut stages: JoinSet<(String, std::io::Result<StageOutcome>)> = JoinSet::new();
        let mut report = RenderReport::default();

        sink.write_line(&self.palette.banner(&self.app))?;

        let mut failure: Option<DisplayError> = None;
        loop {
            tokio::select! {
                biased;
                _ = scope.cancelled() => break,
                Some(joined) = stages.join_next(), if !stages.is_empty() => {
                    if let Err(e) = settle_stage(joined, &mut active, &mut report) {
                        failure = Some(e);
                        break;
                    }
                }
                next = summaries.recv() => {
                    let Some(summary) = next else { break };
                    let dispatched = self.dispatch(
                        summary,
                        &mut active,
                        &mut finished,
                        &mut stages,
                        &sink,
                        &scope,
                        &mut report,
                    );
                    if let Err(e) = dispatched {
                        failure = Some(e);
                        break;
                    }
                }
            }
        }

        // A failed render stops its stages right away; otherwise closing the
        // update channels lets each stage drain what it was already sent.
        if failure.is_some() {
            scope.cancel();
        }
        active.clear();
        while let Some(joined) = stages.join_next().await {
            if let Err(e) = settle_stage(joined, &mut active, &mut report) {
                failure.get_or_insert(e);
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch<W>(
        &self,
        summary: UpSummary,
        active: &mut HashMap<String, StageHandle>,
        finished: &mut HashSet<String>,
        stages: &mut JoinSet<(String, std::io::Result<StageOutcome>)>,
        sink: &Arc<LineSink<W>>,
        scope: &CancellationToken,
        report: &mut RenderReport,
    ) -> Result<(), DisplayError>
    where
        W: Write + Send + 'static,
    {
        let Some(code) = summary.status() else {
            return self.anomaly(
                Anomaly::UnknownStatus {
                    stage: summary.stage_desc,
                    code: summary.status_code,
                },
                report,
            );
        };
        if finished.contains(&summary.stage_desc) {
            return self.anomaly(
                Anomaly::AlreadyFinished {
                    stage: summary.stage_desc,
                },
                report,
            );
        }

        match active.get(&summary.stage_desc) {
            Some(handle) => {
                // The stage task only exits after a terminal status or when
                // its channel closes, so it is still listening here.
                let _ = handle.updates.send(code);
            }
            None => {
                let (updates_tx, updates_rx) = mpsc::unbounded_channel();
                let _ = updates_tx.send(code);
                let renderer = StageRenderer {
                    app: Arc::clone(&self.app),
                    stage: summary.stage_desc.clone(),
                    started: Instant::now(),
                    tick: self.tick,
                    palette: self.palette.clone(),
                    sink: Arc::clone(sink),
                    updates: updates_rx,
                    scope: scope.clone(),
                };
                stages.spawn(renderer.run());
                active.insert(
                    summary.stage_desc.clone(),
                    StageHandle {
                        updates: updates_tx,
                    },
                );
                debug!(stage = %summary.stage_desc, "stage started");
            }
        }

        if code.is_terminal() {
            finished.insert(summary.stage_desc);
        }
        Ok(())
    }

    fn anomaly(&self, anomaly: Anomaly, report: &mut RenderReport) -> Result<(), DisplayError> {
        match self.anomalies {
            AnomalyPolicy::Ignore => {
                debug!(%anomaly, "dropping stage summary");
                report.ignored += 1;
                Ok(())
            }
            AnomalyPolicy::Strict => Err(DisplayError::Anomaly(anomaly)),
        }
    }
}

/// Remove a finished stage from the directory and record how it ended.
fn settle_stage(
    joined: Result<(String, std::io::Result<StageOutcome>), tokio::task::JoinError>,
    active: &mut HashMap<String, StageHandle>,
    report: &mut RenderReport,
) -> Result<(), DisplayError> {
    let (stage, outcome) = joined?;
    active.remove(&stage);
    report.record(outcome?);
    Ok(())
}
