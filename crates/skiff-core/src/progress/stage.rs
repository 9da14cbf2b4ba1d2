//! One renderer task per pipeline stage.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::palette::Palette;
use super::sink::LineSink;
use crate::rpc::StatusCode;

/// How a stage renderer ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Succeeded { stage: String, elapsed: Duration },
    Failed { stage: String, elapsed: Duration },
    /// The display ended before the stage reported a terminal status.
    Incomplete { stage: String },
}

/// Everything a stage task needs; moved into the task on spawn.
pub(crate) struct StageRenderer<W> {
    pub app: Arc<str>,
    pub stage: String,
    pub started: Instant,
    pub tick: Duration,
    pub palette: Palette,
    pub sink: Arc<LineSink<W>>,
    pub updates: mpsc::UnboundedReceiver<StatusCode>,
    pub scope: CancellationToken,
}

impl<W: Write> StageRenderer<W> {
    /// Animate the stage line until a terminal status arrives, then write
    /// the final line once and stop.
    ///
    /// Updates already queued are handled before the next animation frame.
    /// A closed update channel or a cancelled scope ends the task without a
    /// final line. Animation frames that fail to write are skipped; only a
    /// failed final line is reported.
    pub async fn run(mut self) -> (String, std::io::Result<StageOutcome>) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut frame = 0usize;

        loop {
            tokio::select! {
                biased;
                _ = self.scope.cancelled() => return self.incomplete(),
                update = self.updates.recv() => match update {
                    Some(code) if code.is_terminal() => return self.finish(code),
                    Some(_) => continue,
                    None => return self.incomplete(),
                },
                _ = ticker.tick() => {
                    let line = self.palette.pending(&self.app, &self.stage, frame);
                    if let Err(e) = self.sink.write_line(&line) {
                        tracing::debug!(stage = %self.stage, error = %e, "spinner frame dropped");
                    }
                    frame = frame.wrapping_add(1);
                }
            }
        }
    }

    fn finish(self, code: StatusCode) -> (String, std::io::Result<StageOutcome>) {
        let elapsed = self.started.elapsed();
        let succeeded = code == StatusCode::Success;
        let line = self
            .palette
            .finished(&self.app, &self.stage, succeeded, elapsed);
        let written = self.sink.write_line(&line);

        let stage = self.stage;
        let outcome = if succeeded {
            StageOutcome::Succeeded {
                stage: stage.clone(),
                elapsed,
            }
        } else {
            StageOutcome::Failed {
                stage: stage.clone(),
                elapsed,
            }
        };
        (stage, written.map(|()| outcome))
    }

    fn incomplete(self) -> (String, std::io::Result<StageOutcome>) {
        tracing::debug!(stage = %self.stage, "stage ended without a terminal status");
        let stage = self.stage;
        (stage.clone(), Ok(StageOutcome::Incomplete { stage }))
    }
}
