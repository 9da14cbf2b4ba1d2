//! Terminal progress for a running `up`.
//!
//! [`ProgressDisplay::render`] turns the unordered stream of stage summaries
//! into one animated line per stage. Each stage is an independent task that
//! owns its line; the render loop only keeps the directory of live stages.

mod display;
mod palette;
mod sink;
mod stage;

pub use display::{Anomaly, AnomalyPolicy, DEFAULT_TICK, ProgressDisplay, RenderReport};
pub use palette::{ColorMode, Palette};
pub use sink::LineSink;
pub use stage::StageOutcome;
