//! High-level commands for skiff operations.
//!
//! Each command bundles the lower-level modules into one call the CLI can
//! make and report on.

pub mod create;
pub mod history;
pub mod up;

pub use create::{CreateCommand, CreateOptions, CreateReport};
pub use history::HistoryCommand;
pub use up::{UpCommand, UpError, UpOptions, UpReport};
