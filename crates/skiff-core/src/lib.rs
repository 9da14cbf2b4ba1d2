//! Skiff Core Library
//!
//! Client side of the skiff build-and-deploy service: the streaming RPC
//! orchestrator, the per-stage progress display, and the local pieces that
//! surround an `up` (packs, app archives, build records, configuration).

pub mod archive;
pub mod commands;
pub mod config;
pub mod error;
pub mod pack;
pub mod progress;
pub mod rpc;
pub mod source;
pub mod storage;
pub mod version;

/// Re-exports of commonly used types
pub mod prelude {
    // Errors
    pub use crate::error::{ClientError, DisplayError};

    // RPC
    pub use crate::rpc::{
        BuildRequest, Client, Connector, GrpcConnector, StatusCode, Transport, UpMessage,
        UpSummary,
    };

    // Progress
    pub use crate::progress::{
        AnomalyPolicy, ColorMode, LineSink, Palette, ProgressDisplay, RenderReport,
    };

    // Configuration
    pub use crate::config::{ConfigStore, SkiffConfig};

    // Storage
    pub use crate::storage::{BuildRecord, BuildStore, FileStore, MemoryStore};

    // Version
    pub use crate::version::VersionInfo;
}
