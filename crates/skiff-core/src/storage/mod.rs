//! Local records of `up` sessions.
//!
//! Records are keyed by application name and build id. The RPC client and
//! the progress display know nothing about them; the `up` command writes one
//! after each session.

mod file;
mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::progress::RenderReport;

/// How one stage of a recorded build ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Succeeded,
    Failed,
    Incomplete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: String,
    pub status: StageStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub build_id: String,
    pub app_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    pub archive_digest: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub stages: Vec<StageRecord>,
    /// Transport or display error that ended the session, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BuildRecord {
    pub fn new(app_name: impl Into<String>, archive_digest: impl Into<String>) -> Self {
        let created_at = Utc::now();
        let archive_digest = archive_digest.into();
        Self {
            build_id: new_build_id(created_at, &archive_digest),
            app_name: app_name.into(),
            source_ref: None,
            archive_digest,
            created_at,
            stages: Vec::new(),
            error: None,
        }
    }

    /// True when every stage succeeded and nothing failed the session.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
            && self
                .stages
                .iter()
                .all(|s| s.status == StageStatus::Succeeded)
    }

    /// Copy stage outcomes from a finished render, in completion order per
    /// status.
    pub fn record_stages(&mut self, report: &RenderReport) {
        let tagged = [
            (&report.succeeded, StageStatus::Succeeded),
            (&report.failed, StageStatus::Failed),
            (&report.incomplete, StageStatus::Incomplete),
        ];
        for (names, status) in tagged {
            self.stages.extend(names.iter().map(|name| StageRecord {
                name: name.clone(),
                status,
            }));
        }
    }
}

/// Timestamp to the millisecond plus the first 8 hex digits of the archive
/// digest, e.g. `20260101120000123-1a2b3c4d`.
pub fn new_build_id(created_at: DateTime<Utc>, archive_digest: &str) -> String {
    let prefix: String = archive_digest.chars().take(8).collect();
    format!("{}-{}", created_at.format("%Y%m%d%H%M%S%3f"), prefix)
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("application \"{app}\" not found")]
    AppNotFound { app: String },
    #[error("application \"{app}\" build \"{build}\" not found")]
    BuildNotFound { app: String, build: String },
    #[error("application \"{app}\" build \"{build}\" already exists")]
    BuildExists { app: String, build: String },
    #[error("invalid application name \"{app}\"")]
    InvalidAppName { app: String },
}

/// Persistence for build records.
pub trait BuildStore: Send + Sync {
    fn create_build(&self, record: &BuildRecord) -> anyhow::Result<()>;

    /// All records of `app`, oldest first. Unknown applications have none.
    fn get_builds(&self, app: &str) -> anyhow::Result<Vec<BuildRecord>>;

    fn get_build(&self, app: &str, build_id: &str) -> anyhow::Result<BuildRecord>;

    fn delete_build(&self, app: &str, build_id: &str) -> anyhow::Result<BuildRecord>;

    /// Remove every record of `app`, returning what was removed.
    fn delete_builds(&self, app: &str) -> anyhow::Result<Vec<BuildRecord>>;

    /// Names of applications with at least one record, sorted.
    fn apps(&self) -> anyhow::Result<Vec<String>>;
}

/// Application names become file names, so keep them to a safe alphabet.
pub(crate) fn validate_app_name(app: &str) -> Result<(), StorageError> {
    let valid = !app.is_empty()
        && !app.starts_with('.')
        && app
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidAppName {
            app: app.to_string(),
        })
    }
}

pub(crate) fn sort_builds(builds: &mut [BuildRecord]) {
    builds.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.build_id.cmp(&b.build_id))
    });
}
