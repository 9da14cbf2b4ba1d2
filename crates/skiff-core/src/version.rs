//! Client and server version reporting.

use serde::{Deserialize, Serialize};

use crate::rpc::proto::Version;

/// Version triple reported by both the client binary and the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub sem_ver: String,
    pub git_commit: String,
    pub git_tree_state: String,
}

impl VersionInfo {
    /// Version of this build. Commit and tree state come from the
    /// `SKIFF_GIT_COMMIT` / `SKIFF_GIT_TREE_STATE` build environment when set.
    pub fn client() -> Self {
        Self {
            sem_ver: format!("v{}", env!("CARGO_PKG_VERSION")),
            git_commit: option_env!("SKIFF_GIT_COMMIT").unwrap_or_default().to_string(),
            git_tree_state: option_env!("SKIFF_GIT_TREE_STATE")
                .unwrap_or_default()
                .to_string(),
        }
    }
}

impl From<Version> for VersionInfo {
    fn from(v: Version) -> Self {
        Self {
            sem_ver: v.sem_ver,
            git_commit: v.git_commit,
            git_tree_state: v.git_tree_state,
        }
    }
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SemVer:\"{}\", GitCommit:\"{}\", GitTreeState:\"{}\"",
            self.sem_ver, self.git_commit, self.git_tree_state
        )
    }
}

/// Outcome of comparing client and server versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compatibility {
    Compatible,
    Mismatch { client: String, server: String },
}

/// Parse a version string, tolerating a leading `v`.
pub fn parse_sem_ver(raw: &str) -> anyhow::Result<semver::Version> {
    let trimmed = raw.trim().trim_start_matches('v');
    semver::Version::parse(trimmed)
        .map_err(|e| anyhow::anyhow!("Invalid semantic version '{}': {}", raw, e))
}

/// Majors must match; while the major is 0, minors must match too.
pub fn check_compatibility(
    client: &VersionInfo,
    server: &VersionInfo,
) -> anyhow::Result<Compatibility> {
    let c = parse_sem_ver(&client.sem_ver)?;
    let s = parse_sem_ver(&server.sem_ver)?;

    let compatible = if c.major == 0 || s.major == 0 {
        c.major == s.major && c.minor == s.minor
    } else {
        c.major == s.major
    };

    if compatible {
        Ok(Compatibility::Compatible)
    } else {
        Ok(Compatibility::Mismatch {
            client: client.sem_ver.clone(),
            server: server.sem_ver.clone(),
        })
    }
}
