use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::{BuildRecord, BuildStore, StorageError, sort_builds, validate_app_name};

const FILE_SUFFIX: &str = ".builds.json";

/// On-disk document for one application.
#[derive(Debug, Default, Serialize, Deserialize)]
struct AppBuilds {
    builds: BTreeMap<String, BuildRecord>,
}

/// Build records as one JSON document per application.
///
/// Layout: `<dir>/<app>.builds.json`. Every write replaces the whole
/// document via a temporary file and a rename.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Get default state directory for build records
    ///
    /// # Returns
    /// - Unix: `$XDG_STATE_HOME/skiff/builds` or `~/.local/state/skiff/builds`
    /// - Windows: `%LOCALAPPDATA%\skiff\builds`
    pub fn default_dir() -> anyhow::Result<PathBuf> {
        let base = if cfg!(unix) {
            dirs::state_dir()
                .or_else(dirs::data_local_dir)
                .ok_or_else(|| anyhow::anyhow!("Cannot determine state directory"))?
        } else {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Cannot determine local app data directory"))?
        };
        Ok(base.join("skiff").join("builds"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn app_path(&self, app: &str) -> Result<PathBuf, StorageError> {
        validate_app_name(app)?;
        Ok(self.dir.join(format!("{}{}", app, FILE_SUFFIX)))
    }

    fn load(&self, app: &str) -> anyhow::Result<Option<AppBuilds>> {
        let path = self.app_path(app)?;
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)
            .with_context(|| format!("Failed to read build records: {}", path.display()))?;
        let doc: AppBuilds = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse build records: {}", path.display()))?;
        Ok(Some(doc))
    }

    fn save(&self, app: &str, doc: &AppBuilds) -> anyhow::Result<()> {
        let path = self.app_path(app)?;
        if doc.builds.is_empty() {
            if path.exists() {
                fs::remove_file(&path).with_context(|| {
                    format!("Failed to remove build records: {}", path.display())
                })?;
            }
            return Ok(());
        }

        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create store directory: {}", self.dir.display())
        })?;
        let json =
            serde_json::to_vec_pretty(doc).context("Failed to serialize build records")?;
        let tmp = self
            .dir
            .join(format!(".{}{}.tmp.{}", app, FILE_SUFFIX, std::process::id()));
        fs::write(&tmp, json)
            .with_context(|| format!("Failed to write temp file: {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| {
            format!(
                "Failed to move {} into place at {}",
                tmp.display(),
                path.display()
            )
        })
    }
}

impl BuildStore for FileStore {
    fn create_build(&self, record: &BuildRecord) -> anyhow::Result<()> {
        let mut doc = self.load(&record.app_name)?.unwrap_or_default();
        if doc.builds.contains_key(&record.build_id) {
            return Err(StorageError::BuildExists {
                app: record.app_name.clone(),
                build: record.build_id.clone(),
            }
            .into());
        }
        doc.builds.insert(record.build_id.clone(), record.clone());
        self.save(&record.app_name, &doc)?;
        tracing::debug!(app = %record.app_name, build = %record.build_id, "build recorded");
        Ok(())
    }

    fn get_builds(&self, app: &str) -> anyhow::Result<Vec<BuildRecord>> {
        let mut builds: Vec<_> = self
            .load(app)?
            .map(|doc| doc.builds.into_values().collect())
            .unwrap_or_default();
        sort_builds(&mut builds);
        Ok(builds)
    }

    fn get_build(&self, app: &str, build_id: &str) -> anyhow::Result<BuildRecord> {
        self.load(app)?
            .and_then(|mut doc| doc.builds.remove(build_id))
            .ok_or_else(|| {
                StorageError::BuildNotFound {
                    app: app.to_string(),
                    build: build_id.to_string(),
                }
                .into()
            })
    }

    fn delete_build(&self, app: &str, build_id: &str) -> anyhow::Result<BuildRecord> {
        let not_found = || StorageError::BuildNotFound {
            app: app.to_string(),
            build: build_id.to_string(),
        };
        let mut doc = self.load(app)?.ok_or_else(not_found)?;
        let record = doc.builds.remove(build_id).ok_or_else(not_found)?;
        self.save(app, &doc)?;
        Ok(record)
    }

    fn delete_builds(&self, app: &str) -> anyhow::Result<Vec<BuildRecord>> {
        let doc = self.load(app)?.ok_or_else(|| StorageError::AppNotFound {
            app: app.to_string(),
        })?;
        self.save(app, &AppBuilds::default())?;
        let mut builds: Vec<_> = doc.builds.into_values().collect();
        sort_builds(&mut builds);
        Ok(builds)
    }

    fn apps(&self) -> anyhow::Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read directory: {}", self.dir.display()))?
        {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            match name.strip_suffix(FILE_SUFFIX) {
                Some(app) if validate_app_name(app).is_ok() => names.push(app.to_string()),
                _ => {}
            }
        }
        names.sort();
        Ok(names)
    }
}
