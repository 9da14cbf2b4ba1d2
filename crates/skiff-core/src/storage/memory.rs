use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::{BuildRecord, BuildStore, StorageError, sort_builds, validate_app_name};

type Apps = HashMap<String, BTreeMap<String, BuildRecord>>;

/// Process-local store, used by tests and `--no-record` runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    apps: Mutex<Apps>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Apps>> {
        self.apps
            .lock()
            .map_err(|_| anyhow::anyhow!("build store lock poisoned"))
    }
}

impl BuildStore for MemoryStore {
    fn create_build(&self, record: &BuildRecord) -> anyhow::Result<()> {
        validate_app_name(&record.app_name)?;
        let mut apps = self.lock()?;
        let builds = apps.entry(record.app_name.clone()).or_default();
        if builds.contains_key(&record.build_id) {
            return Err(StorageError::BuildExists {
                app: record.app_name.clone(),
                build: record.build_id.clone(),
            }
            .into());
        }
        builds.insert(record.build_id.clone(), record.clone());
        Ok(())
    }

    fn get_builds(&self, app: &str) -> anyhow::Result<Vec<BuildRecord>> {
        let apps = self.lock()?;
        let mut builds: Vec<_> = apps
            .get(app)
            .map(|b| b.values().cloned().collect())
            .unwrap_or_default();
        sort_builds(&mut builds);
        Ok(builds)
    }

    fn get_build(&self, app: &str, build_id: &str) -> anyhow::Result<BuildRecord> {
        let apps = self.lock()?;
        apps.get(app)
            .and_then(|b| b.get(build_id))
            .cloned()
            .ok_or_else(|| {
                StorageError::BuildNotFound {
                    app: app.to_string(),
                    build: build_id.to_string(),
                }
                .into()
            })
    }

    fn delete_build(&self, app: &str, build_id: &str) -> anyhow::Result<BuildRecord> {
        let mut apps = self.lock()?;
        let removed = apps.get_mut(app).and_then(|b| b.remove(build_id));
        let Some(record) = removed else {
            return Err(StorageError::BuildNotFound {
                app: app.to_string(),
                build: build_id.to_string(),
            }
            .into());
        };
        if apps.get(app).is_some_and(BTreeMap::is_empty) {
            apps.remove(app);
        }
        Ok(record)
    }

    fn delete_builds(&self, app: &str) -> anyhow::Result<Vec<BuildRecord>> {
        let mut apps = self.lock()?;
        let Some(builds) = apps.remove(app) else {
            return Err(StorageError::AppNotFound {
                app: app.to_string(),
            }
            .into());
        };
        let mut builds: Vec<_> = builds.into_values().collect();
        sort_builds(&mut builds);
        Ok(builds)
    }

    fn apps(&self) -> anyhow::Result<Vec<String>> {
        let apps = self.lock()?;
        let mut names: Vec<_> = apps.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
