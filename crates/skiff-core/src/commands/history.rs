//! History command implementation: reads and prunes local build records.

use crate::storage::{BuildRecord, BuildStore};

pub struct HistoryCommand {
    store: Box<dyn BuildStore>,
}

impl HistoryCommand {
    pub fn new(store: Box<dyn BuildStore>) -> Self {
        Self { store }
    }

    /// Records of `app`, or of every application when `None`, oldest first
    /// within each application.
    pub fn list(&self, app: Option<&str>) -> anyhow::Result<Vec<BuildRecord>> {
        match app {
            Some(app) => self.store.get_builds(app),
            None => {
                let mut all = Vec::new();
                for app in self.store.apps()? {
                    all.extend(self.store.get_builds(&app)?);
                }
                Ok(all)
            }
        }
    }

    pub fn show(&self, app: &str, build_id: &str) -> anyhow::Result<BuildRecord> {
        self.store.get_build(app, build_id)
    }

    /// Delete one record, or every record of `app` when `build_id` is `None`.
    pub fn delete(&self, app: &str, build_id: Option<&str>) -> anyhow::Result<Vec<BuildRecord>> {
        match build_id {
            Some(id) => Ok(vec![self.store.delete_build(app, id)?]),
            None => self.store.delete_builds(app),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn list_without_app_covers_every_app() {
        let store = MemoryStore::new();
        store.create_build(&BuildRecord::new("api", "aa")).unwrap();
        store.create_build(&BuildRecord::new("web", "bb")).unwrap();
        let history = HistoryCommand::new(Box::new(store));

        let apps: Vec<_> = history
            .list(None)
            .unwrap()
            .into_iter()
            .map(|r| r.app_name)
            .collect();
        assert_eq!(apps, vec!["api", "web"]);
    }

    #[test]
    fn delete_single_build() {
        let store = MemoryStore::new();
        let record = BuildRecord::new("web", "aa");
        store.create_build(&record).unwrap();
        let history = HistoryCommand::new(Box::new(store));

        let removed = history.delete("web", Some(&record.build_id)).unwrap();
        assert_eq!(removed, vec![record.clone()]);
        assert!(history.show("web", &record.build_id).is_err());
    }
}
