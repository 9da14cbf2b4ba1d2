//! Create command implementation.
//!
//! Seeds an application directory from a starter pack.

use std::path::PathBuf;

use crate::pack::{DOCKERFILE_NAME, Pack, TARGET_TASKS_FILE_NAME, TASKS_FILE_NAME};

/// Options for the create command
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Application directory to write into; created if missing
    pub dest: PathBuf,
    /// Pack directory to copy from
    pub pack_dir: PathBuf,
}

/// Result of a create command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateReport {
    pub dest: PathBuf,
    /// Name of the chart written under `charts/`
    pub chart: String,
    /// The destination already had a Dockerfile, which was left alone
    pub dockerfile_kept: bool,
    /// Path of the installed tasks file, if the pack had one
    pub tasks_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct CreateCommand;

impl CreateCommand {
    pub fn new() -> Self {
        Self
    }

    pub fn execute(&self, options: &CreateOptions) -> anyhow::Result<CreateReport> {
        let pack = Pack::from_dir(&options.pack_dir)?;
        let dockerfile_kept = pack.files.contains_key(DOCKERFILE_NAME)
            && options.dest.join(DOCKERFILE_NAME).exists();

        pack.save_dir(&options.dest)?;
        tracing::debug!(
            pack = %options.pack_dir.display(),
            dest = %options.dest.display(),
            chart = %pack.chart.name,
            "pack saved"
        );

        let tasks_file = pack
            .files
            .contains_key(TASKS_FILE_NAME)
            .then(|| options.dest.join(TARGET_TASKS_FILE_NAME));
        Ok(CreateReport {
            dest: options.dest.clone(),
            chart: pack.chart.name,
            dockerfile_kept,
            tasks_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn reports_kept_dockerfile_and_tasks_file() {
        let pack = TempDir::new().unwrap();
        fs::write(pack.path().join(DOCKERFILE_NAME), "FROM scratch\n").unwrap();
        fs::write(pack.path().join(TASKS_FILE_NAME), "[pre-up]\nhi = \"echo hi\"\n").unwrap();
        fs::create_dir_all(pack.path().join("charts/web")).unwrap();
        fs::write(pack.path().join("charts/web/Chart.yaml"), "name: web\n").unwrap();

        let dest = TempDir::new().unwrap();
        fs::write(dest.path().join(DOCKERFILE_NAME), "FROM mine\n").unwrap();

        let report = CreateCommand::new()
            .execute(&CreateOptions {
                dest: dest.path().to_path_buf(),
                pack_dir: pack.path().to_path_buf(),
            })
            .unwrap();

        assert_eq!(report.chart, "web");
        assert!(report.dockerfile_kept);
        assert_eq!(
            report.tasks_file,
            Some(dest.path().join(TARGET_TASKS_FILE_NAME))
        );
    }
}
