//! Starter packs for new applications.
//!
//! A pack directory looks like:
//!
//! ```text
//! <pack>/
//!   Dockerfile
//!   tasks.toml          (optional)
//!   charts/<name>/...   (exactly one chart)
//! ```
//!
//! Saving a pack into an application directory writes the chart under
//! `charts/<name>/`, keeps any Dockerfile the application already has, and
//! installs the tasks file as `.skiff-tasks.toml`.

pub mod tasks;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

pub use tasks::Tasks;

pub const DOCKERFILE_NAME: &str = "Dockerfile";
pub const TASKS_FILE_NAME: &str = "tasks.toml";
pub const TARGET_TASKS_FILE_NAME: &str = ".skiff-tasks.toml";
pub const CHARTS_DIR: &str = "charts";

const DEFAULT_FILE_MODE: u32 = 0o644;

/// File content plus the Unix permission bits it is written with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackFile {
    pub content: Vec<u8>,
    pub mode: u32,
}

impl PackFile {
    pub fn new(content: impl Into<Vec<u8>>, mode: u32) -> Self {
        Self {
            content: content.into(),
            mode,
        }
    }
}

/// A Helm-style chart: its name and its files keyed by relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chart {
    pub name: String,
    pub files: BTreeMap<PathBuf, PackFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pack {
    pub chart: Chart,
    /// Top-level pack files keyed by file name (`Dockerfile`, `tasks.toml`).
    pub files: BTreeMap<String, PackFile>,
}

impl Pack {
    /// Load a pack from disk, validating its tasks file if there is one.
    pub fn from_dir(dir: &Path) -> anyhow::Result<Self> {
        if !dir.is_dir() {
            anyhow::bail!("Pack directory not found: {}", dir.display());
        }

        let mut files = BTreeMap::new();
        for name in [DOCKERFILE_NAME, TASKS_FILE_NAME] {
            let path = dir.join(name);
            if path.is_file() {
                files.insert(name.to_string(), read_pack_file(&path)?);
            }
        }
        if let Some(tasks) = files.get(TASKS_FILE_NAME) {
            let text = std::str::from_utf8(&tasks.content)
                .with_context(|| format!("{} is not valid UTF-8", TASKS_FILE_NAME))?;
            Tasks::parse(text)
                .with_context(|| format!("Invalid tasks file in pack: {}", dir.display()))?;
        }

        let chart = load_chart(&dir.join(CHARTS_DIR))?;
        Ok(Self { chart, files })
    }

    /// Write the pack into `dest`, creating it if needed.
    pub fn save_dir(&self, dest: &Path) -> anyhow::Result<()> {
        if self.chart.name.is_empty() {
            anyhow::bail!("Pack has no chart name");
        }
        fs::create_dir_all(dest)
            .with_context(|| format!("Failed to create directory: {}", dest.display()))?;

        let chart_dir = dest.join(CHARTS_DIR).join(&self.chart.name);
        for (relative, file) in &self.chart.files {
            ensure_relative(relative)?;
            write_pack_file(&chart_dir.join(relative), file)?;
        }

        for (name, file) in &self.files {
            let target = match name.as_str() {
                DOCKERFILE_NAME => {
                    let path = dest.join(DOCKERFILE_NAME);
                    if path.exists() {
                        tracing::debug!(path = %path.display(), "keeping existing Dockerfile");
                        continue;
                    }
                    path
                }
                TASKS_FILE_NAME => dest.join(TARGET_TASKS_FILE_NAME),
                other => {
                    ensure_relative(Path::new(other))?;
                    dest.join(other)
                }
            };
            write_pack_file(&target, file)?;
        }
        Ok(())
    }
}

fn load_chart(charts_dir: &Path) -> anyhow::Result<Chart> {
    if !charts_dir.is_dir() {
        anyhow::bail!("Pack has no charts directory: {}", charts_dir.display());
    }
    let mut entries: Vec<_> = fs::read_dir(charts_dir)
        .with_context(|| format!("Failed to read directory: {}", charts_dir.display()))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read directory entries: {}", charts_dir.display()))?;
    entries.retain(|e| e.path().is_dir());

    let [entry] = entries.as_slice() else {
        anyhow::bail!(
            "Expected exactly one chart in {}, found {}",
            charts_dir.display(),
            entries.len()
        );
    };

    let name = entry.file_name().to_string_lossy().to_string();
    let mut files = BTreeMap::new();
    collect_files(&entry.path(), Path::new(""), &mut files)?;
    Ok(Chart { name, files })
}

fn collect_files(
    dir: &Path,
    base: &Path,
    files: &mut BTreeMap<PathBuf, PackFile>,
) -> anyhow::Result<()> {
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let relative = base.join(entry.file_name());
        let ty = entry.file_type()?;
        if ty.is_dir() {
            collect_files(&entry.path(), &relative, files)?;
        } else if ty.is_file() {
            files.insert(relative, read_pack_file(&entry.path())?);
        } else {
            anyhow::bail!(
                "Unsupported entry in pack chart: {}",
                entry.path().display()
            );
        }
    }
    Ok(())
}

fn read_pack_file(path: &Path) -> anyhow::Result<PackFile> {
    let content =
        fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    let metadata =
        fs::metadata(path).with_context(|| format!("Failed to stat file: {}", path.display()))?;
    Ok(PackFile {
        content,
        mode: file_mode(&metadata),
    })
}

fn write_pack_file(path: &Path, file: &PackFile) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(path, &file.content)
        .with_context(|| format!("Failed to write file: {}", path.display()))?;
    set_file_mode(path, file.mode)
}

fn ensure_relative(path: &Path) -> anyhow::Result<()> {
    if path.is_absolute() {
        anyhow::bail!("Absolute paths not allowed in packs: {}", path.display());
    }
    if path
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        anyhow::bail!("Path traversal not allowed in packs: {}", path.display());
    }
    Ok(())
}

#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn file_mode(_metadata: &fs::Metadata) -> u32 {
    DEFAULT_FILE_MODE
}

#[cfg(unix)]
fn set_file_mode(path: &Path, mode: u32) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = if mode == 0 { DEFAULT_FILE_MODE } else { mode };
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("Failed to set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn set_file_mode(_path: &Path, _mode: u32) -> anyhow::Result<()> {
    Ok(())
}
