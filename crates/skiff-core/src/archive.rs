//! Packing an application directory for upload.
//!
//! The archive is deterministic: entries are sorted, timestamps are pinned
//! and only the permission bits of each file are kept, so the same tree
//! always produces the same bytes and the same digest.

use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

use anyhow::Context;
use zip::write::SimpleFileOptions;

use crate::rpc::proto::AppArchive;

const SKIPPED_DIRS: &[&str] = &[".git"];

/// An in-memory zip of an application directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    pub name: String,
    pub content: Vec<u8>,
    /// Hex blake3 of `content`.
    pub digest: String,
    pub entries: usize,
}

impl Archive {
    pub fn into_proto(self) -> AppArchive {
        AppArchive {
            name: self.name,
            content: self.content,
        }
    }
}

/// Zip `dir` into memory. `name` is the archive name sent to the server.
pub fn pack_dir(dir: &Path, name: &str) -> anyhow::Result<Archive> {
    if !dir.is_dir() {
        anyhow::bail!("Application directory not found: {}", dir.display());
    }

    let mut files = Vec::new();
    collect_files(dir, "", &mut files)?;

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (relative, path) in &files {
        let content =
            fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .last_modified_time(zip::DateTime::default())
            .unix_permissions(file_mode(path)?);
        writer
            .start_file(relative.as_str(), options)
            .with_context(|| format!("Failed to add {} to archive", relative))?;
        writer
            .write_all(&content)
            .with_context(|| format!("Failed to write {} to archive", relative))?;
    }
    let content = writer
        .finish()
        .context("Failed to finish application archive")?
        .into_inner();

    let digest = blake3::hash(&content).to_hex().to_string();
    tracing::debug!(dir = %dir.display(), entries = files.len(), %digest, "packed application");
    Ok(Archive {
        name: name.to_string(),
        content,
        digest,
        entries: files.len(),
    })
}

fn collect_files(
    dir: &Path,
    base: &str,
    files: &mut Vec<(String, std::path::PathBuf)>,
) -> anyhow::Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read directory entries: {}", dir.display()))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let relative = if base.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", base, name)
        };

        let ty = entry
            .file_type()
            .with_context(|| format!("Failed to stat file: {}", entry.path().display()))?;
        if ty.is_dir() {
            if SKIPPED_DIRS.contains(&name.as_ref()) {
                continue;
            }
            collect_files(&entry.path(), &relative, files)?;
        } else if ty.is_file() {
            files.push((relative, entry.path()));
        } else if ty.is_symlink() {
            anyhow::bail!(
                "Symlinks are not supported in applications: {}",
                entry.path().display()
            );
        } else {
            anyhow::bail!(
                "Unsupported filesystem entry type: {}",
                entry.path().display()
            );
        }
    }
    Ok(())
}

#[cfg(unix)]
fn file_mode(path: &Path) -> anyhow::Result<u32> {
    use std::os::unix::fs::PermissionsExt;
    let metadata =
        fs::metadata(path).with_context(|| format!("Failed to stat file: {}", path.display()))?;
    Ok(metadata.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> anyhow::Result<u32> {
    Ok(0o644)
}
