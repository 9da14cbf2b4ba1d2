//! Source reference of an application directory, derived from git.

use std::path::Path;

use git2::{ErrorCode, Repository, StatusOptions};

/// `branch@shortsha`, with `+dirty` when the work tree has changes.
///
/// Returns `None` when `dir` is not inside a repository or the repository
/// has no commits yet.
pub fn source_ref(dir: &Path) -> anyhow::Result<Option<String>> {
    let repo = match Repository::discover(dir) {
        Ok(repo) => repo,
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let head = match repo.head() {
        Ok(head) => head,
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
            tracing::debug!(dir = %dir.display(), "repository has no commits");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    let branch = head.shorthand().unwrap_or("HEAD").to_string();
    let commit = head.peel_to_commit()?;
    let short = commit.as_object().short_id()?;
    let short = short.as_str().unwrap_or_default();

    let mut reference = format!("{}@{}", branch, short);
    if is_dirty(&repo)? {
        reference.push_str("+dirty");
    }
    Ok(Some(reference))
}

fn is_dirty(repo: &Repository) -> anyhow::Result<bool> {
    if repo.is_bare() {
        return Ok(false);
    }
    let mut options = StatusOptions::new();
    options.include_untracked(true).include_ignored(false);
    let statuses = repo.statuses(Some(&mut options))?;
    Ok(!statuses.is_empty())
}
