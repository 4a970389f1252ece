//! Working-tree diff against a baseline revision, via libgit2.
//!
//! Every failure is reported as a [`DiffUnavailable`] reason so the caller can
//! fall back to "no diff info" instead of failing the analysis.

use git2::{DiffFormat, DiffOptions, Repository};
use std::path::Path;
use tracing::debug;

use crate::error::DiffUnavailable;

/// A unified diff plus the project root's location inside the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkdirDiff {
    pub text: String,
    /// Project root relative to the repository workdir (`""` when they match).
    pub prefix: String,
}

/// Diff the working tree (index and untracked files included) against
/// `baseline`, as unified patch text.
pub fn diff_workdir(root: &Path, baseline: &str) -> Result<WorkdirDiff, DiffUnavailable> {
    let repo = Repository::discover(root).map_err(|_| DiffUnavailable::NoRepository)?;
    let workdir = repo.workdir().ok_or(DiffUnavailable::NoRepository)?;

    let base_obj = repo
        .revparse_single(baseline)
        .map_err(|_| DiffUnavailable::UnknownRevision(baseline.to_string()))?;
    let base_tree = base_obj
        .peel_to_tree()
        .map_err(|_| DiffUnavailable::UnknownRevision(baseline.to_string()))?;

    let mut opts = DiffOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .show_untracked_content(true);
    let diff = repo
        .diff_tree_to_workdir_with_index(Some(&base_tree), Some(&mut opts))
        .map_err(|e| DiffUnavailable::Git(format!("Diff failed: {e}")))?;

    let mut text = String::new();
    diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        let content = String::from_utf8_lossy(line.content());
        match line.origin() {
            origin @ ('+' | '-' | ' ') => {
                text.push(origin);
                text.push_str(&content);
            }
            _ => text.push_str(&content),
        }
        true
    })
    .map_err(|e| DiffUnavailable::Git(format!("Diff printing failed: {e}")))?;

    let prefix = project_prefix(workdir, root);
    debug!(baseline, prefix = prefix.as_str(), bytes = text.len(), "Computed working tree diff");
    Ok(WorkdirDiff { text, prefix })
}

fn project_prefix(workdir: &Path, root: &Path) -> String {
    let workdir = workdir.canonicalize().unwrap_or_else(|_| workdir.to_path_buf());
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    root.strip_prefix(&workdir)
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .unwrap_or_default()
}
