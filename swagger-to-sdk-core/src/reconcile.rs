//! Reconciles a freshly generated tree with the destination tree of a project.
//!
//! Wrapper files are moved from the destination into the generated tree,
//! unwanted generated entries are deleted, then the generated tree replaces
//! the destination. The generated tree is consumed: calling [`reconcile`]
//! twice on the same tree fails.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::ReconcileError;
use crate::options::{self, OptionSet, BASE_DIRECTORY_KEY, DELETE_KEY, WRAPPER_KEY};

/// What a reconciliation did, paths relative to the tree they were matched in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Generated root that replaced the destination.
    pub generated_root: PathBuf,
    /// Wrapper entries moved from the destination into the generated tree.
    pub preserved: Vec<PathBuf>,
    /// Generated entries removed before the swap.
    pub deleted: Vec<PathBuf>,
}

pub fn reconcile(
    generated_dir: &Path,
    destination_dir: &Path,
    global: &OptionSet,
    local: &OptionSet,
) -> Result<ReconcileReport, ReconcileError> {
    let root = resolve_generated_root(generated_dir, global, local)?;
    if !root.is_dir() {
        return Err(ReconcileError::GeneratedTreeMissing(root));
    }
    if !destination_dir.is_dir() {
        return Err(ReconcileError::DestinationMissing(destination_dir.to_path_buf()));
    }
    info!(
        generated_root = %root.display(),
        destination = %destination_dir.display(),
        "Reconciling generated tree with destination"
    );

    let mut report = ReconcileReport {
        generated_root: root.clone(),
        ..ReconcileReport::default()
    };

    for pattern in options::merge_string_list(global, local, WRAPPER_KEY) {
        for source in glob_under(destination_dir, &pattern)? {
            if fs::symlink_metadata(&source).is_err() {
                continue;
            }
            let relative = relative_to(&source, destination_dir);
            let target = root.join(&relative);
            remove_entry(&target)?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| ReconcileError::io("create directory", parent, e))?;
            }
            move_path(&source, &target)?;
            debug!(path = %relative.display(), pattern = %pattern, "Preserved wrapper entry");
            report.preserved.push(relative);
        }
    }

    for pattern in options::merge_string_list(global, local, DELETE_KEY) {
        for victim in glob_under(&root, &pattern)? {
            let Ok(metadata) = fs::symlink_metadata(&victim) else {
                continue;
            };
            if metadata.is_dir() {
                fs::remove_dir_all(&victim).map_err(|e| ReconcileError::io("remove directory", &victim, e))?;
            } else {
                fs::remove_file(&victim).map_err(|e| ReconcileError::io("remove file", &victim, e))?;
            }
            prune_empty_parents(&victim, &root)?;
            let relative = relative_to(&victim, &root);
            debug!(path = %relative.display(), pattern = %pattern, "Deleted generated entry");
            report.deleted.push(relative);
        }
    }

    swap_into_place(&root, destination_dir)?;
    info!(
        destination = %destination_dir.display(),
        preserved = report.preserved.len(),
        deleted = report.deleted.len(),
        "Destination tree replaced by generated tree"
    );
    Ok(report)
}

/// The directory that really holds the generated code.
///
/// With `generated_relative_base_directory` set (local over global), the first
/// match of that glob under `generated_dir`; otherwise `generated_dir` itself.
pub fn resolve_generated_root(
    generated_dir: &Path,
    global: &OptionSet,
    local: &OptionSet,
) -> Result<PathBuf, ReconcileError> {
    let Some(pattern) = options::local_or_global_str(global, local, BASE_DIRECTORY_KEY) else {
        return Ok(generated_dir.to_path_buf());
    };
    glob_under(generated_dir, pattern)?
        .into_iter()
        .next()
        .ok_or_else(|| ReconcileError::BaseDirectoryNotFound {
            pattern: pattern.to_string(),
            root: generated_dir.to_path_buf(),
        })
}

fn glob_under(base: &Path, pattern: &str) -> Result<Vec<PathBuf>, ReconcileError> {
    let pattern = pattern.trim_start_matches("./");
    if pattern.is_empty() {
        return Ok(Vec::new());
    }
    let full = format!(
        "{}/{}",
        glob::Pattern::escape(&base.to_string_lossy()),
        pattern
    );
    let paths = glob::glob(&full).map_err(|source| ReconcileError::Pattern {
        pattern: pattern.to_string(),
        source,
    })?;
    let mut matches = Vec::new();
    for path in paths {
        matches.push(path?);
    }
    Ok(matches)
}

fn relative_to(path: &Path, base: &Path) -> PathBuf {
    path.strip_prefix(base).map(Path::to_path_buf).unwrap_or_else(|_| path.to_path_buf())
}

fn remove_entry(path: &Path) -> Result<(), ReconcileError> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => {
            fs::remove_dir_all(path).map_err(|e| ReconcileError::io("remove directory", path, e))
        }
        Ok(_) => fs::remove_file(path).map_err(|e| ReconcileError::io("remove file", path, e)),
        Err(_) => Ok(()),
    }
}

/// Remove the directories left empty by a deletion, up to (not including) `root`.
fn prune_empty_parents(removed: &Path, root: &Path) -> Result<(), ReconcileError> {
    let mut current = removed.parent();
    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        let mut entries = fs::read_dir(dir).map_err(|e| ReconcileError::io("read directory", dir, e))?;
        if entries.next().is_some() {
            break;
        }
        fs::remove_dir(dir).map_err(|e| ReconcileError::io("remove directory", dir, e))?;
        debug!(path = %dir.display(), "Removed emptied directory");
        current = dir.parent();
    }
    Ok(())
}

/// Rename, or copy then remove when the rename is refused (other filesystem).
fn move_path(from: &Path, to: &Path) -> Result<(), ReconcileError> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!(error = ?e, from = %from.display(), to = %to.display(), "Rename refused, copying instead");
            copy_recursive(from, to)?;
            remove_entry(from)
        }
    }
}

fn copy_recursive(from: &Path, to: &Path) -> Result<(), ReconcileError> {
    let metadata = fs::symlink_metadata(from).map_err(|e| ReconcileError::io("inspect", from, e))?;
    if metadata.is_dir() {
        fs::create_dir_all(to).map_err(|e| ReconcileError::io("create directory", to, e))?;
        let entries = fs::read_dir(from).map_err(|e| ReconcileError::io("read directory", from, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| ReconcileError::io("read directory", from, e))?;
            copy_recursive(&entry.path(), &to.join(entry.file_name()))?;
        }
        Ok(())
    } else {
        fs::copy(from, to)
            .map(|_| ())
            .map_err(|e| ReconcileError::io("copy", from, e))
    }
}

/// Replace `destination` by `root`.
///
/// The old destination is parked next to itself first so a failed placement
/// can be rolled back; it is removed once the new tree is in place.
fn swap_into_place(root: &Path, destination: &Path) -> Result<(), ReconcileError> {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "destination".to_string());
    let parked = destination.with_file_name(format!(".{name}.swap-old"));
    remove_entry(&parked)?;

    fs::rename(destination, &parked).map_err(|e| ReconcileError::io("park destination", destination, e))?;

    if let Err(err) = move_path(root, destination) {
        warn!(error = %err, destination = %destination.display(), "Placing generated tree failed, restoring destination");
        // A partial copy may sit at the destination path.
        if let Err(cleanup) = remove_entry(destination) {
            warn!(error = %cleanup, destination = %destination.display(), "Could not remove the partially placed tree");
        }
        if let Err(restore) = fs::rename(&parked, destination) {
            warn!(error = ?restore, parked = %parked.display(), "Could not restore the previous destination tree");
        }
        return Err(err);
    }

    remove_entry(&parked)
}
