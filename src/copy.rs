//! Filesystem primitives for populating the Frameworks folder.
//!
//! All of these are idempotent against re-runs: files already present at the
//! destination are left alone, and identical symlinks are a no-op. The one
//! hard failure is a symlink whose name is taken by something else.

use anyhow::{bail, Result};
use std::fs;
use std::path::Path;

use crate::error::BundleError;

/// Outcome of [`mirror_symlink`]. A conflicting entry at the link name is a
/// [`BundleError::SymlinkConflict`], never a silent overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymlinkStatus {
    Created,
    AlreadyIdentical,
}

/// Create `link` pointing at `target` (the literal link text, usually a bare
/// file name relative to the link's own directory).
pub fn mirror_symlink(target: &Path, link: &Path) -> Result<SymlinkStatus> {
    if link.is_symlink() {
        let existing = fs::read_link(link).map_err(|cause| BundleError::CopyFailure {
            from: target.to_path_buf(),
            to: link.to_path_buf(),
            cause,
        })?;
        if existing == target {
            return Ok(SymlinkStatus::AlreadyIdentical);
        }
        bail!(BundleError::SymlinkConflict {
            link: link.to_path_buf(),
            existing,
            wanted: target.to_path_buf(),
        });
    }
    if link.exists() {
        // A regular file squatting on the link name is a conflict too.
        bail!(BundleError::SymlinkConflict {
            link: link.to_path_buf(),
            existing: link.to_path_buf(),
            wanted: target.to_path_buf(),
        });
    }
    std::os::unix::fs::symlink(target, link).map_err(|cause| BundleError::CopyFailure {
        from: target.to_path_buf(),
        to: link.to_path_buf(),
        cause,
    })?;
    Ok(SymlinkStatus::Created)
}

/// Copy `src` to `dest` unless `dest` already exists.
///
/// Returns `true` if a copy was performed, `false` if it was skipped. The
/// skip is what makes re-running the tool over a partially processed bundle
/// safe.
pub fn copy_file_once(src: &Path, dest: &Path) -> Result<bool> {
    if dest.exists() {
        return Ok(false);
    }
    fs::copy(src, dest).map_err(|cause| BundleError::CopyFailure {
        from: src.to_path_buf(),
        to: dest.to_path_buf(),
        cause,
    })?;
    Ok(true)
}

/// Copy a directory tree, preserving symlinks as symlinks and skipping
/// entries that already exist at the destination.
///
/// Used for `.framework` bundles, which are copied whole and unmodified.
/// Returns the total size in bytes of the files actually copied.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<u64> {
    let mut total_size: u64 = 0;

    if !src.is_dir() {
        return Ok(0);
    }

    fs::create_dir_all(dst).map_err(|cause| BundleError::CopyFailure {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        cause,
    })?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let path = entry.path();
        let dest_path = dst.join(entry.file_name());

        if path.is_symlink() {
            let target = fs::read_link(&path)?;
            if !dest_path.exists() && !dest_path.is_symlink() {
                std::os::unix::fs::symlink(&target, &dest_path)?;
            }
        } else if path.is_dir() {
            total_size += copy_dir_recursive(&path, &dest_path)?;
        } else if copy_file_once(&path, &dest_path)? {
            if let Ok(meta) = fs::metadata(&dest_path) {
                total_size += meta.len();
            }
        }
    }

    Ok(total_size)
}
