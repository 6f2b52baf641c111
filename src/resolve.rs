//! Load-path token resolution.
//!
//! Mach-O load references may start with `@executable_path`, `@loader_path`
//! or `@rpath`. Node identity during traversal and all copy decisions use the
//! fully resolved absolute path, so every reference goes through
//! [`BundleContext::resolve`] before it is acted on.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use crate::error::BundleError;

/// Name of the folder inside `Contents/` that receives copied libraries.
pub const FRAMEWORKS_DIR: &str = "Frameworks";

/// Per-run locations derived from the executable being bundled. Threaded
/// explicitly through every call; there is no ambient global state.
#[derive(Debug, Clone)]
pub struct BundleContext {
    /// `<App>.app/Contents`
    pub content_dir: PathBuf,
    /// `<App>.app/Contents/Frameworks`, the single destination folder.
    pub frameworks_dir: PathBuf,
}

impl BundleContext {
    /// Derive the bundle layout from an executable at
    /// `<App>.app/Contents/MacOS/<exe>`.
    pub fn for_executable(executable: &Path) -> Result<Self> {
        let content_dir = executable
            .parent()
            .and_then(Path::parent)
            .with_context(|| {
                format!(
                    "executable '{}' is not inside a Contents/MacOS folder",
                    executable.display()
                )
            })?
            .to_path_buf();
        let frameworks_dir = content_dir.join(FRAMEWORKS_DIR);
        Ok(Self {
            content_dir,
            frameworks_dir,
        })
    }

    /// Resolve a load reference to an absolute filesystem path.
    ///
    /// `rpaths` is the referring module's own (already resolved) search path
    /// list; it only matters for `@rpath` references. Substitution rules, in
    /// priority order:
    ///
    /// 1. `@executable_path` - the token plus the one following segment (by
    ///    convention a `../`) is replaced with the Contents directory.
    /// 2. `@loader_path` - replaced with the Frameworks directory, since
    ///    post-copy every module's loader-relative peers live there.
    /// 3. `@rpath` - tried against each search path in declaration order;
    ///    first candidate present on disk wins, otherwise the Frameworks
    ///    directory is used.
    ///
    /// Any other token is a [`BundleError::UnresolvedPathToken`].
    pub fn resolve(&self, reference: &str, rpaths: &[PathBuf]) -> Result<PathBuf> {
        if let Some(rest) = reference.strip_prefix("@executable_path") {
            let rest = rest.trim_start_matches('/');
            // Drop the conventional "../" hop back out of Contents/MacOS.
            let rest = match rest.split_once('/') {
                Some((_, tail)) => tail,
                None => "",
            };
            return Ok(self.content_dir.join(rest));
        }

        if let Some(rest) = reference.strip_prefix("@loader_path") {
            return Ok(self.frameworks_dir.join(rest.trim_start_matches('/')));
        }

        if let Some(rest) = reference.strip_prefix("@rpath") {
            let rest = rest.trim_start_matches('/');
            for rpath in rpaths {
                let candidate = rpath.join(rest);
                if candidate.exists() || candidate.is_symlink() {
                    return Ok(candidate);
                }
            }
            // Not found under any declared search path; post-copy it will
            // live in Frameworks.
            return Ok(self.frameworks_dir.join(rest));
        }

        if reference.starts_with('@') {
            bail!(BundleError::UnresolvedPathToken {
                reference: reference.to_string(),
            });
        }

        Ok(PathBuf::from(reference))
    }
}
