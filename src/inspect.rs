//! Mach-O link metadata inspection using otool.
//!
//! `otool -L` lists the load references recorded in a module, `otool -l`
//! lists its LC_RPATH search paths. Both reads reflect the current on-disk
//! state of the module, so every read must happen before any rewrite is
//! applied to that module.

use anyhow::{bail, Result};
use std::path::Path;
use std::process::Command;

use crate::error::BundleError;

/// Path prefixes owned by the OS. References under these are satisfied by the
/// system at load time (often from the shared cache, not even on disk) and
/// are never copied or rewritten.
const SYSTEM_PREFIXES: &[&str] = &["/System/Library/", "/usr/lib"];

/// Whether a reference points at an OS-provided library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    System,
    Local,
}

/// A load reference as recorded inside a module, possibly containing
/// unresolved `@executable_path`/`@loader_path`/`@rpath` tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleReference {
    pub path: String,
}

impl ModuleReference {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn kind(&self) -> ReferenceKind {
        if SYSTEM_PREFIXES.iter().any(|p| self.path.starts_with(p)) {
            ReferenceKind::System
        } else {
            ReferenceKind::Local
        }
    }

    /// Final path component, used when rewriting to `@rpath/<name>` or
    /// `@loader_path/<name>` form.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Read-only access to a module's recorded load references and search paths.
///
/// Production code shells out to otool; tests drive the walker with a
/// scripted implementation instead.
pub trait LinkInspector {
    /// Ordered load references as declared in the module. For a dylib the
    /// first entry is its own declared identity (LC_ID_DYLIB); an executable
    /// has no self entry.
    fn linked_libraries(&self, module: &Path) -> Result<Vec<ModuleReference>>;

    /// Ordered LC_RPATH entries declared by the module.
    fn search_paths(&self, module: &Path) -> Result<Vec<String>>;
}

/// Inspector backed by `/usr/bin/otool`.
pub struct OtoolInspector;

impl OtoolInspector {
    fn run(&self, flag: &str, module: &Path) -> Result<String> {
        if !module.exists() {
            bail!(BundleError::MetadataReadFailure {
                module: module.to_path_buf(),
                detail: "file does not exist".to_string(),
            });
        }

        let output = Command::new("otool")
            .arg(flag)
            .arg(module)
            .output()
            .map_err(|e| BundleError::MetadataReadFailure {
                module: module.to_path_buf(),
                detail: format!("failed to invoke otool: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(BundleError::MetadataReadFailure {
                module: module.to_path_buf(),
                detail: format!("otool {flag} failed: {}", stderr.trim()),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl LinkInspector for OtoolInspector {
    fn linked_libraries(&self, module: &Path) -> Result<Vec<ModuleReference>> {
        let stdout = self.run("-L", module)?;
        Ok(parse_load_references(&stdout))
    }

    fn search_paths(&self, module: &Path) -> Result<Vec<String>> {
        let stdout = self.run("-l", module)?;
        Ok(parse_rpath_entries(&stdout))
    }
}

/// Parse `otool -L` output into load references, in declaration order.
///
/// Line grammar: the first line is the module header (`<path>:`); each
/// reference line is TAB-indented, path first, then a parenthesized version
/// note:
/// ```text
/// /tmp/App.app/Contents/MacOS/app:
///         @rpath/libfoo.dylib (compatibility version 1.0.0, current version 1.2.0)
///         /usr/lib/libSystem.B.dylib (compatibility version 1.0.0, current version 1311.0.0)
/// ```
pub fn parse_load_references(output: &str) -> Vec<ModuleReference> {
    let mut refs = Vec::new();
    for line in output.lines() {
        let Some(rest) = line.strip_prefix('\t') else {
            continue;
        };
        let path = rest.split(' ').next().unwrap_or(rest);
        if !path.is_empty() {
            refs.push(ModuleReference::new(path));
        }
    }
    refs
}

/// Parse `otool -l` output into LC_RPATH entries, in declaration order.
///
/// Line grammar: each LC_RPATH load command prints an indented
/// `path <value> (offset NN)` line; no other load command uses the `path`
/// key:
/// ```text
/// Load command 14
///           cmd LC_RPATH
///       cmdsize 32
///          path /usr/local/lib (offset 12)
/// ```
pub fn parse_rpath_entries(output: &str) -> Vec<String> {
    let mut rpaths = Vec::new();
    for line in output.lines() {
        let Some(rest) = line.trim_start().strip_prefix("path ") else {
            continue;
        };
        let Some(end) = rest.rfind(" (offset ") else {
            continue;
        };
        rpaths.push(rest[..end].to_string());
    }
    rpaths
}
