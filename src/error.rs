//! Error types for bundling operations.
//!
//! All of these are fatal: the run aborts on the first one with no retry and
//! no cleanup of a partially populated Frameworks folder.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced while discovering the dependency closure or applying
/// load-path rewrites.
#[derive(Error, Debug)]
pub enum BundleError {
    /// A load reference contains an `@`-token that no substitution rule or
    /// on-disk candidate can resolve.
    #[error("unresolved path token in load reference '{reference}'")]
    UnresolvedPathToken { reference: String },

    /// A symlink we want to mirror into the Frameworks folder already exists
    /// there with a different target. Never overwritten silently.
    #[error(
        "symlink conflict at '{link}': points to '{existing}', expected '{wanted}'",
        link = .link.display(),
        existing = .existing.display(),
        wanted = .wanted.display()
    )]
    SymlinkConflict {
        link: PathBuf,
        existing: PathBuf,
        wanted: PathBuf,
    },

    /// `otool` could not be run on, or its output could not be read for, a
    /// module.
    #[error("failed to read link metadata from '{module}': {detail}", module = .module.display())]
    MetadataReadFailure { module: PathBuf, detail: String },

    /// An `install_name_tool` invocation reported non-zero status. Remaining
    /// queued commands are not executed.
    #[error("rewrite failed on '{module}': {detail}", module = .module.display())]
    MutationFailure { module: PathBuf, detail: String },

    /// A filesystem copy into the Frameworks folder could not complete.
    #[error("failed to copy '{from}' to '{to}'", from = .from.display(), to = .to.display())]
    CopyFailure {
        from: PathBuf,
        to: PathBuf,
        #[source]
        cause: std::io::Error,
    },
}
