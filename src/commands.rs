//! Deferred load-path rewrite commands.
//!
//! otool reads must see original metadata, so nothing is rewritten while the
//! dependency graph is still being discovered. Commands accumulate here in
//! append order during traversal and run in bulk afterwards, each as one
//! `install_name_tool` invocation.

use anyhow::{bail, Result};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

use crate::error::BundleError;

const REWRITE_TOOL: &str = "install_name_tool";

/// One load-path mutation against one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationCommand {
    /// `install_name_tool -delete_rpath <path> <module>`
    RemoveSearchPath { module: PathBuf, path: String },
    /// `install_name_tool -add_rpath <path> <module>`
    AddSearchPath { module: PathBuf, path: String },
    /// `install_name_tool -change <old> <new> <module>`
    ChangeLoadReference {
        module: PathBuf,
        old: String,
        new: String,
    },
    /// `install_name_tool -id <identity> <module>`
    SetSelfIdentity { module: PathBuf, identity: String },
}

impl MutationCommand {
    pub fn module(&self) -> &Path {
        match self {
            Self::RemoveSearchPath { module, .. }
            | Self::AddSearchPath { module, .. }
            | Self::ChangeLoadReference { module, .. }
            | Self::SetSelfIdentity { module, .. } => module,
        }
    }

    fn args(&self) -> Vec<OsString> {
        match self {
            Self::RemoveSearchPath { module, path } => {
                vec!["-delete_rpath".into(), path.into(), module.into()]
            }
            Self::AddSearchPath { module, path } => {
                vec!["-add_rpath".into(), path.into(), module.into()]
            }
            Self::ChangeLoadReference { module, old, new } => {
                vec!["-change".into(), old.into(), new.into(), module.into()]
            }
            Self::SetSelfIdentity { module, identity } => {
                vec!["-id".into(), identity.into(), module.into()]
            }
        }
    }
}

impl fmt::Display for MutationCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{REWRITE_TOOL}")?;
        for arg in self.args() {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Append-only accumulator for the rewrite phase.
#[derive(Debug, Default)]
pub struct CommandQueue {
    commands: Vec<MutationCommand>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: MutationCommand) {
        self.commands.push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MutationCommand> {
        self.commands.iter()
    }

    /// Execute every queued command in append order. Each invocation is
    /// logged before it runs. The first failing command aborts the rest;
    /// earlier rewrites are not rolled back.
    pub fn run(&self) -> Result<()> {
        for command in &self.commands {
            info!("{command}");
            let output = Command::new(REWRITE_TOOL)
                .args(command.args())
                .output()
                .map_err(|e| BundleError::MutationFailure {
                    module: command.module().to_path_buf(),
                    detail: format!("failed to invoke {REWRITE_TOOL}: {e}"),
                })?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                bail!(BundleError::MutationFailure {
                    module: command.module().to_path_buf(),
                    detail: format!("'{command}' exited with {}: {}", output.status, stderr.trim()),
                });
            }
        }
        Ok(())
    }
}
