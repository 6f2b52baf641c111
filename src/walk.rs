//! Breadth-first discovery of the dependency closure.
//!
//! The frontier is consumed in whole batches: every node of one level is
//! processed before the next level is computed. Node identity is the
//! token-resolved absolute path, so each module is processed at most once no
//! matter how many references point at it. No rewrite runs until discovery
//! is complete, because rewriting a module changes what a later otool read
//! of it would report.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::commands::CommandQueue;
use crate::inspect::{LinkInspector, OtoolInspector};
use crate::process::process_node;
use crate::resolve::BundleContext;

/// Result of a full traversal: the nodes processed, in processing order, and
/// the rewrite commands queued for them.
#[derive(Debug)]
pub struct ClosureOutcome {
    pub processed: Vec<PathBuf>,
    pub commands: CommandQueue,
}

/// Walk the dependency graph rooted at `executable`, copying every
/// discovered node into the Frameworks folder and accumulating its rewrites.
///
/// `extra_modules` are modules loaded at runtime (dlopen) that no load
/// command references; they join the executable in the initial frontier.
/// Commands are only collected here, never executed.
pub fn collect_closure(
    ctx: &BundleContext,
    inspector: &dyn LinkInspector,
    executable: &Path,
    extra_modules: &[PathBuf],
) -> Result<ClosureOutcome> {
    fs::create_dir_all(&ctx.frameworks_dir).with_context(|| {
        format!(
            "failed to create frameworks folder '{}'",
            ctx.frameworks_dir.display()
        )
    })?;

    let mut commands = CommandQueue::new();
    let mut done: HashSet<PathBuf> = HashSet::new();
    let mut processed: Vec<PathBuf> = Vec::new();

    let mut frontier: Vec<PathBuf> = Vec::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();
    for node in std::iter::once(executable.to_path_buf()).chain(extra_modules.iter().cloned()) {
        if seen.insert(node.clone()) {
            frontier.push(node);
        }
    }

    while !frontier.is_empty() {
        let mut discovered: Vec<PathBuf> = Vec::new();
        for node in &frontier {
            info!("processing {}", node.display());
            let is_root = node.as_path() == executable;
            discovered.extend(process_node(ctx, inspector, node, is_root, &mut commands)?);
            processed.push(node.clone());
        }
        done.extend(frontier.drain(..));

        let mut batch_seen: HashSet<PathBuf> = HashSet::new();
        for dep in discovered {
            if !done.contains(&dep) && batch_seen.insert(dep.clone()) {
                frontier.push(dep);
            }
        }
    }

    Ok(ClosureOutcome {
        processed,
        commands,
    })
}

/// Discover the closure of `executable` with otool, then apply every queued
/// `install_name_tool` rewrite. This is the whole tool.
pub fn bundle_executable(executable: &Path, extra_modules: &[PathBuf]) -> Result<ClosureOutcome> {
    let ctx = BundleContext::for_executable(executable)?;
    let outcome = collect_closure(&ctx, &OtoolInspector, executable, extra_modules)?;
    outcome.commands.run()?;
    Ok(outcome)
}
