//! Per-node copy and rewrite policy.
//!
//! Each discovered node is handled once, according to what it is on disk:
//! the root executable, a versioned symlink, a whole `.framework` bundle, or
//! a plain dylib. Processing copies (or links) the node into the Frameworks
//! folder, queues its rewrites, and returns the resolved absolute paths of
//! any further dependencies to walk.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::commands::{CommandQueue, MutationCommand};
use crate::copy::{copy_dir_recursive, copy_file_once, mirror_symlink};
use crate::inspect::{LinkInspector, ModuleReference, ReferenceKind};
use crate::resolve::{BundleContext, FRAMEWORKS_DIR};

/// How a node is copied and rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// The root executable. Rpaths are replaced wholesale and local load
    /// references move to `@rpath` form.
    Executable,
    /// A symlink (typically `libfoo.dylib -> libfoo.1.dylib`). Mirrored into
    /// Frameworks; its target becomes a node of its own.
    SymlinkLibrary,
    /// A `.framework` bundle directory, copied whole and otherwise trusted
    /// to be self-relocating.
    BundledLibrary,
    /// A plain dylib file. Copied, given a `@loader_path` identity, and its
    /// local references moved to `@loader_path` form.
    RegularLibrary,
}

/// Determine a node's kind from the on-disk path. The root executable is
/// identified by the caller, not by inspection.
pub fn classify(path: &Path, is_root: bool) -> NodeKind {
    if is_root {
        NodeKind::Executable
    } else if path.is_symlink() {
        NodeKind::SymlinkLibrary
    } else if framework_root(path).is_some() {
        NodeKind::BundledLibrary
    } else {
        NodeKind::RegularLibrary
    }
}

/// Innermost ancestor that is a `.framework` bundle directory, if any.
fn framework_root(path: &Path) -> Option<&Path> {
    path.ancestors().find(|a| {
        a.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".framework"))
    })
}

fn path_file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("path '{}' has no file name", path.display()))
}

/// Process one node, queueing its rewrites and returning the resolved
/// absolute paths of further dependencies to enqueue.
pub fn process_node(
    ctx: &BundleContext,
    inspector: &dyn LinkInspector,
    path: &Path,
    is_root: bool,
    queue: &mut CommandQueue,
) -> Result<Vec<PathBuf>> {
    match classify(path, is_root) {
        NodeKind::Executable => process_executable(ctx, inspector, path, queue),
        NodeKind::SymlinkLibrary => process_symlink(ctx, path),
        NodeKind::BundledLibrary => process_framework(ctx, path),
        NodeKind::RegularLibrary => process_regular(ctx, inspector, path, queue),
    }
}

/// Root executable: drop every existing rpath, add the single
/// `@executable_path/../Frameworks` rpath, and move each local load
/// reference to `@rpath/<name>`. Dependency locations are resolved against
/// the original rpaths, which must be read before the removals ever run.
fn process_executable(
    ctx: &BundleContext,
    inspector: &dyn LinkInspector,
    module: &Path,
    queue: &mut CommandQueue,
) -> Result<Vec<PathBuf>> {
    let old_rpaths = inspector.search_paths(module)?;
    for path in &old_rpaths {
        queue.push(MutationCommand::RemoveSearchPath {
            module: module.to_path_buf(),
            path: path.clone(),
        });
    }
    queue.push(MutationCommand::AddSearchPath {
        module: module.to_path_buf(),
        path: format!("@executable_path/../{FRAMEWORKS_DIR}"),
    });

    let references = inspector.linked_libraries(module)?;

    // The rpaths themselves may carry tokens; resolve them before using them
    // to locate @rpath dependencies.
    let resolved_rpaths = old_rpaths
        .iter()
        .map(|p| ctx.resolve(p, &[]))
        .collect::<Result<Vec<_>>>()?;

    let mut dependencies = Vec::new();
    for reference in &references {
        if reference.kind() != ReferenceKind::Local {
            continue;
        }
        queue.push(MutationCommand::ChangeLoadReference {
            module: module.to_path_buf(),
            old: reference.path.clone(),
            new: format!("@rpath/{}", reference.file_name()),
        });
        dependencies.push(ctx.resolve(&reference.path, &resolved_rpaths)?);
    }
    Ok(dependencies)
}

/// Symlink: mirror the link (same name, same target text) into Frameworks
/// without copying the target, and hand the resolved target back so it gets
/// processed as its own node.
fn process_symlink(ctx: &BundleContext, path: &Path) -> Result<Vec<PathBuf>> {
    let link_name = path_file_name(path)?;
    let target = fs::read_link(path)
        .with_context(|| format!("failed to read symlink '{}'", path.display()))?;
    mirror_symlink(&target, &ctx.frameworks_dir.join(&link_name))?;

    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    Ok(vec![parent.join(&target)])
}

/// Framework bundle: copy the whole `.framework` directory under Frameworks.
/// Assumed to already reference its own contents relatively, so it
/// contributes no further dependencies. That assumption holds for the
/// bundles seen so far (SDL2) but is not verified.
fn process_framework(ctx: &BundleContext, path: &Path) -> Result<Vec<PathBuf>> {
    let root = framework_root(path)
        .with_context(|| format!("'{}' is not inside a .framework bundle", path.display()))?;
    let dest = ctx.frameworks_dir.join(path_file_name(root)?);
    copy_dir_recursive(root, &dest)?;
    Ok(Vec::new())
}

/// Plain dylib: copy it into Frameworks (skipped when it already lives
/// there), then rewrite the copy. Entry 0 of its local reference list is its
/// own declared identity and becomes `@loader_path/<name>` via
/// `SetSelfIdentity`; every remaining local reference moves to
/// `@loader_path` form and is returned, resolved, for the walk.
fn process_regular(
    ctx: &BundleContext,
    inspector: &dyn LinkInspector,
    path: &Path,
    queue: &mut CommandQueue,
) -> Result<Vec<PathBuf>> {
    let name = path_file_name(path)?;
    let dest = ctx.frameworks_dir.join(&name);
    if path != dest {
        copy_file_once(path, &dest)?;
    }

    let references = inspector.linked_libraries(&dest)?;
    let locals: Vec<&ModuleReference> = references
        .iter()
        .filter(|r| r.kind() == ReferenceKind::Local)
        .collect();
    let Some((self_reference, rest)) = locals.split_first() else {
        return Ok(Vec::new());
    };

    let identity = ctx.resolve(&self_reference.path, &[])?;
    queue.push(MutationCommand::SetSelfIdentity {
        module: dest.clone(),
        identity: format!("@loader_path/{}", path_file_name(&identity)?),
    });

    let mut dependencies = Vec::new();
    for reference in rest {
        let resolved = ctx.resolve(&reference.path, &[])?;
        queue.push(MutationCommand::ChangeLoadReference {
            module: dest.clone(),
            old: resolved.to_string_lossy().into_owned(),
            new: format!("@loader_path/{}", path_file_name(&resolved)?),
        });
        dependencies.push(resolved);
    }
    Ok(dependencies)
}
