//! Mach-O dylib bundling utilities.
//!
//! Given an executable inside an `.app` bundle, discovers every non-system
//! dylib it transitively links against, copies each one into
//! `Contents/Frameworks`, and rewrites load paths with `install_name_tool`
//! so the app runs without the build machine's library locations.
//!
//! Discovery and mutation are strictly two-phase: `otool` reads all original
//! metadata first, and every rewrite is deferred into a command queue that
//! runs only after the traversal finishes.

mod commands;
mod copy;
mod error;
mod inspect;
mod process;
mod resolve;
mod walk;

pub use commands::{CommandQueue, MutationCommand};
pub use copy::{copy_dir_recursive, copy_file_once, mirror_symlink, SymlinkStatus};
pub use error::BundleError;
pub use inspect::{
    parse_load_references, parse_rpath_entries, LinkInspector, ModuleReference, OtoolInspector,
    ReferenceKind,
};
pub use process::{classify, process_node, NodeKind};
pub use resolve::{BundleContext, FRAMEWORKS_DIR};
pub use walk::{bundle_executable, collect_closure, ClosureOutcome};
