//! End-to-end traversal tests driving the walker with a scripted inspector.
//!
//! otool and install_name_tool only exist on macOS, so these tests script
//! the metadata side and assert on the queued commands and the files placed
//! in Contents/Frameworks. Commands are never executed here.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use dylib_bundle::{
    collect_closure, BundleContext, BundleError, LinkInspector, ModuleReference,
};
use tempfile::TempDir;

/// Inspector with canned metadata, keyed by module file name so a library
/// reports the same metadata before and after it is copied into Frameworks.
#[derive(Default)]
struct ScriptedInspector {
    libs: HashMap<String, Vec<String>>,
    rpaths: HashMap<String, Vec<String>>,
    read_log: RefCell<Vec<PathBuf>>,
}

impl ScriptedInspector {
    fn with_libs(mut self, name: &str, refs: &[&str]) -> Self {
        self.libs
            .insert(name.to_string(), refs.iter().map(|s| s.to_string()).collect());
        self
    }

    fn with_rpaths(mut self, name: &str, rpaths: &[&str]) -> Self {
        self.rpaths
            .insert(name.to_string(), rpaths.iter().map(|s| s.to_string()).collect());
        self
    }

    fn reads_of(&self, name: &str) -> usize {
        self.read_log
            .borrow()
            .iter()
            .filter(|p| p.file_name().is_some_and(|n| n == name))
            .count()
    }
}

impl LinkInspector for ScriptedInspector {
    fn linked_libraries(&self, module: &Path) -> Result<Vec<ModuleReference>> {
        self.read_log.borrow_mut().push(module.to_path_buf());
        let name = module.file_name().unwrap().to_string_lossy().into_owned();
        Ok(self
            .libs
            .get(&name)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(ModuleReference::new)
            .collect())
    }

    fn search_paths(&self, module: &Path) -> Result<Vec<String>> {
        let name = module.file_name().unwrap().to_string_lossy().into_owned();
        Ok(self.rpaths.get(&name).cloned().unwrap_or_default())
    }
}

struct Fixture {
    _temp: TempDir,
    root: PathBuf,
    executable: PathBuf,
    ctx: BundleContext,
}

fn fixture() -> Fixture {
    let temp = TempDir::new().unwrap();
    let root = temp.path().to_path_buf();
    let executable = root.join("App.app/Contents/MacOS/app");
    fs::create_dir_all(executable.parent().unwrap()).unwrap();
    fs::write(&executable, b"executable").unwrap();
    let ctx = BundleContext::for_executable(&executable).unwrap();
    Fixture {
        _temp: temp,
        root,
        executable,
        ctx,
    }
}

fn rendered(commands: &dylib_bundle::CommandQueue) -> Vec<String> {
    commands.iter().map(|c| c.to_string()).collect()
}

#[test]
fn test_end_to_end_rpath_scenario() {
    let fx = fixture();
    let rpath_dir = fx.root.join("orig/rpath");
    let other_dir = fx.root.join("other");
    fs::create_dir_all(&rpath_dir).unwrap();
    fs::create_dir_all(&other_dir).unwrap();
    let libfoo_src = rpath_dir.join("libfoo.dylib");
    let libbar_src = other_dir.join("libbar.dylib");
    fs::write(&libfoo_src, b"foo").unwrap();
    fs::write(&libbar_src, b"bar").unwrap();

    let inspector = ScriptedInspector::default()
        .with_rpaths("app", &[rpath_dir.to_str().unwrap()])
        .with_libs(
            "app",
            &["@rpath/libfoo.dylib", "/usr/lib/libSystem.B.dylib"],
        )
        .with_libs(
            "libfoo.dylib",
            &[libfoo_src.to_str().unwrap(), libbar_src.to_str().unwrap()],
        )
        .with_libs(
            "libbar.dylib",
            &[libbar_src.to_str().unwrap(), "/usr/lib/libSystem.B.dylib"],
        );

    let outcome = collect_closure(&fx.ctx, &inspector, &fx.executable, &[]).unwrap();

    // Closure: the executable plus both libraries, each exactly once.
    assert_eq!(
        outcome.processed,
        vec![fx.executable.clone(), libfoo_src.clone(), libbar_src.clone()]
    );

    // Both libraries landed in Frameworks.
    let fw = &fx.ctx.frameworks_dir;
    assert_eq!(fs::read(fw.join("libfoo.dylib")).unwrap(), b"foo");
    assert_eq!(fs::read(fw.join("libbar.dylib")).unwrap(), b"bar");

    let exe = fx.executable.display();
    let foo_dest = fw.join("libfoo.dylib");
    let bar_dest = fw.join("libbar.dylib");
    assert_eq!(
        rendered(&outcome.commands),
        vec![
            format!("install_name_tool -delete_rpath {} {exe}", rpath_dir.display()),
            format!("install_name_tool -add_rpath @executable_path/../Frameworks {exe}"),
            format!("install_name_tool -change @rpath/libfoo.dylib @rpath/libfoo.dylib {exe}"),
            format!(
                "install_name_tool -id @loader_path/libfoo.dylib {}",
                foo_dest.display()
            ),
            format!(
                "install_name_tool -change {} @loader_path/libbar.dylib {}",
                libbar_src.display(),
                foo_dest.display()
            ),
            format!(
                "install_name_tool -id @loader_path/libbar.dylib {}",
                bar_dest.display()
            ),
        ]
    );
}

#[test]
fn test_second_run_is_idempotent() {
    let fx = fixture();
    let lib_dir = fx.root.join("lib");
    fs::create_dir_all(&lib_dir).unwrap();
    let libfoo_src = lib_dir.join("libfoo.dylib");
    fs::write(&libfoo_src, b"original").unwrap();

    let inspector = ScriptedInspector::default()
        .with_libs("app", &[libfoo_src.to_str().unwrap()])
        .with_libs("libfoo.dylib", &[libfoo_src.to_str().unwrap()]);

    let first = collect_closure(&fx.ctx, &inspector, &fx.executable, &[]).unwrap();

    // Mutate the source after the first run; an idempotent second run must
    // not re-copy over the already bundled file.
    fs::write(&libfoo_src, b"changed").unwrap();
    let second = collect_closure(&fx.ctx, &inspector, &fx.executable, &[]).unwrap();

    assert_eq!(rendered(&first.commands), rendered(&second.commands));
    assert_eq!(first.processed, second.processed);
    assert_eq!(
        fs::read(fx.ctx.frameworks_dir.join("libfoo.dylib")).unwrap(),
        b"original"
    );
}

#[test]
fn test_shared_dependency_processed_once() {
    let fx = fixture();
    let lib_dir = fx.root.join("lib");
    fs::create_dir_all(&lib_dir).unwrap();
    let libfoo = lib_dir.join("libfoo.dylib");
    let libbaz = lib_dir.join("libbaz.dylib");
    let libbar = lib_dir.join("libbar.dylib");
    for (path, bytes) in [(&libfoo, "foo"), (&libbaz, "baz"), (&libbar, "bar")] {
        fs::write(path, bytes).unwrap();
    }

    // Diamond: app -> {libfoo, libbaz}, both -> libbar.
    let inspector = ScriptedInspector::default()
        .with_libs(
            "app",
            &[libfoo.to_str().unwrap(), libbaz.to_str().unwrap()],
        )
        .with_libs(
            "libfoo.dylib",
            &[libfoo.to_str().unwrap(), libbar.to_str().unwrap()],
        )
        .with_libs(
            "libbaz.dylib",
            &[libbaz.to_str().unwrap(), libbar.to_str().unwrap()],
        )
        .with_libs("libbar.dylib", &[libbar.to_str().unwrap()]);

    let outcome = collect_closure(&fx.ctx, &inspector, &fx.executable, &[]).unwrap();

    assert_eq!(
        outcome.processed,
        vec![fx.executable.clone(), libfoo, libbaz, libbar]
    );
    assert_eq!(inspector.reads_of("libbar.dylib"), 1);
}

#[test]
fn test_versioned_symlink_chain() {
    let fx = fixture();
    let lib_dir = fx.root.join("lib");
    fs::create_dir_all(&lib_dir).unwrap();
    let real = lib_dir.join("libfoo.1.dylib");
    fs::write(&real, b"real").unwrap();
    let link = lib_dir.join("libfoo.dylib");
    std::os::unix::fs::symlink("libfoo.1.dylib", &link).unwrap();

    let inspector = ScriptedInspector::default()
        .with_libs("app", &[link.to_str().unwrap()])
        .with_libs("libfoo.1.dylib", &[real.to_str().unwrap()]);

    let outcome = collect_closure(&fx.ctx, &inspector, &fx.executable, &[]).unwrap();

    // Link is mirrored, target is copied as its own node.
    let fw = &fx.ctx.frameworks_dir;
    assert_eq!(
        fs::read_link(fw.join("libfoo.dylib")).unwrap(),
        Path::new("libfoo.1.dylib")
    );
    assert_eq!(fs::read(fw.join("libfoo.1.dylib")).unwrap(), b"real");
    assert_eq!(
        outcome.processed,
        vec![fx.executable.clone(), link, real.clone()]
    );
    assert!(rendered(&outcome.commands).contains(&format!(
        "install_name_tool -id @loader_path/libfoo.1.dylib {}",
        fw.join("libfoo.1.dylib").display()
    )));
}

#[test]
fn test_conflicting_symlink_fails_loudly() {
    let fx = fixture();
    let lib_dir = fx.root.join("lib");
    fs::create_dir_all(&lib_dir).unwrap();
    fs::write(lib_dir.join("libfoo.1.dylib"), b"real").unwrap();
    let link = lib_dir.join("libfoo.dylib");
    std::os::unix::fs::symlink("libfoo.1.dylib", &link).unwrap();

    // A previous run (of something else) left a link with a different target.
    fs::create_dir_all(&fx.ctx.frameworks_dir).unwrap();
    std::os::unix::fs::symlink(
        "libfoo.2.dylib",
        fx.ctx.frameworks_dir.join("libfoo.dylib"),
    )
    .unwrap();

    let inspector =
        ScriptedInspector::default().with_libs("app", &[link.to_str().unwrap()]);

    let err = collect_closure(&fx.ctx, &inspector, &fx.executable, &[]).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BundleError>(),
        Some(BundleError::SymlinkConflict { .. })
    ));
    // The conflicting link was not touched.
    assert_eq!(
        fs::read_link(fx.ctx.frameworks_dir.join("libfoo.dylib")).unwrap(),
        Path::new("libfoo.2.dylib")
    );
}

#[test]
fn test_explicitly_supplied_dylibs_join_the_closure() {
    let fx = fixture();
    let lib_dir = fx.root.join("lib");
    fs::create_dir_all(&lib_dir).unwrap();
    let plugin = lib_dir.join("libplugin.dylib");
    fs::write(&plugin, b"plugin").unwrap();

    // The executable references nothing; the plugin is dlopen-only.
    let inspector = ScriptedInspector::default()
        .with_libs("app", &["/usr/lib/libSystem.B.dylib"])
        .with_libs("libplugin.dylib", &[plugin.to_str().unwrap()]);

    let outcome =
        collect_closure(&fx.ctx, &inspector, &fx.executable, &[plugin.clone()]).unwrap();

    assert_eq!(outcome.processed, vec![fx.executable.clone(), plugin]);
    assert_eq!(
        fs::read(fx.ctx.frameworks_dir.join("libplugin.dylib")).unwrap(),
        b"plugin"
    );
}

#[test]
fn test_system_references_never_enter_the_closure() {
    let fx = fixture();
    let inspector = ScriptedInspector::default().with_libs(
        "app",
        &[
            "/usr/lib/libSystem.B.dylib",
            "/System/Library/Frameworks/Cocoa.framework/Cocoa",
        ],
    );

    let outcome = collect_closure(&fx.ctx, &inspector, &fx.executable, &[]).unwrap();

    assert_eq!(outcome.processed, vec![fx.executable.clone()]);
    // No rpaths to delete and no load-reference changes; only the new rpath.
    assert_eq!(
        rendered(&outcome.commands),
        vec![format!(
            "install_name_tool -add_rpath @executable_path/../Frameworks {}",
            fx.executable.display()
        )]
    );
}
