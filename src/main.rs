//! dylib-bundle - package an app's dylib dependencies into its bundle.
//!
//! Copies every non-system dylib an executable transitively links against
//! into `Contents/Frameworks` and rewrites the load paths so nothing refers
//! to the build machine's filesystem.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use dylib_bundle::bundle_executable;

/// Package dylibs that are statically referenced by an executable and remove
/// references to their absolute paths. Dylibs that are only loaded
/// dynamically at runtime can be passed as extra arguments.
#[derive(Parser, Debug)]
#[command(name = "dylib-bundle")]
#[command(author, version, about)]
struct Cli {
    /// Executable inside the app bundle (<App>.app/Contents/MacOS/<exe>)
    executable: PathBuf,

    /// Additional dylibs to bundle that no load command references
    dylibs: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    bundle_executable(&cli.executable, &cli.dylibs)?;
    Ok(())
}
