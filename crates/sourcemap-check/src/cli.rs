//! CLI argument parsing.

use camino::Utf8PathBuf;
use clap::Parser;

/// Checks that Svelte source maps resolve generated code back to the input.
#[derive(Debug, Parser)]
#[command(name = "sourcemap-check")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Directory holding one fixture directory per case
    #[arg(long, default_value = "tests/sourcemaps/samples")]
    pub fixtures: Utf8PathBuf,

    /// Directory `svelte/compiler` is resolved from
    #[arg(long, default_value = ".")]
    pub workspace: Utf8PathBuf,

    /// Glob patterns selecting fixtures by name
    #[arg(long)]
    pub filter: Vec<String>,

    /// Number of concurrent workers
    #[arg(long, short = 'j', default_value_t = 4)]
    pub jobs: usize,

    /// Do not write `_actual.*` files into fixtures
    #[arg(long = "no-persist")]
    pub no_persist: bool,

    /// Path to the bun binary
    #[arg(long)]
    pub bun: Option<Utf8PathBuf>,
}
