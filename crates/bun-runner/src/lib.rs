//! bun worker running `svelte/compiler` for source map fixtures.

mod runner;

pub use runner::{
    BunCompileOptions, BunCompileOutput, BunError, BunOutputFile, BunRunner, BunSession,
};
