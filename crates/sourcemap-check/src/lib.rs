//! Source-map fidelity harness for a Svelte preprocess → compile pipeline.
//!
//! A case reads an input component, runs it through preprocessors and a
//! compiler, composes the maps every stage emits, and lets assertions resolve
//! positions in any artifact back to the input.

pub mod compiler;
pub mod config;
pub mod error;
pub mod expect;
pub mod harness;
pub mod orchestrator;
pub mod persist;
pub mod preprocess;
pub mod stage;

pub use config::FixtureConfig;
pub use error::{AssertionError, HarnessError, StageError};
pub use expect::Expectation;
pub use harness::{
    ArtifactView, Artifacts, LoadedCase, SourcemapTest, StagedCase, VerifiedCase, OUTPUT_NAME,
};
pub use orchestrator::{discover, run_fixtures, Fixture, RunOptions, RunSummary};
pub use preprocess::PreprocessDescriptor;
pub use stage::{
    ArtifactKind, CompileOptions, CompileOutput, Compiler, CompilerFactory, Preprocessor,
    RawArtifact,
};
