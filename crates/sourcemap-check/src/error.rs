//! Error types.

use crate::stage::ArtifactKind;
use camino::Utf8PathBuf;
use source_map::{DecodeError, LocateError, Position};
use thiserror::Error;

/// A failure reported by a preprocessing or compilation collaborator.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct StageError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StageError {
    /// Creates an error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error wrapping an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Errors that abort one test case.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The fixture input could not be read.
    #[error("failed to read {path}: {source}")]
    InputRead {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A collaborator failed.
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: StageError,
    },

    /// A stage produced a map that does not decode.
    #[error("invalid {artifact} source map: {source}")]
    MapDecode {
        artifact: ArtifactKind,
        #[source]
        source: DecodeError,
    },

    /// A map's `sources` differ from the configured expectation.
    #[error("{artifact}.map.sources is wrong: expected {expected:?}, got {actual:?}")]
    SourcesMismatch {
        artifact: ArtifactKind,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// The fixture configuration is invalid.
    #[error("invalid config {path}: {message}")]
    Config { path: Utf8PathBuf, message: String },

    /// An inspection artifact could not be written.
    #[error("failed to write {path}: {source}")]
    Persist {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A user assertion failed.
    #[error("assertion failed: {0}")]
    Assertion(#[from] AssertionError),
}

/// Assertion failures raised while verifying artifacts.
#[derive(Debug, Error)]
pub enum AssertionError {
    /// A snippet does not occur in an artifact.
    #[error("{artifact}: occurrence {occurrence} of {needle:?} not found")]
    SnippetNotFound {
        artifact: ArtifactKind,
        needle: String,
        occurrence: usize,
    },

    /// The artifact has no map to resolve against.
    #[error("{artifact} has no source map")]
    NoMap { artifact: ArtifactKind },

    /// A snippet resolves nowhere.
    #[error("{artifact}: {needle:?} at {generated} does not resolve")]
    Unresolved {
        artifact: ArtifactKind,
        needle: String,
        generated: Position,
    },

    /// A snippet resolves somewhere else.
    #[error("{artifact}: {needle:?} at {generated} resolves to {actual}, expected {expected}")]
    Mismatch {
        artifact: ArtifactKind,
        needle: String,
        generated: Position,
        expected: String,
        actual: String,
    },

    /// An offset or position does not exist.
    #[error(transparent)]
    Locate(#[from] LocateError),

    /// A free-form failure from a user callback.
    #[error("{0}")]
    Failed(String),
}
