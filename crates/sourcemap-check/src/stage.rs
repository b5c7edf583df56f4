//! Pipeline stages: collaborator traits and the adapter that normalizes their
//! output into decoded artifacts.

use crate::error::{HarnessError, StageError};
use async_trait::async_trait;
use serde::Deserialize;
use source_map::{ChainResolver, RawSourceMap, SourceMap, Stage};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Which artifact of a test case something refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Input,
    Preprocessed,
    Js,
    Css,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArtifactKind::Input => "input",
            ArtifactKind::Preprocessed => "preprocessed",
            ArtifactKind::Js => "js",
            ArtifactKind::Css => "css",
        })
    }
}

/// Code plus an undecoded map, as a collaborator hands it over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawArtifact {
    pub code: String,
    pub map: Option<RawSourceMap>,
}

impl RawArtifact {
    /// An artifact without a map.
    pub fn unmapped(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            map: None,
        }
    }
}

/// Output of one compilation: the script and, when the component has styles,
/// the stylesheet.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub js: RawArtifact,
    pub css: Option<RawArtifact>,
}

/// Keys of [`CompileOptions`] that `extra` may not override.
const RESERVED_OPTIONS: &[&str] = &["filename", "outputFilename", "cssOutputFilename", "sourcemap"];

/// Options handed to the compiler.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOptions {
    /// Name of the component, used as the map source.
    pub filename: String,
    /// Name recorded as the script map's `file`.
    pub output_filename: String,
    /// Name recorded as the stylesheet map's `file`.
    pub css_output_filename: String,
    /// Compiler-specific options passed through unchanged.
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CompileOptions {
    /// Creates options writing `{output_name}.js` and `{output_name}.css`.
    pub fn new(filename: impl Into<String>, output_name: &str) -> Self {
        Self {
            filename: filename.into(),
            output_filename: format!("{output_name}.js"),
            css_output_filename: format!("{output_name}.css"),
            extra: serde_json::Map::new(),
        }
    }

    /// Adds pass-through options, rejecting keys the harness controls.
    pub fn with_extra(
        mut self,
        extra: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, String> {
        if let Some(key) = extra.keys().find(|key| RESERVED_OPTIONS.contains(&key.as_str())) {
            return Err(format!("compile option {key:?} is set by the harness"));
        }
        self.extra = extra;
        Ok(self)
    }
}

/// A preprocessing transform over the whole component markup.
#[async_trait]
pub trait Preprocessor: Send + Sync {
    /// A short name for error messages.
    fn name(&self) -> &str;

    /// Transforms `code`. Returning the input unchanged without a map is the identity.
    async fn markup(&self, code: &str, filename: &str) -> Result<RawArtifact, StageError>;
}

/// A compiler turning preprocessed markup into script and style artifacts.
#[async_trait]
pub trait Compiler: Send + Sync {
    async fn compile(
        &self,
        code: &str,
        options: &CompileOptions,
    ) -> Result<CompileOutput, StageError>;
}

/// Hands out compiler sessions, one per concurrently running worker.
#[async_trait]
pub trait CompilerFactory: Send + Sync {
    async fn session(&self) -> Result<Arc<dyn Compiler>, StageError>;
}

/// The result of running every preprocessor in order.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub code: String,
    /// One stage per preprocessor, first to last.
    pub chain: ChainResolver,
}

/// Runs preprocessors in sequence, each consuming the previous output.
pub async fn run_preprocess(
    preprocessors: &[Arc<dyn Preprocessor>],
    input: &str,
    filename: &str,
) -> Result<Preprocessed, HarnessError> {
    let mut code = input.to_string();
    let mut chain = ChainResolver::new();

    for preprocessor in preprocessors {
        let output = preprocessor
            .markup(&code, filename)
            .await
            .map_err(|source| HarnessError::Stage {
                stage: format!("preprocess ({})", preprocessor.name()),
                source,
            })?;
        let stage = Stage::decode(filename, output.map.as_ref()).map_err(|source| {
            HarnessError::MapDecode {
                artifact: ArtifactKind::Preprocessed,
                source,
            }
        })?;
        debug!(
            preprocessor = preprocessor.name(),
            mapped = stage.map().is_some(),
            "preprocessed"
        );
        chain.push(stage);
        code = output.code;
    }

    Ok(Preprocessed { code, chain })
}

/// Runs the compiler once.
pub async fn run_compile(
    compiler: &dyn Compiler,
    code: &str,
    options: &CompileOptions,
) -> Result<CompileOutput, HarnessError> {
    let output = compiler
        .compile(code, options)
        .await
        .map_err(|source| HarnessError::Stage {
            stage: "compile".to_string(),
            source,
        })?;
    debug!(
        js_mapped = output.js.map.is_some(),
        css = output.css.is_some(),
        "compiled"
    );
    Ok(output)
}

/// Decodes a compiled artifact's map as the last stage of `upstream`.
pub fn decode_stage(
    artifact: ArtifactKind,
    filename: &str,
    raw: &RawArtifact,
) -> Result<Stage, HarnessError> {
    Stage::decode(filename, raw.map.as_ref())
        .map_err(|source| HarnessError::MapDecode { artifact, source })
}

/// Checks that a map's `sources` equal `expected`, ignoring order.
///
/// Artifacts without a map are not checked.
pub fn check_sources(
    artifact: ArtifactKind,
    map: Option<&SourceMap>,
    expected: &[String],
) -> Result<(), HarnessError> {
    let Some(map) = map else {
        return Ok(());
    };

    let mut actual: Vec<String> = map
        .sources()
        .iter()
        .map(|source| source.clone().unwrap_or_else(|| "null".to_string()))
        .collect();
    let mut expected = expected.to_vec();
    actual.sort();
    expected.sort();

    if actual != expected {
        return Err(HarnessError::SourcesMismatch {
            artifact,
            expected,
            actual,
        });
    }
    Ok(())
}
