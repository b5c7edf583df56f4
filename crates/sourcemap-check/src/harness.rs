//! The per-case state machine: Loaded → Staged → Verified.

use crate::config::CONFIG_FILENAME;
use crate::error::{AssertionError, HarnessError};
use crate::persist;
use crate::stage::{
    check_sources, decode_stage, run_compile, run_preprocess, ArtifactKind, CompileOptions,
    Compiler, Preprocessor, RawArtifact,
};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use source_map::{ChainResolver, Locator, Position, Resolution, SourceMap, TextBuffer};
use std::fmt;
use std::fs;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Base name of the files written for inspection.
pub const OUTPUT_NAME: &str = "_actual";

/// Name of the fixture input file.
pub const INPUT_FILENAME: &str = "input.svelte";

/// How one case is staged and what its maps must list.
#[derive(Clone)]
pub struct SourcemapTest {
    /// Name the input is known by in maps.
    pub filename: String,
    /// Extra compiler options, passed through.
    pub compile_options: serde_json::Map<String, serde_json::Value>,
    /// Preprocessors, run in order.
    pub preprocess: Vec<Arc<dyn Preprocessor>>,
    /// Expected `js.map.sources`; defaults to `[filename]`.
    pub js_map_sources: Option<Vec<String>>,
    /// Expected `css.map.sources`; defaults to `[filename]`.
    pub css_map_sources: Option<Vec<String>>,
    /// Where these settings came from, for error messages.
    pub config_path: Utf8PathBuf,
}

impl Default for SourcemapTest {
    fn default() -> Self {
        Self {
            filename: INPUT_FILENAME.to_string(),
            compile_options: serde_json::Map::new(),
            preprocess: Vec::new(),
            js_map_sources: None,
            css_map_sources: None,
            config_path: Utf8PathBuf::from(CONFIG_FILENAME),
        }
    }
}

impl fmt::Debug for SourcemapTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourcemapTest")
            .field("filename", &self.filename)
            .field("compile_options", &self.compile_options)
            .field(
                "preprocess",
                &self.preprocess.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("js_map_sources", &self.js_map_sources)
            .field("css_map_sources", &self.css_map_sources)
            .field("config_path", &self.config_path)
            .finish()
    }
}

impl SourcemapTest {
    fn expected_sources(&self, artifact: ArtifactKind) -> Vec<String> {
        let configured = match artifact {
            ArtifactKind::Css => &self.css_map_sources,
            _ => &self.js_map_sources,
        };
        configured
            .clone()
            .unwrap_or_else(|| vec![self.filename.clone()])
    }
}

/// One artifact with everything assertions need.
#[derive(Debug, Clone)]
pub struct ArtifactView {
    pub kind: ArtifactKind,
    /// The map back to the true original, composed across stages.
    pub map: Option<SourceMap>,
    /// Resolver chaining through every stage; present when `map` is.
    pub map_consumer: Option<ChainResolver>,
    /// Locator reporting 0-based lines.
    pub locate: Locator,
    /// Locator reporting 1-based lines, matching map positions.
    pub locate_1: Locator,
}

impl ArtifactView {
    fn new(kind: ArtifactKind, code: impl Into<Arc<str>>, chain: Option<ChainResolver>) -> Self {
        let buffer = TextBuffer::new(code);
        let map = chain.as_ref().and_then(ChainResolver::compose);
        let map_consumer = chain.filter(|_| map.is_some());
        Self {
            kind,
            map,
            map_consumer,
            locate: buffer.locator(0),
            locate_1: buffer.locator(1),
        }
    }

    /// Returns the artifact's text.
    pub fn code(&self) -> &str {
        self.locate.buffer().text()
    }

    /// Resolves a generated position to the true original, or `None` when the
    /// artifact has no map.
    pub fn original_position_for(&self, generated: Position) -> Option<Resolution> {
        self.map_consumer
            .as_ref()
            .map(|consumer| consumer.original_position_for(generated))
    }
}

/// All artifacts of one case.
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub input: ArtifactView,
    pub preprocessed: ArtifactView,
    pub js: ArtifactView,
    pub css: ArtifactView,
}

impl Artifacts {
    /// Returns the view of one artifact.
    pub fn get(&self, kind: ArtifactKind) -> &ArtifactView {
        match kind {
            ArtifactKind::Input => &self.input,
            ArtifactKind::Preprocessed => &self.preprocessed,
            ArtifactKind::Js => &self.js,
            ArtifactKind::Css => &self.css,
        }
    }
}

/// Input read and located; nothing run yet.
#[derive(Debug)]
pub struct LoadedCase {
    test: SourcemapTest,
    input: ArtifactView,
}

impl LoadedCase {
    /// Reads `input.svelte` from a fixture directory.
    pub fn load(dir: &Utf8Path, test: SourcemapTest) -> Result<Self, HarnessError> {
        let path: Utf8PathBuf = dir.join(INPUT_FILENAME);
        let code = fs::read_to_string(&path)
            .map_err(|source| HarnessError::InputRead { path, source })?;
        Ok(Self::from_source(code, test))
    }

    /// Starts a case from in-memory source.
    pub fn from_source(code: impl Into<Arc<str>>, test: SourcemapTest) -> Self {
        Self {
            test,
            input: ArtifactView::new(ArtifactKind::Input, code, None),
        }
    }

    /// Returns the input view.
    pub fn input(&self) -> &ArtifactView {
        &self.input
    }

    /// Runs every stage in order and decodes the resulting maps.
    pub async fn stage(self, compiler: &dyn Compiler) -> Result<StagedCase, HarnessError> {
        let filename = self.test.filename.as_str();
        let options = CompileOptions::new(filename, OUTPUT_NAME)
            .with_extra(self.test.compile_options.clone())
            .map_err(|message| HarnessError::Config {
                path: self.test.config_path.clone(),
                message,
            })?;

        let preprocessed =
            run_preprocess(&self.test.preprocess, self.input.code(), filename).await?;
        let output = run_compile(compiler, &preprocessed.code, &options).await?;
        let upstream = preprocessed.chain;

        let js_code = mask_svelte_version(&output.js.code);
        let js = compiled_view(
            ArtifactKind::Js,
            &upstream,
            filename,
            RawArtifact {
                code: js_code,
                map: output.js.map,
            },
        )?;
        let css = match output.css {
            Some(css) => compiled_view(ArtifactKind::Css, &upstream, filename, css)?,
            None => ArtifactView::new(ArtifactKind::Css, "", None),
        };
        let preprocessed = ArtifactView::new(
            ArtifactKind::Preprocessed,
            preprocessed.code,
            Some(upstream),
        );

        debug!(
            js_segments = js.map.as_ref().map_or(0, SourceMap::len),
            css_segments = css.map.as_ref().map_or(0, SourceMap::len),
            "staged"
        );

        Ok(StagedCase {
            artifacts: Artifacts {
                input: self.input,
                preprocessed,
                js,
                css,
            },
            js_map_sources: self.test.expected_sources(ArtifactKind::Js),
            css_map_sources: self.test.expected_sources(ArtifactKind::Css),
        })
    }
}

fn compiled_view(
    kind: ArtifactKind,
    upstream: &ChainResolver,
    filename: &str,
    raw: RawArtifact,
) -> Result<ArtifactView, HarnessError> {
    let stage = decode_stage(kind, filename, &raw)?;
    Ok(ArtifactView::new(kind, raw.code, Some(upstream.then(stage))))
}

/// Masks the compiler version banner so outputs are stable across releases.
/// Only the first banner is the compiler's; later matches are component text.
fn mask_svelte_version(code: &str) -> String {
    static BANNER: OnceLock<Regex> = OnceLock::new();
    let banner = BANNER.get_or_init(|| {
        Regex::new(r"\(Svelte v\d+\.\d+\.\d+(-next\.\d+)?").expect("banner pattern is valid")
    });
    banner
        .replacen(code, 1, |caps: &regex::Captures<'_>| {
            caps[0].replace(|c: char| c.is_ascii_digit(), "x")
        })
        .into_owned()
}

/// Every stage ran and every map decoded. `sources` are checked on
/// verification, after the artifacts can be persisted.
#[derive(Debug)]
pub struct StagedCase {
    artifacts: Artifacts,
    js_map_sources: Vec<String>,
    css_map_sources: Vec<String>,
}

impl StagedCase {
    /// Returns the artifacts.
    pub fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }

    /// Writes the inspection files into `dir`.
    pub fn persist(&self, dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, HarnessError> {
        persist::write_artifacts(dir, OUTPUT_NAME, &self.artifacts)
    }

    /// Checks that each map lists the expected `sources`.
    pub fn check_sources(&self) -> Result<(), HarnessError> {
        check_sources(
            ArtifactKind::Js,
            self.artifacts.js.map.as_ref(),
            &self.js_map_sources,
        )?;
        check_sources(
            ArtifactKind::Css,
            self.artifacts.css.map.as_ref(),
            &self.css_map_sources,
        )
    }

    /// Checks the maps' `sources`, then hands every artifact to `check`.
    pub fn verify<F>(self, check: F) -> Result<VerifiedCase, HarnessError>
    where
        F: FnOnce(&Artifacts) -> Result<(), AssertionError>,
    {
        self.check_sources()?;
        check(&self.artifacts)?;
        Ok(VerifiedCase {
            artifacts: self.artifacts,
        })
    }
}

/// Assertions passed.
#[derive(Debug)]
pub struct VerifiedCase {
    artifacts: Artifacts,
}

impl VerifiedCase {
    /// Returns the artifacts.
    pub fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }
}
