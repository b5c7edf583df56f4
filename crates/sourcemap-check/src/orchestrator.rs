//! Fixture discovery and concurrent execution.

use crate::config::FixtureConfig;
use crate::error::{HarnessError, StageError};
use crate::expect;
use crate::harness::{LoadedCase, INPUT_FILENAME};
use crate::stage::{Compiler, CompilerFactory};
use camino::{Utf8Path, Utf8PathBuf};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Orchestration errors.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Invalid glob pattern.
    #[error("invalid glob pattern: {0}")]
    InvalidGlob(String),

    /// The fixture root could not be walked.
    #[error("failed to scan {path}: {message}")]
    Scan { path: Utf8PathBuf, message: String },

    /// A worker task panicked or was cancelled.
    #[error("worker task failed: {0}")]
    Join(String),
}

/// A fixture directory and its configuration.
#[derive(Debug)]
pub struct Fixture {
    /// Path relative to the fixture root, `/`-separated.
    pub name: String,
    pub dir: Utf8PathBuf,
    pub config: Result<FixtureConfig, HarnessError>,
}

/// Builds a glob set from `--filter` patterns. No patterns means no filter.
pub fn build_filter(patterns: &[String]) -> Result<Option<GlobSet>, OrchestratorError> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| OrchestratorError::InvalidGlob(e.to_string()))?;
        builder.add(glob);
    }
    builder
        .build()
        .map(Some)
        .map_err(|e| OrchestratorError::InvalidGlob(e.to_string()))
}

/// Finds every directory under `root` holding an `input.svelte`, sorted by name.
pub fn discover(
    root: &Utf8Path,
    filter: Option<&GlobSet>,
) -> Result<Vec<Fixture>, OrchestratorError> {
    let mut fixtures = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| OrchestratorError::Scan {
            path: root.to_path_buf(),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() || entry.file_name() != INPUT_FILENAME {
            continue;
        }
        let Ok(path) = Utf8PathBuf::try_from(entry.into_path()) else {
            continue;
        };
        let Some(dir) = path.parent().map(Utf8Path::to_path_buf) else {
            continue;
        };

        let name = dir
            .strip_prefix(root)
            .unwrap_or(dir.as_path())
            .components()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join("/");
        if filter.is_some_and(|set| !set.is_match(&name)) {
            continue;
        }

        let config = FixtureConfig::load(&dir);
        fixtures.push(Fixture { name, dir, config });
    }

    Ok(fixtures)
}

/// Options for [`run_fixtures`].
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Number of concurrent workers, each with its own compiler session.
    pub jobs: usize,
    /// Write `_actual.*` files into each fixture.
    pub persist: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            persist: true,
        }
    }
}

/// Result of a run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub passed: Vec<String>,
    pub failed: Vec<(String, HarnessError)>,
    pub skipped: Vec<String>,
}

impl RunSummary {
    /// Returns true if no fixture failed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs fixtures on `options.jobs` workers and collects their results.
///
/// When any fixture is marked `solo`, every other fixture is skipped.
pub async fn run_fixtures(
    fixtures: Vec<Fixture>,
    factory: Arc<dyn CompilerFactory>,
    options: RunOptions,
) -> Result<RunSummary, OrchestratorError> {
    let mut summary = RunSummary::default();

    let any_solo = fixtures
        .iter()
        .any(|f| f.config.as_ref().is_ok_and(|c| c.solo));
    let mut runnable = Vec::new();
    for fixture in fixtures {
        let skip = match &fixture.config {
            Ok(config) => config.skip || (any_solo && !config.solo),
            Err(_) => any_solo,
        };
        if skip {
            debug!(fixture = %fixture.name, "skipped");
            summary.skipped.push(fixture.name);
        } else {
            runnable.push(fixture);
        }
    }

    if runnable.is_empty() {
        return Ok(summary);
    }

    let worker_count = options.jobs.min(runnable.len()).max(1);
    let mut chunks: Vec<Vec<Fixture>> = (0..worker_count).map(|_| Vec::new()).collect();
    for (idx, fixture) in runnable.into_iter().enumerate() {
        chunks[idx % worker_count].push(fixture);
    }

    let mut handles = Vec::new();
    for chunk in chunks.into_iter().filter(|c| !c.is_empty()) {
        let factory = Arc::clone(&factory);
        handles.push(tokio::spawn(async move {
            run_chunk(chunk, factory.as_ref(), options.persist).await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        let chunk_results = handle
            .await
            .map_err(|e| OrchestratorError::Join(e.to_string()))?;
        results.extend(chunk_results);
    }
    results.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, result) in results {
        match result {
            Ok(()) => {
                info!(fixture = %name, "passed");
                summary.passed.push(name);
            }
            Err(error) => {
                warn!(fixture = %name, %error, "failed");
                summary.failed.push((name, error));
            }
        }
    }

    Ok(summary)
}

async fn run_chunk(
    chunk: Vec<Fixture>,
    factory: &dyn CompilerFactory,
    persist: bool,
) -> Vec<(String, Result<(), HarnessError>)> {
    let compiler = match factory.session().await {
        Ok(compiler) => compiler,
        Err(error) => {
            // One session per chunk: every fixture in it fails with the same cause.
            let message = error.to_string();
            return chunk
                .into_iter()
                .map(|fixture| {
                    let error = HarnessError::Stage {
                        stage: "compiler session".to_string(),
                        source: StageError::new(message.clone()),
                    };
                    (fixture.name, Err(error))
                })
                .collect();
        }
    };

    let mut results = Vec::with_capacity(chunk.len());
    for fixture in chunk {
        let result = match fixture.config {
            Ok(config) => run_fixture(&fixture.dir, &config, compiler.as_ref(), persist).await,
            Err(error) => Err(error),
        };
        results.push((fixture.name, result));
    }
    results
}

/// Runs one fixture: stage, optionally persist, then check its map sources and
/// expectations.
pub async fn run_fixture(
    dir: &Utf8Path,
    config: &FixtureConfig,
    compiler: &dyn Compiler,
    persist: bool,
) -> Result<(), HarnessError> {
    let filename = config.filename();
    let staged = LoadedCase::load(dir, config.to_test(dir))?
        .stage(compiler)
        .await?;
    if persist {
        let written = staged.persist(dir)?;
        debug!(files = written.len(), %dir, "persisted artifacts");
    }
    staged.verify(|artifacts| expect::check_all(&config.expectations, artifacts, filename))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_build_filter() {
        assert!(build_filter(&[]).unwrap().is_none());

        let set = build_filter(&["basic*".to_string()]).unwrap().unwrap();
        assert!(set.is_match("basic-expression"));
        assert!(!set.is_match("css"));

        assert!(matches!(
            build_filter(&["[".to_string()]),
            Err(OrchestratorError::InvalidGlob(_))
        ));
    }

    #[test]
    fn test_discover_finds_fixture_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(tmp.path()).unwrap();
        for name in ["b", "a", "nested/c"] {
            fs::create_dir_all(root.join(name)).unwrap();
            fs::write(root.join(name).join("input.svelte"), "<div />").unwrap();
        }
        fs::create_dir_all(root.join("empty")).unwrap();
        fs::write(root.join("a/config.json"), r#"{ "skip": true }"#).unwrap();

        let fixtures = discover(root, None).unwrap();
        let names: Vec<_> = fixtures.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "nested/c"]);
        assert!(fixtures[0].config.as_ref().unwrap().skip);

        let filter = build_filter(&["nested/*".to_string()]).unwrap();
        let fixtures = discover(root, filter.as_ref()).unwrap();
        assert_eq!(fixtures.len(), 1);
        assert_eq!(fixtures[0].name, "nested/c");
    }

    #[test]
    fn test_summary_success() {
        let mut summary = RunSummary::default();
        assert!(summary.is_success());
        summary.failed.push((
            "x".to_string(),
            HarnessError::Config {
                path: "x/config.json".into(),
                message: "bad".to_string(),
            },
        ));
        assert!(!summary.is_success());
    }
}
