//! Per-fixture configuration loading.

use crate::error::HarnessError;
use crate::expect::Expectation;
use crate::harness::{SourcemapTest, INPUT_FILENAME};
use crate::preprocess::PreprocessDescriptor;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::fs;

/// Name of the optional configuration file in a fixture directory.
pub const CONFIG_FILENAME: &str = "config.json";

/// Options describing the input itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputOptions {
    /// Name the input is known by in maps.
    pub filename: Option<String>,
}

/// One preprocessor or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PreprocessList {
    One(PreprocessDescriptor),
    Many(Vec<PreprocessDescriptor>),
}

impl PreprocessList {
    /// Returns the descriptors in order.
    pub fn descriptors(&self) -> &[PreprocessDescriptor] {
        match self {
            PreprocessList::One(descriptor) => std::slice::from_ref(descriptor),
            PreprocessList::Many(descriptors) => descriptors,
        }
    }
}

/// Contents of a fixture's `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureConfig {
    #[serde(default)]
    pub options: InputOptions,

    /// Passed to the compiler as-is.
    #[serde(default)]
    pub compile_options: serde_json::Map<String, serde_json::Value>,

    #[serde(default)]
    pub preprocess: Option<PreprocessList>,

    #[serde(default)]
    pub js_map_sources: Option<Vec<String>>,

    #[serde(default)]
    pub css_map_sources: Option<Vec<String>>,

    /// Skip this fixture.
    #[serde(default)]
    pub skip: bool,

    /// Run only fixtures marked `solo`.
    #[serde(default)]
    pub solo: bool,

    #[serde(default)]
    pub expectations: Vec<Expectation>,
}

impl FixtureConfig {
    /// Loads `config.json` from a fixture directory. A missing file yields the
    /// defaults.
    pub fn load(dir: &Utf8Path) -> Result<Self, HarnessError> {
        let path = config_path(dir);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|e| HarnessError::Config {
            path: path.clone(),
            message: e.to_string(),
        })?;
        Self::parse(&content).map_err(|message| HarnessError::Config { path, message })
    }

    /// Parses configuration text. Comments are allowed.
    pub fn parse(content: &str) -> Result<Self, String> {
        let cleaned = remove_json_comments(content);
        serde_json::from_str(&cleaned).map_err(|e| e.to_string())
    }

    /// Returns the name the input is known by.
    pub fn filename(&self) -> &str {
        self.options.filename.as_deref().unwrap_or(INPUT_FILENAME)
    }

    /// Builds the harness description of the fixture in `dir`.
    pub fn to_test(&self, dir: &Utf8Path) -> SourcemapTest {
        SourcemapTest {
            filename: self.filename().to_string(),
            compile_options: self.compile_options.clone(),
            preprocess: self
                .preprocess
                .as_ref()
                .map(|list| list.descriptors().iter().map(|d| d.build()).collect())
                .unwrap_or_default(),
            js_map_sources: self.js_map_sources.clone(),
            css_map_sources: self.css_map_sources.clone(),
            config_path: config_path(dir),
        }
    }
}

/// Returns the path of the config file for a fixture directory.
pub fn config_path(dir: &Utf8Path) -> Utf8PathBuf {
    dir.join(CONFIG_FILENAME)
}

/// Strips `//` and `/* */` comments outside of strings.
fn remove_json_comments(json: &str) -> String {
    let mut result = String::with_capacity(json.len());
    let mut chars = json.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            result.push(c);
            if c == '"' {
                in_string = false;
            } else if c == '\\' {
                if let Some(next) = chars.next() {
                    result.push(next);
                }
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                result.push(c);
                in_string = true;
            }
            ('/', Some('/')) => {
                while chars.peek().is_some_and(|&next| next != '\n') {
                    chars.next();
                }
            }
            ('/', Some('*')) => {
                chars.next();
                while let Some(next) = chars.next() {
                    if next == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => result.push(c),
        }
    }

    result
}
