//! Built-in declarative preprocessors.

use crate::error::StageError;
use crate::stage::{Preprocessor, RawArtifact};
use async_trait::async_trait;
use serde::Deserialize;
use source_map::{LocateError, SourceMapBuilder, TextBuffer};
use std::sync::Arc;

/// A preprocessor as written in a fixture's `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreprocessDescriptor {
    /// Replace every occurrence of `from` with `to`.
    Replace { from: String, to: String },
    /// Insert `prefix` at the start of every line.
    PrefixLines { prefix: String },
}

impl PreprocessDescriptor {
    /// Builds the preprocessor this descriptor names.
    pub fn build(&self) -> Arc<dyn Preprocessor> {
        match self {
            PreprocessDescriptor::Replace { from, to } => Arc::new(Replace {
                from: from.clone(),
                to: to.clone(),
            }),
            PreprocessDescriptor::PrefixLines { prefix } => Arc::new(PrefixLines {
                prefix: prefix.clone(),
            }),
        }
    }
}

fn locate_failed(error: LocateError) -> StageError {
    StageError::with_source("failed to map preprocessed text", error)
}

/// Replaces every occurrence of a string, mapping each replacement to the
/// start of the text it replaced.
#[derive(Debug, Clone)]
pub struct Replace {
    pub from: String,
    pub to: String,
}

#[async_trait]
impl Preprocessor for Replace {
    fn name(&self) -> &str {
        "replace"
    }

    async fn markup(&self, code: &str, filename: &str) -> Result<RawArtifact, StageError> {
        if self.from.is_empty() {
            return Err(StageError::new("replace: `from` must not be empty"));
        }

        let original = TextBuffer::new(code);
        let mut builder = SourceMapBuilder::new(filename, &original);
        let mut copied = 0;

        for (start, matched) in code.match_indices(self.from.as_str()) {
            builder.add_source(copied..start).map_err(locate_failed)?;
            builder.add_transformed(start, &self.to).map_err(locate_failed)?;
            copied = start + matched.len();
        }
        builder.add_source(copied..code.len()).map_err(locate_failed)?;

        let (code, map) = builder.finish();
        Ok(RawArtifact {
            code,
            map: Some(map.to_raw_decoded()),
        })
    }
}

/// Prefixes every line, shifting every column of the line.
#[derive(Debug, Clone)]
pub struct PrefixLines {
    pub prefix: String,
}

#[async_trait]
impl Preprocessor for PrefixLines {
    fn name(&self) -> &str {
        "prefix_lines"
    }

    async fn markup(&self, code: &str, filename: &str) -> Result<RawArtifact, StageError> {
        if self.prefix.contains('\n') {
            return Err(StageError::new("prefix_lines: prefix must be a single line"));
        }

        let original = TextBuffer::new(code);
        let mut builder = SourceMapBuilder::new(filename, &original);
        let mut start = 0;

        for line in code.split_inclusive('\n') {
            builder.add_generated(&self.prefix);
            builder
                .add_source(start..start + line.len())
                .map_err(locate_failed)?;
            start += line.len();
        }

        let (code, map) = builder.finish();
        Ok(RawArtifact {
            code,
            map: Some(map.to_raw_decoded()),
        })
    }
}
