//! Declarative snippet expectations.

use crate::error::AssertionError;
use crate::harness::Artifacts;
use crate::stage::ArtifactKind;
use serde::Deserialize;
use source_map::{Position, Resolution};

/// Asserts that a snippet of a generated artifact maps back to a snippet of
/// the input.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Expectation {
    /// Artifact the `generated` snippet is searched in.
    pub artifact: ArtifactKind,
    /// Text in the artifact whose first character is resolved.
    pub generated: String,
    /// Text in the input it must resolve to. Defaults to `generated`.
    #[serde(default)]
    pub original: Option<String>,
    /// Which occurrence of `generated` to use, 0-based.
    #[serde(default)]
    pub generated_occurrence: usize,
    /// Which occurrence of `original` to expect, 0-based.
    #[serde(default)]
    pub original_occurrence: usize,
    /// Source the snippet must resolve to. Defaults to the case's filename.
    #[serde(default)]
    pub source: Option<String>,
}

impl Expectation {
    /// Shorthand for an expectation whose snippet is unchanged by the pipeline.
    pub fn same(artifact: ArtifactKind, snippet: impl Into<String>) -> Self {
        Self {
            artifact,
            generated: snippet.into(),
            original: None,
            generated_occurrence: 0,
            original_occurrence: 0,
            source: None,
        }
    }

    /// Checks this expectation against staged artifacts.
    pub fn check(&self, artifacts: &Artifacts, filename: &str) -> Result<(), AssertionError> {
        let view = artifacts.get(self.artifact);
        let generated = view
            .locate_1
            .locate_nth(&self.generated, self.generated_occurrence)
            .ok_or_else(|| AssertionError::SnippetNotFound {
                artifact: self.artifact,
                needle: self.generated.clone(),
                occurrence: self.generated_occurrence,
            })?
            .position();

        let original = self.original.as_deref().unwrap_or(&self.generated);
        let expected_position = artifacts
            .input
            .locate_1
            .locate_nth(original, self.original_occurrence)
            .ok_or_else(|| AssertionError::SnippetNotFound {
                artifact: ArtifactKind::Input,
                needle: original.to_string(),
                occurrence: self.original_occurrence,
            })?
            .position();
        let expected_source = self.source.as_deref().unwrap_or(filename);

        let resolution = view
            .original_position_for(generated)
            .ok_or(AssertionError::NoMap {
                artifact: self.artifact,
            })?;
        let actual = match resolution {
            Resolution::Resolved(location) => location,
            Resolution::Unresolved => {
                return Err(AssertionError::Unresolved {
                    artifact: self.artifact,
                    needle: self.generated.clone(),
                    generated,
                })
            }
        };

        if actual.source.as_deref() != Some(expected_source) || actual.position != expected_position
        {
            return Err(AssertionError::Mismatch {
                artifact: self.artifact,
                needle: self.generated.clone(),
                generated,
                expected: describe(Some(expected_source), expected_position),
                actual: describe(actual.source.as_deref(), actual.position),
            });
        }
        Ok(())
    }
}

fn describe(source: Option<&str>, position: Position) -> String {
    format!("{}:{position}", source.unwrap_or("null"))
}

/// Checks every expectation, stopping at the first failure.
pub fn check_all(
    expectations: &[Expectation],
    artifacts: &Artifacts,
    filename: &str,
) -> Result<(), AssertionError> {
    expectations
        .iter()
        .try_for_each(|expectation| expectation.check(artifacts, filename))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let expectation: Expectation =
            serde_json::from_str(r#"{"artifact": "js", "generated": "foo"}"#).unwrap();
        assert_eq!(expectation, Expectation::same(ArtifactKind::Js, "foo"));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let result: Result<Expectation, _> =
            serde_json::from_str(r#"{"artifact": "js", "generated": "foo", "line": 1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(Some("a.svelte"), Position::new(2, 4)), "a.svelte:2:4");
        assert_eq!(describe(None, Position::new(1, 0)), "null:1:0");
    }
}
