//! The bun-backed compiler collaborator.

use crate::error::StageError;
use crate::stage::{CompileOptions, CompileOutput, Compiler, CompilerFactory, RawArtifact};
use async_trait::async_trait;
use bun_runner::{BunCompileOptions, BunOutputFile, BunRunner, BunSession};
use source_map::RawSourceMap;
use std::sync::Arc;

impl From<&CompileOptions> for BunCompileOptions {
    fn from(options: &CompileOptions) -> Self {
        Self {
            filename: options.filename.clone(),
            output_filename: Some(options.output_filename.clone()),
            css_output_filename: Some(options.css_output_filename.clone()),
            extra: options.extra.clone(),
        }
    }
}

fn to_artifact(file: BunOutputFile, artifact: &str) -> Result<RawArtifact, StageError> {
    let map = file
        .map
        .map(serde_json::from_value::<RawSourceMap>)
        .transpose()
        .map_err(|e| StageError::with_source(format!("{artifact} map is not a source map"), e))?;
    Ok(RawArtifact {
        code: file.code,
        map,
    })
}

#[async_trait]
impl Compiler for BunSession {
    async fn compile(
        &self,
        code: &str,
        options: &CompileOptions,
    ) -> Result<CompileOutput, StageError> {
        let output = BunSession::compile(self, code, &options.into())
            .await
            .map_err(|e| StageError::with_source(e.to_string(), e))?;
        Ok(CompileOutput {
            js: to_artifact(output.js, "js")?,
            css: output.css.map(|css| to_artifact(css, "css")).transpose()?,
        })
    }
}

#[async_trait]
impl CompilerFactory for BunRunner {
    async fn session(&self) -> Result<Arc<dyn Compiler>, StageError> {
        let session = BunRunner::session(self)
            .await
            .map_err(|e| StageError::with_source(e.to_string(), e))?;
        Ok(Arc::new(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_options_conversion() {
        let mut extra = serde_json::Map::new();
        extra.insert("dev".to_string(), json!(true));
        let options = CompileOptions::new("input.svelte", "_actual")
            .with_extra(extra)
            .unwrap();

        let bun = BunCompileOptions::from(&options);
        assert_eq!(
            serde_json::to_value(&bun).unwrap(),
            json!({
                "filename": "input.svelte",
                "outputFilename": "_actual.js",
                "cssOutputFilename": "_actual.css",
                "dev": true
            })
        );
    }

    #[test]
    fn test_to_artifact_decodes_map() {
        let file = BunOutputFile {
            code: "x".to_string(),
            map: Some(json!({
                "version": 3,
                "sources": ["input.svelte"],
                "names": [],
                "mappings": "AAAA"
            })),
        };
        let artifact = to_artifact(file, "js").unwrap();
        assert_eq!(artifact.map.unwrap().sources, vec![Some("input.svelte".to_string())]);
    }

    #[test]
    fn test_to_artifact_rejects_garbage_map() {
        let file = BunOutputFile {
            code: String::new(),
            map: Some(json!({ "version": 3 })),
        };
        let err = to_artifact(file, "css").unwrap_err();
        assert!(err.to_string().starts_with("css map is not a source map"));
    }
}
