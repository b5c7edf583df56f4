//! In-process collaborators for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use source_map::{RawSourceMap, SourceMapBuilder, TextBuffer};
use sourcemap_check::{
    CompileOptions, CompileOutput, Compiler, CompilerFactory, RawArtifact, StageError,
};
use std::sync::Arc;

/// A tiny "compiler": every `{expr}` in the markup becomes a `text(expr);` line
/// of script, and the contents of `<style>` become the stylesheet.
pub struct FakeCompiler;

#[async_trait]
impl Compiler for FakeCompiler {
    async fn compile(
        &self,
        code: &str,
        options: &CompileOptions,
    ) -> Result<CompileOutput, StageError> {
        let buffer = TextBuffer::new(code);
        let style = code.find("<style>").and_then(|open| {
            let start = open + "<style>".len();
            code[start..]
                .find("</style>")
                .map(|len| (open, start..start + len))
        });
        let markup_end = style.as_ref().map_or(code.len(), |(open, _)| *open);

        let mut js = SourceMapBuilder::new(&options.filename, &buffer);
        js.add_generated("// generated (Svelte v5.1.0)");
        for (open, _) in code[..markup_end].match_indices('{') {
            let Some(len) = code[open..markup_end].find('}') else {
                continue;
            };
            js.add_generated("\ntext(");
            js.add_source(open + 1..open + len)
                .map_err(|e| StageError::with_source("bad range", e))?;
            js.add_generated(");");
        }
        let (js_code, js_map) = js.finish();

        let css = match style {
            Some((_, range)) => {
                let mut css = SourceMapBuilder::new(&options.filename, &buffer);
                css.add_source(range)
                    .map_err(|e| StageError::with_source("bad range", e))?;
                let (css_code, css_map) = css.finish();
                Some(RawArtifact {
                    code: css_code,
                    map: Some(css_map.to_raw()),
                })
            }
            None => None,
        };

        Ok(CompileOutput {
            js: RawArtifact {
                code: js_code,
                map: Some(js_map.to_raw()),
            },
            css,
        })
    }
}

/// A compiler that always fails.
pub struct FailingCompiler;

#[async_trait]
impl Compiler for FailingCompiler {
    async fn compile(
        &self,
        _code: &str,
        _options: &CompileOptions,
    ) -> Result<CompileOutput, StageError> {
        Err(StageError::new("unexpected token"))
    }
}

/// A compiler returning fixed script text with a fixed map and no stylesheet.
pub struct FixedMapCompiler {
    pub code: String,
    pub map: RawSourceMap,
}

impl FixedMapCompiler {
    pub fn new(code: &str, map_json: &str) -> Self {
        Self {
            code: code.to_string(),
            map: RawSourceMap::from_json(map_json).unwrap(),
        }
    }
}

#[async_trait]
impl Compiler for FixedMapCompiler {
    async fn compile(
        &self,
        _code: &str,
        _options: &CompileOptions,
    ) -> Result<CompileOutput, StageError> {
        Ok(CompileOutput {
            js: RawArtifact {
                code: self.code.clone(),
                map: Some(self.map.clone()),
            },
            css: None,
        })
    }
}

/// Hands out [`FakeCompiler`] sessions.
pub struct FakeFactory;

#[async_trait]
impl CompilerFactory for FakeFactory {
    async fn session(&self) -> Result<Arc<dyn Compiler>, StageError> {
        Ok(Arc::new(FakeCompiler))
    }
}
