//! Source map builder for tracking position mappings during transformation.

use crate::{LocateError, Locator, Position, Segment, SourceMap, TextBuffer};
use std::ops::Range;

/// Builds generated text and its source map from pieces of one original text.
///
/// Copied text gets a segment at its start, at every line start and at every
/// word boundary, so identifiers inside copied text resolve exactly.
#[derive(Debug)]
pub struct SourceMapBuilder {
    original: Locator,
    source: u32,
    map: SourceMap,
    code: String,
    /// Position where the next generated character lands.
    generated: Position,
}

impl SourceMapBuilder {
    /// Creates a builder for output derived from `original`, known as `filename`.
    pub fn new(filename: &str, original: &TextBuffer) -> Self {
        let mut map = SourceMap::new(None);
        let source = map.add_source(Some(filename), Some(original.text()));
        Self {
            original: original.locator(1),
            source,
            map,
            code: String::new(),
            generated: Position::new(1, 0),
        }
    }

    /// Returns the current generated position.
    #[inline]
    pub fn generated_position(&self) -> Position {
        self.generated
    }

    /// Returns the generated text so far.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Copies a range of the original text verbatim.
    pub fn add_source(&mut self, range: Range<usize>) -> Result<(), LocateError> {
        let mut original = self.original.locate(range.start)?.position();
        self.original.locate(range.end)?;
        let buffer = self.original.buffer().clone();
        let text = buffer
            .text()
            .get(range.clone())
            .ok_or(LocateError::OffsetOutOfRange {
                offset: range.start,
                len: range.end,
            })?;

        let mut previous: Option<char> = None;
        for c in text.chars() {
            let boundary = match previous {
                None | Some('\n') => true,
                Some(prev) => is_word(prev) != is_word(c),
            };
            if boundary && c != '\n' {
                self.map
                    .push_segment(Segment::mapped(self.generated, self.source, original));
            }

            advance(&mut original, c);
            self.push_char(c);
            previous = Some(c);
        }

        Ok(())
    }

    /// Adds generated text without a corresponding original position.
    pub fn add_generated(&mut self, text: &str) {
        for c in text.chars() {
            self.push_char(c);
        }
    }

    /// Adds text replacing the original starting at `original_start`, mapped
    /// as a single segment.
    pub fn add_transformed(
        &mut self,
        original_start: usize,
        text: &str,
    ) -> Result<(), LocateError> {
        let original = self.original.locate(original_start)?.position();
        if !text.is_empty() {
            self.map
                .push_segment(Segment::mapped(self.generated, self.source, original));
        }
        self.add_generated(text);
        Ok(())
    }

    /// Finishes building, returning the generated text and its map.
    pub fn finish(self) -> (String, SourceMap) {
        (self.code, self.map)
    }

    fn push_char(&mut self, c: char) {
        advance(&mut self.generated, c);
        self.code.push(c);
    }
}

fn advance(position: &mut Position, c: char) {
    if c == '\n' {
        position.line += 1;
        position.column = 0;
    } else {
        position.column += c.len_utf16() as u32;
    }
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Resolution, ResolvedLocation};
    use pretty_assertions::assert_eq;

    fn at(source: &str, line: u32, column: u32) -> Resolution {
        Resolution::Resolved(ResolvedLocation {
            source: Some(source.to_string()),
            position: Position::new(line, column),
            name: None,
        })
    }

    #[test]
    fn test_builder_add_source() {
        let original = TextBuffer::new("hello world");
        let mut builder = SourceMapBuilder::new("a.svelte", &original);
        builder.add_source(0..5).unwrap();
        builder.add_generated("\n  ");
        builder.add_source(6..11).unwrap();

        let (code, map) = builder.finish();
        assert_eq!(code, "hello\n  world");
        assert_eq!(map.source_content(0), Some("hello world"));

        assert_eq!(map.original_position_for(Position::new(1, 0)), at("a.svelte", 1, 0));
        assert_eq!(map.original_position_for(Position::new(2, 1)), Resolution::Unresolved);
        assert_eq!(map.original_position_for(Position::new(2, 2)), at("a.svelte", 1, 6));
    }

    #[test]
    fn test_builder_word_boundaries() {
        let original = TextBuffer::new("{a + bb}\nnext");
        let mut builder = SourceMapBuilder::new("a.svelte", &original);
        builder.add_generated("/* x */");
        builder.add_source(0..original.len()).unwrap();

        let (code, map) = builder.finish();
        assert_eq!(code, "/* x */{a + bb}\nnext");
        let bb = Position::new(1, 7 + 5);
        assert_eq!(map.original_position_for(bb), at("a.svelte", 1, 5));
        assert_eq!(map.original_position_for(Position::new(2, 0)), at("a.svelte", 2, 0));
    }

    #[test]
    fn test_builder_add_transformed() {
        let original = TextBuffer::new("let foo = 1;");
        let mut builder = SourceMapBuilder::new("a.svelte", &original);
        builder.add_source(0..4).unwrap();
        builder.add_transformed(4, "renamed").unwrap();
        builder.add_source(7..12).unwrap();

        let (code, map) = builder.finish();
        assert_eq!(code, "let renamed = 1;");
        assert_eq!(map.original_position_for(Position::new(1, 4)), at("a.svelte", 1, 4));
        assert_eq!(map.original_position_for(Position::new(1, 11)), at("a.svelte", 1, 7));
    }

    #[test]
    fn test_builder_rejects_bad_range() {
        let original = TextBuffer::new("abc");
        let mut builder = SourceMapBuilder::new("a.svelte", &original);
        assert!(builder.add_source(1..9).is_err());
    }
}
