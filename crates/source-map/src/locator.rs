//! Offset ↔ line/column conversion over a shared text buffer.

use crate::{LineCol, LineIndex, Position};
use std::sync::Arc;
use text_size::TextSize;
use thiserror::Error;

/// Errors raised when an offset or line/column does not exist in a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocateError {
    /// The offset is past the end of the buffer.
    #[error("offset {offset} is out of range (buffer length {len})")]
    OffsetOutOfRange { offset: usize, len: usize },

    /// The offset falls inside a multi-byte character.
    #[error("offset {0} is not on a character boundary")]
    NotCharBoundary(usize),

    /// The line does not exist.
    #[error("line {line} is out of range ({lines} lines, first line is {first})")]
    LineOutOfRange { line: u32, lines: usize, first: u32 },

    /// The column runs past the end of the line or splits a character.
    #[error("column {column} is out of range on line {line} (length {len})")]
    ColumnOutOfRange { line: u32, column: u32, len: u32 },
}

/// An immutable text plus its line index, cheap to clone.
#[derive(Debug, Clone)]
pub struct TextBuffer {
    text: Arc<str>,
    lines: Arc<LineIndex>,
}

impl TextBuffer {
    /// Indexes `text` in one pass.
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        let text = text.into();
        let lines = Arc::new(LineIndex::new(&text));
        Self { text, lines }
    }

    /// Returns the buffered text.
    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Returns true if the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Returns the line index.
    #[inline]
    pub fn line_index(&self) -> &LineIndex {
        &self.lines
    }

    /// Returns a locator reporting lines shifted by `offset_line`.
    pub fn locator(&self, offset_line: u32) -> Locator {
        Locator {
            buffer: self.clone(),
            offset_line,
        }
    }

    /// Returns the content of a 0-indexed line, without its newline.
    fn line_text(&self, line: u32) -> Option<&str> {
        let start = self.lines.line_start(line)?;
        let end = self.lines.line_end(line)?;
        Some(&self.text[usize::from(start)..usize::from(end)])
    }
}

impl From<&str> for TextBuffer {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for TextBuffer {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// A located offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    /// Line, shifted by the locator's `offset_line`.
    pub line: u32,
    /// 0-indexed column in UTF-16 code units.
    pub column: u32,
    /// The byte offset that was located.
    pub character: usize,
}

impl Location {
    /// Converts to a map position. Only meaningful for a 1-biased locator,
    /// since map lines start at 1.
    #[inline]
    pub fn position(self) -> Position {
        Position::new(self.line, self.column)
    }
}

/// Converts between byte offsets and line/column pairs of one buffer.
///
/// Lines are reported as the zero-based line index plus `offset_line`, so a
/// locator with `offset_line == 1` speaks source-map positions directly.
#[derive(Debug, Clone)]
pub struct Locator {
    buffer: TextBuffer,
    offset_line: u32,
}

impl Locator {
    /// Creates a locator over `text` with the given line bias.
    pub fn new(text: &str, offset_line: u32) -> Self {
        TextBuffer::new(text).locator(offset_line)
    }

    /// Returns the underlying buffer.
    #[inline]
    pub fn buffer(&self) -> &TextBuffer {
        &self.buffer
    }

    /// Locates a byte offset. The end of the buffer is a valid offset.
    pub fn locate(&self, offset: usize) -> Result<Location, LocateError> {
        let text = self.buffer.text();
        if offset > text.len() {
            return Err(LocateError::OffsetOutOfRange {
                offset,
                len: text.len(),
            });
        }
        if !text.is_char_boundary(offset) {
            return Err(LocateError::NotCharBoundary(offset));
        }

        let line_col = self
            .buffer
            .line_index()
            .line_col(TextSize::from(offset as u32))
            .ok_or(LocateError::OffsetOutOfRange {
                offset,
                len: text.len(),
            })?;

        let line_start = offset - line_col.col as usize;
        let column = utf16_len(&text[line_start..offset]);

        Ok(Location {
            line: line_col.line + self.offset_line,
            column,
            character: offset,
        })
    }

    /// Returns the byte offset of a line/column pair, the inverse of [`Locator::locate`].
    ///
    /// A column equal to the line's length addresses the end of the line.
    pub fn offset_for(&self, line: u32, column: u32) -> Result<usize, LocateError> {
        let index = self.buffer.line_index();
        let line_out_of_range = || LocateError::LineOutOfRange {
            line,
            lines: index.line_count(),
            first: self.offset_line,
        };

        let zero_based = line
            .checked_sub(self.offset_line)
            .ok_or_else(line_out_of_range)?;
        let content = self
            .buffer
            .line_text(zero_based)
            .ok_or_else(line_out_of_range)?;

        let byte_col = byte_column(content, column).ok_or(LocateError::ColumnOutOfRange {
            line,
            column,
            len: utf16_len(content),
        })?;

        let offset = index
            .offset(LineCol::new(zero_based, byte_col))
            .ok_or_else(line_out_of_range)?;
        Ok(usize::from(offset))
    }

    /// Returns the byte offset of a map position. Same as [`Locator::offset_for`].
    #[inline]
    pub fn offset_of(&self, position: Position) -> Result<usize, LocateError> {
        self.offset_for(position.line, position.column)
    }

    /// Locates the first occurrence of `needle`.
    pub fn locate_str(&self, needle: &str) -> Option<Location> {
        self.locate_nth(needle, 0)
    }

    /// Locates the `n`th (0-indexed) occurrence of `needle`.
    pub fn locate_nth(&self, needle: &str, n: usize) -> Option<Location> {
        let (offset, _) = self.buffer.text().match_indices(needle).nth(n)?;
        self.locate(offset).ok()
    }
}

fn utf16_len(text: &str) -> u32 {
    text.chars().map(|c| c.len_utf16() as u32).sum()
}

/// Converts a UTF-16 column within `line` to a byte column.
fn byte_column(line: &str, column: u32) -> Option<u32> {
    let mut units = 0u32;
    for (byte, c) in line.char_indices() {
        if units == column {
            return Some(byte as u32);
        }
        if units > column {
            return None;
        }
        units += c.len_utf16() as u32;
    }
    (units == column).then_some(line.len() as u32)
}
