//! Positions and mapping segments.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A position in source-map convention: 1-based line, 0-based column.
///
/// Columns count UTF-16 code units, as every JavaScript producer of source
/// maps does. Ordering is by line, then column.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Position {
    /// 1-indexed line number.
    pub line: u32,
    /// 0-indexed column.
    pub column: u32,
}

impl Position {
    /// Creates a new position.
    #[inline]
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The original side of a mapping segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Origin {
    /// Index into the map's `sources`.
    pub source: u32,
    /// Position in that source.
    pub position: Position,
    /// Index into the map's `names`.
    pub name: Option<u32>,
}

/// One decoded mapping segment.
///
/// A segment without an origin marks generated-only text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Segment {
    /// Position in the generated output.
    pub generated: Position,
    /// Where the generated position came from, if anywhere.
    pub origin: Option<Origin>,
}

impl Segment {
    /// Creates a segment mapping `generated` to `position` in source `source`.
    pub fn mapped(generated: Position, source: u32, position: Position) -> Self {
        Self {
            generated,
            origin: Some(Origin {
                source,
                position,
                name: None,
            }),
        }
    }

    /// Creates a generated-only segment.
    pub fn unmapped(generated: Position) -> Self {
        Self {
            generated,
            origin: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_order() {
        assert!(Position::new(1, 9) < Position::new(2, 0));
        assert!(Position::new(2, 3) < Position::new(2, 4));
        assert_eq!(Position::new(3, 1).to_string(), "3:1");
    }
}
