//! Source map decoding, chaining and position lookup for sourcemap-check.
//!
//! This crate decodes Source Map v3 payloads (VLQ-encoded or already decoded),
//! resolves generated positions back to original ones through any number of
//! pipeline stages, and converts between text offsets and line/column pairs.

mod builder;
mod decoder;
mod line_index;
mod locator;
mod position;
mod resolver;
pub mod vlq;

pub use builder::SourceMapBuilder;
pub use decoder::{DecodeError, RawMappings, RawSourceMap, SourceMap};
pub use line_index::{ByteOffset, LineCol, LineIndex};
pub use locator::{LocateError, Location, Locator, TextBuffer};
pub use position::{Origin, Position, Segment};
pub use resolver::{ChainResolver, Resolution, ResolvedLocation, Stage};
