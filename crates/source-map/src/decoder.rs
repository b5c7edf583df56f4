//! Source Map v3 wire format and decoding.

use crate::vlq::{self, VlqError};
use crate::{Origin, Position, Segment};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Errors raised while decoding a source map payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not valid source map JSON.
    #[error("invalid source map JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Only version 3 is understood.
    #[error("unsupported source map version {0}")]
    UnsupportedVersion(u32),

    /// A `mappings` string holds malformed VLQ data.
    #[error("malformed mappings on generated line {line}: {source}")]
    Vlq {
        line: u32,
        #[source]
        source: VlqError,
    },

    /// A segment with a field count other than 1, 4 or 5.
    #[error("segment with {len} fields on generated line {line}")]
    InvalidSegment { line: u32, len: usize },

    /// A segment field decoded to a negative absolute value.
    #[error("negative {field} on generated line {line}")]
    NegativeValue { line: u32, field: &'static str },

    /// A segment points past the end of `sources`.
    #[error("source index {index} out of range ({len} sources)")]
    SourceOutOfRange { index: u32, len: usize },

    /// A segment points past the end of `names`.
    #[error("name index {index} out of range ({len} names)")]
    NameOutOfRange { index: u32, len: usize },

    /// The same source is listed twice.
    #[error("duplicate source {0:?}")]
    DuplicateSource(String),
}

/// The `mappings` field, either VLQ-encoded or already decoded.
///
/// Decoded mappings are one array per generated line, each holding
/// `[generated_column, source, original_line, original_column, name?]` arrays
/// with absolute values and 0-based lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawMappings {
    Encoded(String),
    Decoded(Vec<Vec<Vec<i64>>>),
}

/// A source map as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSourceMap {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,
    #[serde(default)]
    pub sources: Vec<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_content: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub names: Vec<String>,
    pub mappings: RawMappings,
}

fn default_version() -> u32 {
    3
}

impl RawSourceMap {
    /// Parses a JSON payload without decoding the mappings.
    pub fn from_json(json: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> String {
        // A map of strings and integers always serializes.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// A decoded source map with segments ordered by generated position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMap {
    file: Option<String>,
    sources: Vec<Option<String>>,
    sources_content: Vec<Option<String>>,
    names: Vec<String>,
    segments: Vec<Segment>,
}

impl SourceMap {
    /// Creates an empty source map for the given output file.
    pub fn new(file: Option<String>) -> Self {
        Self {
            file,
            ..Self::default()
        }
    }

    /// Decodes a JSON payload.
    pub fn from_json(json: &str) -> Result<Self, DecodeError> {
        Self::decode(&RawSourceMap::from_json(json)?)
    }

    /// Decodes a wire map, normalizing encoded and decoded mappings alike.
    pub fn decode(raw: &RawSourceMap) -> Result<Self, DecodeError> {
        if raw.version != 3 {
            return Err(DecodeError::UnsupportedVersion(raw.version));
        }

        let sources: Vec<Option<String>> = raw
            .sources
            .iter()
            .map(|source| {
                source
                    .as_deref()
                    .map(|source| join_source_root(raw.source_root.as_deref(), source))
            })
            .collect();

        let mut seen = HashSet::new();
        for source in sources.iter().flatten() {
            if !seen.insert(source.as_str()) {
                return Err(DecodeError::DuplicateSource(source.clone()));
            }
        }

        let mut sources_content = raw.sources_content.clone().unwrap_or_default();
        sources_content.resize(sources.len(), None);

        let mut segments = match &raw.mappings {
            RawMappings::Encoded(mappings) => decode_encoded(mappings)?,
            RawMappings::Decoded(lines) => decode_lines(lines)?,
        };
        // Producers may emit a line's segments out of column order.
        segments.sort_by_key(|segment| segment.generated);

        for origin in segments.iter().filter_map(|segment| segment.origin) {
            if origin.source as usize >= sources.len() {
                return Err(DecodeError::SourceOutOfRange {
                    index: origin.source,
                    len: sources.len(),
                });
            }
            if let Some(name) = origin.name {
                if name as usize >= raw.names.len() {
                    return Err(DecodeError::NameOutOfRange {
                        index: name,
                        len: raw.names.len(),
                    });
                }
            }
        }

        Ok(Self {
            file: raw.file.clone(),
            sources,
            sources_content,
            names: raw.names.clone(),
            segments,
        })
    }

    /// Encodes back to the wire format with VLQ mappings.
    pub fn to_raw(&self) -> RawSourceMap {
        self.raw_with(RawMappings::Encoded(self.encode_mappings()))
    }

    /// Returns the wire format with decoded (array) mappings.
    pub fn to_raw_decoded(&self) -> RawSourceMap {
        self.raw_with(RawMappings::Decoded(self.decoded_lines()))
    }

    fn raw_with(&self, mappings: RawMappings) -> RawSourceMap {
        let has_content = self.sources_content.iter().any(Option::is_some);
        RawSourceMap {
            version: 3,
            file: self.file.clone(),
            source_root: None,
            sources: self.sources.clone(),
            sources_content: has_content.then(|| self.sources_content.clone()),
            names: self.names.clone(),
            mappings,
        }
    }

    /// Returns the generated file name, if recorded.
    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    /// Returns the `sources` list in order.
    pub fn sources(&self) -> &[Option<String>] {
        &self.sources
    }

    /// Returns the source at `index`, `None` if absent or null.
    pub fn source(&self, index: u32) -> Option<&str> {
        self.sources.get(index as usize)?.as_deref()
    }

    /// Returns the embedded content of the source at `index`.
    pub fn source_content(&self, index: u32) -> Option<&str> {
        self.sources_content.get(index as usize)?.as_deref()
    }

    /// Returns the name at `index`.
    pub fn name(&self, index: u32) -> Option<&str> {
        self.names.get(index as usize).map(String::as_str)
    }

    /// Returns all segments, ordered by generated position.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns the number of segments.
    #[inline]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns true if the map has no segments.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Registers a source, returning its index. Registering an existing source,
    /// null included, returns the existing index and fills in missing content.
    pub fn add_source(&mut self, source: Option<&str>, content: Option<&str>) -> u32 {
        if let Some(index) = self.sources.iter().position(|s| s.as_deref() == source) {
            if self.sources_content[index].is_none() {
                self.sources_content[index] = content.map(str::to_string);
            }
            return index as u32;
        }
        self.sources.push(source.map(str::to_string));
        self.sources_content.push(content.map(str::to_string));
        (self.sources.len() - 1) as u32
    }

    /// Registers a name, returning its index.
    pub fn add_name(&mut self, name: &str) -> u32 {
        if let Some(index) = self.names.iter().position(|n| n == name) {
            return index as u32;
        }
        self.names.push(name.to_string());
        (self.names.len() - 1) as u32
    }

    /// Inserts a segment, keeping generated order. The segment's indices must
    /// come from [`SourceMap::add_source`] and [`SourceMap::add_name`].
    ///
    /// # Panics
    ///
    /// Panics if the generated line is 0; lines are 1-based.
    pub fn push_segment(&mut self, segment: Segment) {
        assert!(
            segment.generated.line >= 1,
            "generated line 0 in segment at {}",
            segment.generated
        );
        debug_assert!(segment
            .origin
            .map_or(true, |o| (o.source as usize) < self.sources.len()));
        match self.segments.last() {
            Some(last) if last.generated > segment.generated => {
                let at = self
                    .segments
                    .partition_point(|s| s.generated <= segment.generated);
                self.segments.insert(at, segment);
            }
            _ => self.segments.push(segment),
        }
    }

    fn encode_mappings(&self) -> String {
        let mut out = String::new();
        let mut line = 1u32;
        let mut previous_column = 0i64;
        let mut previous_source = 0i64;
        let mut previous_line = 0i64;
        let mut previous_original_column = 0i64;
        let mut previous_name = 0i64;
        let mut first_in_line = true;

        for segment in &self.segments {
            while line < segment.generated.line {
                out.push(';');
                line += 1;
                previous_column = 0;
                first_in_line = true;
            }
            if !first_in_line {
                out.push(',');
            }
            first_in_line = false;

            let column = i64::from(segment.generated.column);
            vlq::encode_into(column - previous_column, &mut out);
            previous_column = column;

            if let Some(origin) = segment.origin {
                let source = i64::from(origin.source);
                let original_line = i64::from(origin.position.line) - 1;
                let original_column = i64::from(origin.position.column);
                vlq::encode_into(source - previous_source, &mut out);
                vlq::encode_into(original_line - previous_line, &mut out);
                vlq::encode_into(original_column - previous_original_column, &mut out);
                previous_source = source;
                previous_line = original_line;
                previous_original_column = original_column;

                if let Some(name) = origin.name {
                    let name = i64::from(name);
                    vlq::encode_into(name - previous_name, &mut out);
                    previous_name = name;
                }
            }
        }

        out
    }

    fn decoded_lines(&self) -> Vec<Vec<Vec<i64>>> {
        let line_count = self.segments.last().map_or(0, |s| s.generated.line as usize);
        let mut lines = vec![Vec::new(); line_count];
        for segment in &self.segments {
            let mut fields = vec![i64::from(segment.generated.column)];
            if let Some(origin) = segment.origin {
                fields.push(i64::from(origin.source));
                fields.push(i64::from(origin.position.line) - 1);
                fields.push(i64::from(origin.position.column));
                if let Some(name) = origin.name {
                    fields.push(i64::from(name));
                }
            }
            lines[segment.generated.line as usize - 1].push(fields);
        }
        lines
    }
}

fn join_source_root(root: Option<&str>, source: &str) -> String {
    match root {
        Some(root) if !root.is_empty() => {
            if root.ends_with('/') {
                format!("{root}{source}")
            } else {
                format!("{root}/{source}")
            }
        }
        _ => source.to_string(),
    }
}

/// Converts absolute segment fields into a segment.
fn segment_from_fields(line: u32, fields: &[i64]) -> Result<Segment, DecodeError> {
    let field = |index: usize, name: &'static str| -> Result<u32, DecodeError> {
        u32::try_from(fields[index]).map_err(|_| DecodeError::NegativeValue { line, field: name })
    };

    let generated = Position::new(line, field(0, "generated column")?);
    match fields.len() {
        1 => Ok(Segment::unmapped(generated)),
        4 | 5 => {
            let name = if fields.len() == 5 {
                Some(field(4, "name index")?)
            } else {
                None
            };
            Ok(Segment {
                generated,
                origin: Some(Origin {
                    source: field(1, "source index")?,
                    position: Position::new(
                        field(2, "original line")? + 1,
                        field(3, "original column")?,
                    ),
                    name,
                }),
            })
        }
        len => Err(DecodeError::InvalidSegment { line, len }),
    }
}

fn decode_encoded(mappings: &str) -> Result<Vec<Segment>, DecodeError> {
    let mut segments = Vec::new();
    // Source, original line, original column and name are relative across lines.
    let mut state = [0i64; 5];

    for (index, text) in mappings.split(';').enumerate() {
        let line = index as u32 + 1;
        state[0] = 0;

        for raw in text.split(',').filter(|s| !s.is_empty()) {
            let deltas =
                vlq::decode_segment(raw).map_err(|source| DecodeError::Vlq { line, source })?;
            if !matches!(deltas.len(), 1 | 4 | 5) {
                return Err(DecodeError::InvalidSegment {
                    line,
                    len: deltas.len(),
                });
            }

            let mut fields = [0i64; 5];
            for (slot, delta) in deltas.iter().enumerate() {
                state[slot] += delta;
                fields[slot] = state[slot];
            }
            segments.push(segment_from_fields(line, &fields[..deltas.len()])?);
        }
    }

    Ok(segments)
}

fn decode_lines(lines: &[Vec<Vec<i64>>]) -> Result<Vec<Segment>, DecodeError> {
    let mut segments = Vec::new();
    for (index, line_segments) in lines.iter().enumerate() {
        let line = index as u32 + 1;
        for fields in line_segments {
            if fields.is_empty() {
                return Err(DecodeError::InvalidSegment { line, len: 0 });
            }
            segments.push(segment_from_fields(line, fields)?);
        }
    }
    Ok(segments)
}
