//! Generated → original position lookup, chained across pipeline stages.

use crate::decoder::{DecodeError, RawSourceMap};
use crate::{Origin, Position, Segment, SourceMap};
use std::sync::Arc;

/// The original location of a generated position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedLocation {
    /// The original file. `None` when the map lists a null source.
    pub source: Option<String>,
    /// Position in the original file.
    pub position: Position,
    /// The original identifier, if the map records one.
    pub name: Option<String>,
}

/// Outcome of a lookup. `Unresolved` is a valid answer, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resolution {
    Resolved(ResolvedLocation),
    Unresolved,
}

impl Resolution {
    /// Returns the resolved location, if any.
    pub fn location(&self) -> Option<&ResolvedLocation> {
        match self {
            Resolution::Resolved(location) => Some(location),
            Resolution::Unresolved => None,
        }
    }

    /// Returns true for [`Resolution::Unresolved`].
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Resolution::Unresolved)
    }
}

/// A borrowed lookup result, carrying the source content for composition.
#[derive(Debug, Clone, Copy)]
struct Hit<'a> {
    source: Option<&'a str>,
    content: Option<&'a str>,
    position: Position,
    name: Option<&'a str>,
}

impl Hit<'_> {
    fn into_resolution(self) -> Resolution {
        Resolution::Resolved(ResolvedLocation {
            source: self.source.map(str::to_string),
            position: self.position,
            name: self.name.map(str::to_string),
        })
    }
}

impl SourceMap {
    /// Finds the segment covering a generated position: the last segment on
    /// the same line whose column is not greater than the query's.
    pub fn find_segment(&self, generated: Position) -> Option<&Segment> {
        let segments = self.segments();
        let idx = segments.partition_point(|s| s.generated <= generated);
        let segment = segments.get(idx.checked_sub(1)?)?;
        (segment.generated.line == generated.line).then_some(segment)
    }

    /// Resolves a generated position to its original location.
    pub fn original_position_for(&self, generated: Position) -> Resolution {
        match self.lookup(generated) {
            Some(hit) => hit.into_resolution(),
            None => Resolution::Unresolved,
        }
    }

    /// Finds the first generated position mapped to `original` in `source`.
    pub fn generated_position_for(&self, source: &str, original: Position) -> Option<Position> {
        self.segments().iter().find_map(|segment| {
            let origin = segment.origin?;
            (origin.position == original && self.source(origin.source) == Some(source))
                .then_some(segment.generated)
        })
    }

    fn lookup(&self, generated: Position) -> Option<Hit<'_>> {
        let origin = self.find_segment(generated)?.origin?;
        Some(self.hit(origin))
    }

    fn hit(&self, origin: Origin) -> Hit<'_> {
        Hit {
            source: self.source(origin.source),
            content: self.source_content(origin.source),
            position: origin.position,
            name: origin.name.and_then(|name| self.name(name)),
        }
    }
}

/// One pipeline stage: the file name its input is known by, and the map it
/// produced. A stage without a map is the identity.
#[derive(Debug, Clone)]
pub struct Stage {
    filename: String,
    map: Option<Arc<SourceMap>>,
}

impl Stage {
    /// Creates a stage from an already decoded map.
    pub fn new(filename: impl Into<String>, map: Option<SourceMap>) -> Self {
        Self {
            filename: filename.into(),
            map: map.map(Arc::new),
        }
    }

    /// Decodes a stage's map payload. A missing payload makes the stage the
    /// identity, resolving every position to itself under `filename`.
    pub fn decode(
        filename: impl Into<String>,
        payload: Option<&RawSourceMap>,
    ) -> Result<Self, DecodeError> {
        let map = payload.map(SourceMap::decode).transpose()?;
        Ok(Self::new(filename, map))
    }

    /// Returns the stage's file name.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Returns the stage's map, `None` for identity stages.
    pub fn map(&self) -> Option<&SourceMap> {
        self.map.as_deref()
    }
}

/// Resolves positions of a final output back through every earlier stage.
///
/// Stages are ordered first to last. Cloning is cheap; maps are shared.
#[derive(Debug, Clone, Default)]
pub struct ChainResolver {
    stages: Vec<Stage>,
}

impl ChainResolver {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a later stage.
    pub fn push(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    /// Returns a copy of this chain with a later stage appended.
    pub fn then(&self, stage: Stage) -> Self {
        let mut chain = self.clone();
        chain.push(stage);
        chain
    }

    /// Returns the stages, first to last.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Resolves a position in the last stage's output to the true original.
    pub fn original_position_for(&self, generated: Position) -> Resolution {
        match self.stages.split_last() {
            None => Resolution::Unresolved,
            Some((last, upstream)) => {
                let hit = match last.map() {
                    Some(map) => map.lookup(generated),
                    None => Some(identity_hit(last, generated)),
                };
                match hit.and_then(|hit| trace_upstream(upstream, hit)) {
                    Some(hit) => hit.into_resolution(),
                    None => Resolution::Unresolved,
                }
            }
        }
    }

    /// Flattens the chain into one map of the last stage's output whose
    /// sources are the true originals. Returns `None` when the last stage is
    /// the identity.
    ///
    /// Every source the last map declares is kept, traced back to the
    /// originals behind it, even when no segment resolves to it.
    pub fn compose(&self) -> Option<SourceMap> {
        let (last, upstream) = self.stages.split_last()?;
        let last_map = last.map()?;
        let mut composed = SourceMap::new(last_map.file().map(str::to_string));
        declare_sources(&mut composed, upstream, last_map);

        for segment in last_map.segments() {
            let hit = segment
                .origin
                .and_then(|origin| trace_upstream(upstream, last_map.hit(origin)));

            let Some(hit) = hit else {
                composed.push_segment(Segment::unmapped(segment.generated));
                continue;
            };

            let source = composed.add_source(hit.source, hit.content);
            let name = hit.name.map(|name| composed.add_name(name));
            composed.push_segment(Segment {
                generated: segment.generated,
                origin: Some(Origin {
                    source,
                    position: hit.position,
                    name,
                }),
            });
        }

        Some(composed)
    }
}

fn identity_hit(stage: &Stage, position: Position) -> Hit<'_> {
    Hit {
        source: Some(stage.filename()),
        content: None,
        position,
        name: None,
    }
}

/// Registers the originals behind each source `map` declares. A source naming
/// the upstream stage's file stands for that stage's own sources.
fn declare_sources(composed: &mut SourceMap, upstream: &[Stage], map: &SourceMap) {
    for (index, source) in map.sources().iter().enumerate() {
        let inner = upstream
            .split_last()
            .filter(|(stage, _)| source.as_deref() == Some(stage.filename()))
            .and_then(|(stage, rest)| Some((stage.map()?, rest)));
        match inner {
            Some((inner, rest)) => declare_sources(composed, rest, inner),
            None => {
                composed.add_source(source.as_deref(), map.source_content(index as u32));
            }
        }
    }
}

/// Feeds a hit into earlier stages, last to first.
///
/// A hit only moves upstream while its source names the upstream stage's file;
/// any other source is already original. Identity stages end the walk.
fn trace_upstream<'a>(upstream: &'a [Stage], mut hit: Hit<'a>) -> Option<Hit<'a>> {
    for stage in upstream.iter().rev() {
        if hit.source != Some(stage.filename()) {
            break;
        }
        let Some(map) = stage.map() else {
            break;
        };
        let inner = map.lookup(hit.position)?;
        hit = Hit {
            name: inner.name.or(hit.name),
            ..inner
        };
    }
    Some(hit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn map(sources: &[&str], segments: &[Segment]) -> SourceMap {
        let mut map = SourceMap::new(None);
        for source in sources {
            map.add_source(Some(source), None);
        }
        for segment in segments {
            map.push_segment(*segment);
        }
        map
    }

    fn resolved(source: &str, line: u32, column: u32) -> Resolution {
        Resolution::Resolved(ResolvedLocation {
            source: Some(source.to_string()),
            position: Position::new(line, column),
            name: None,
        })
    }

    #[test]
    fn test_lookup_uses_greatest_lower_bound_on_line() {
        let map = map(
            &["a.svelte"],
            &[
                Segment::mapped(Position::new(1, 4), 0, Position::new(1, 0)),
                Segment::mapped(Position::new(1, 10), 0, Position::new(2, 3)),
                Segment::unmapped(Position::new(1, 20)),
            ],
        );

        assert_eq!(map.original_position_for(Position::new(1, 3)), Resolution::Unresolved);
        assert_eq!(map.original_position_for(Position::new(1, 4)), resolved("a.svelte", 1, 0));
        assert_eq!(map.original_position_for(Position::new(1, 9)), resolved("a.svelte", 1, 0));
        assert_eq!(map.original_position_for(Position::new(1, 15)), resolved("a.svelte", 2, 3));
        assert_eq!(map.original_position_for(Position::new(1, 25)), Resolution::Unresolved);
        assert_eq!(map.original_position_for(Position::new(2, 0)), Resolution::Unresolved);
        assert_eq!(map.original_position_for(Position::new(0, 5)), Resolution::Unresolved);
    }

    #[test]
    fn test_null_source_is_resolved_not_unresolved() {
        let mut map = SourceMap::new(None);
        let source = map.add_source(None, None);
        map.push_segment(Segment::mapped(Position::new(1, 0), source, Position::new(3, 1)));

        assert_eq!(
            map.original_position_for(Position::new(1, 2)),
            Resolution::Resolved(ResolvedLocation {
                source: None,
                position: Position::new(3, 1),
                name: None,
            })
        );
    }

    #[test]
    fn test_identity_stage() {
        let chain = ChainResolver::new().then(Stage::decode("input.svelte", None).unwrap());
        assert_eq!(
            chain.original_position_for(Position::new(7, 3)),
            resolved("input.svelte", 7, 3)
        );
        assert!(chain.compose().is_none());
    }

    #[test]
    fn test_chain_through_two_maps() {
        // Stage A moves original 1:10 to 1:4, stage B moves 1:4 to 2:20.
        let a = map(
            &["input.svelte"],
            &[Segment::mapped(Position::new(1, 4), 0, Position::new(1, 10))],
        );
        let b = map(
            &["input.svelte"],
            &[Segment::mapped(Position::new(2, 20), 0, Position::new(1, 4))],
        );
        let chain = ChainResolver::new()
            .then(Stage::new("input.svelte", Some(a)))
            .then(Stage::new("input.svelte", Some(b)));

        assert_eq!(
            chain.original_position_for(Position::new(2, 20)),
            resolved("input.svelte", 1, 10)
        );
    }

    #[test]
    fn test_chain_surfaces_upstream_source() {
        let a = map(
            &["styles.scss"],
            &[Segment::mapped(Position::new(1, 0), 0, Position::new(5, 2))],
        );
        let b = map(
            &["input.svelte"],
            &[Segment::mapped(Position::new(1, 0), 0, Position::new(1, 0))],
        );
        let chain = ChainResolver::new()
            .then(Stage::new("input.svelte", Some(a)))
            .then(Stage::new("input.svelte", Some(b)));

        assert_eq!(
            chain.original_position_for(Position::new(1, 0)),
            resolved("styles.scss", 5, 2)
        );
        let composed = chain.compose().unwrap();
        assert_eq!(composed.sources(), &[Some("styles.scss".to_string())]);
    }

    #[test]
    fn test_chain_stops_at_identity_stage() {
        let a = map(
            &["input.svelte"],
            &[Segment::mapped(Position::new(1, 0), 0, Position::new(9, 9))],
        );
        let b = map(
            &["input.svelte"],
            &[Segment::mapped(Position::new(1, 0), 0, Position::new(1, 0))],
        );
        let chain = ChainResolver::new()
            .then(Stage::new("input.svelte", Some(a)))
            .then(Stage::new("input.svelte", None))
            .then(Stage::new("input.svelte", Some(b)));

        assert_eq!(
            chain.original_position_for(Position::new(1, 3)),
            resolved("input.svelte", 1, 0)
        );
    }

    #[test]
    fn test_chain_leaves_foreign_sources_alone() {
        let a = map(
            &["input.svelte"],
            &[Segment::mapped(Position::new(1, 0), 0, Position::new(9, 9))],
        );
        let b = map(
            &["helper.js"],
            &[Segment::mapped(Position::new(1, 0), 0, Position::new(2, 0))],
        );
        let chain = ChainResolver::new()
            .then(Stage::new("input.svelte", Some(a)))
            .then(Stage::new("input.svelte", Some(b)));

        assert_eq!(
            chain.original_position_for(Position::new(1, 0)),
            resolved("helper.js", 2, 0)
        );
    }

    #[test]
    fn test_chain_unresolved_upstream() {
        let a = map(
            &["input.svelte"],
            &[Segment::mapped(Position::new(2, 0), 0, Position::new(1, 0))],
        );
        let b = map(
            &["input.svelte"],
            &[Segment::mapped(Position::new(1, 0), 0, Position::new(1, 0))],
        );
        let chain = ChainResolver::new()
            .then(Stage::new("input.svelte", Some(a)))
            .then(Stage::new("input.svelte", Some(b)));

        assert!(chain.original_position_for(Position::new(1, 0)).is_unresolved());
        let composed = chain.compose().unwrap();
        assert_eq!(composed.segments(), &[Segment::unmapped(Position::new(1, 0))]);
    }

    #[test]
    fn test_compose_matches_chained_lookup() {
        let a = map(
            &["input.svelte"],
            &[
                Segment::mapped(Position::new(1, 0), 0, Position::new(1, 0)),
                Segment::mapped(Position::new(1, 8), 0, Position::new(1, 2)),
            ],
        );
        let b = map(
            &["input.svelte"],
            &[
                Segment::mapped(Position::new(1, 0), 0, Position::new(1, 0)),
                Segment::mapped(Position::new(2, 1), 0, Position::new(1, 9)),
            ],
        );
        let chain = ChainResolver::new()
            .then(Stage::new("input.svelte", Some(a)))
            .then(Stage::new("input.svelte", Some(b)));
        let composed = chain.compose().unwrap();

        for position in [
            Position::new(1, 0),
            Position::new(1, 5),
            Position::new(2, 1),
            Position::new(2, 4),
        ] {
            assert_eq!(
                composed.original_position_for(position),
                chain.original_position_for(position),
                "{position}"
            );
        }
    }

    #[test]
    fn test_compose_keeps_declared_sources_without_segments() {
        let only_generated = map(&["input.svelte"], &[Segment::unmapped(Position::new(1, 0))]);
        let composed = ChainResolver::new()
            .then(Stage::new("input.svelte", Some(only_generated.clone())))
            .compose()
            .unwrap();
        assert_eq!(composed.sources(), &[Some("input.svelte".to_string())]);

        // Behind an identity stage the declared source is already original.
        let composed = ChainResolver::new()
            .then(Stage::new("input.svelte", None))
            .then(Stage::new("input.svelte", Some(only_generated.clone())))
            .compose()
            .unwrap();
        assert_eq!(composed.sources(), &[Some("input.svelte".to_string())]);

        // Behind a mapped stage it stands for that stage's sources.
        let upstream = map(&["styles.scss", "input.svelte"], &[]);
        let composed = ChainResolver::new()
            .then(Stage::new("input.svelte", Some(upstream)))
            .then(Stage::new("input.svelte", Some(only_generated)))
            .compose()
            .unwrap();
        assert_eq!(
            composed.sources(),
            &[
                Some("styles.scss".to_string()),
                Some("input.svelte".to_string())
            ]
        );
        assert_eq!(composed.segments(), &[Segment::unmapped(Position::new(1, 0))]);
    }

    #[test]
    fn test_compose_dedupes_null_sources() {
        let mut last = SourceMap::new(None);
        let null = last.add_source(None, None);
        last.push_segment(Segment::mapped(Position::new(1, 0), null, Position::new(1, 0)));
        last.push_segment(Segment::mapped(Position::new(1, 4), null, Position::new(2, 0)));

        let composed = ChainResolver::new()
            .then(Stage::new("input.svelte", Some(last)))
            .compose()
            .unwrap();
        assert_eq!(composed.sources(), &[None]);
        assert_eq!(composed.len(), 2);
    }

    #[test]
    fn test_generated_position_for() {
        let map = map(
            &["a.svelte"],
            &[
                Segment::mapped(Position::new(1, 4), 0, Position::new(1, 0)),
                Segment::mapped(Position::new(2, 2), 0, Position::new(3, 1)),
            ],
        );
        assert_eq!(
            map.generated_position_for("a.svelte", Position::new(3, 1)),
            Some(Position::new(2, 2))
        );
        assert_eq!(map.generated_position_for("b.svelte", Position::new(3, 1)), None);
    }
}
