//! Chained resolution across stages and locator round-trips.

use pretty_assertions::assert_eq;
use source_map::{
    ChainResolver, Locator, Position, Resolution, ResolvedLocation, Segment, SourceMap, Stage,
};

const ORIGINAL: &str = "let answer = compute(input, 42);\nexport default answer;\n";

fn single_segment_map(source: &str, generated: Position, original: Position) -> SourceMap {
    let mut map = SourceMap::new(None);
    let index = map.add_source(Some(source), None);
    map.push_segment(Segment::mapped(generated, index, original));
    map
}

#[test]
fn test_offset_chains_through_two_stages() {
    // Stage A moves original offset 10 to offset 4; stage B moves 4 to 20.
    let original = Locator::new(ORIGINAL, 1);
    let a_output = Locator::new("pad_answer_________________", 1);
    let b_output = Locator::new("______________________answer", 1);

    let a_map = single_segment_map(
        "input.svelte",
        a_output.locate(4).unwrap().position(),
        original.locate(10).unwrap().position(),
    );
    let b_map = single_segment_map(
        "input.svelte",
        b_output.locate(20).unwrap().position(),
        a_output.locate(4).unwrap().position(),
    );

    let chain = ChainResolver::new()
        .then(Stage::new("input.svelte", Some(a_map)))
        .then(Stage::new("input.svelte", Some(b_map)));

    let resolved = chain.original_position_for(b_output.locate(20).unwrap().position());
    let location = resolved.location().unwrap();
    assert_eq!(location.source.as_deref(), Some("input.svelte"));
    assert_eq!(original.offset_of(location.position).unwrap(), 10);

    let composed = chain.compose().unwrap();
    assert_eq!(
        composed.original_position_for(b_output.locate(20).unwrap().position()),
        resolved
    );
}

#[test]
fn test_unresolved_upstream_is_unresolved() {
    let a_map = single_segment_map("input.svelte", Position::new(2, 0), Position::new(1, 0));
    let b_map = single_segment_map("input.svelte", Position::new(1, 0), Position::new(1, 5));

    let chain = ChainResolver::new()
        .then(Stage::new("input.svelte", Some(a_map)))
        .then(Stage::new("input.svelte", Some(b_map)));

    assert_eq!(
        chain.original_position_for(Position::new(1, 3)),
        Resolution::Unresolved
    );
}

#[test]
fn test_identity_stage_resolves_to_itself() {
    let chain = ChainResolver::new().then(Stage::new("input.svelte", None));
    assert_eq!(
        chain.original_position_for(Position::new(3, 7)),
        Resolution::Resolved(ResolvedLocation {
            source: Some("input.svelte".to_string()),
            position: Position::new(3, 7),
            name: None,
        })
    );
    assert!(chain.compose().is_none());
}

#[test]
fn test_decoding_is_idempotent() {
    let json = r#"{
        "version": 3,
        "file": "out.js",
        "sources": ["input.svelte"],
        "sourcesContent": ["<p>{a}</p>"],
        "names": ["a"],
        "mappings": "AAAA,GAAG,CAACA;AACA"
    }"#;

    let first = SourceMap::from_json(json).unwrap();
    let second = SourceMap::from_json(json).unwrap();
    assert_eq!(first, second);

    let reencoded = SourceMap::decode(&first.to_raw()).unwrap();
    assert_eq!(reencoded, first);
}

#[test]
fn test_locator_round_trip() {
    let text = "<p>héllo</p>\n\n{emoji} 🎉 done\r\nlast";
    for bias in [0, 1] {
        let locator = Locator::new(text, bias);
        for (offset, _) in text.char_indices().chain([(text.len(), ' ')]) {
            let location = locator.locate(offset).unwrap();
            assert_eq!(location.character, offset);
            assert_eq!(
                locator.offset_for(location.line, location.column).unwrap(),
                offset,
                "offset {offset} with bias {bias}"
            );
        }
    }
}
