use std::fs;
use tempfile::TempDir;

use ragdb_core::config::Config;
use ragdb_core::metadata::extract_metadata;
use ragdb_core::source::SourceLoader;
use ragdb_core::text::{chunk, clean, split_units};
use ragdb_core::{ChunkUnit, Chunker, ChunkingConfig, Error, IndexKind, MetadataFilter, MetadataValue};

fn reconstruct(chunks: &[String], overlap: usize, unit: ChunkUnit) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for (i, c) in chunks.iter().enumerate() {
        let units = split_units(c, unit);
        let skip = if i == 0 { 0 } else { overlap };
        parts.extend(units.into_iter().skip(skip));
    }
    parts.join(" ")
}

#[test]
fn word_chunks_cover_the_cleaned_text() {
    let text = clean(&(0..57).map(|i| format!("w{i}")).collect::<Vec<_>>().join("  \n"));
    let chunks = chunk(&text, 10, 3, ChunkUnit::Word).expect("chunk");
    assert!(chunks.len() > 1);
    for c in &chunks {
        assert!(c.split_whitespace().count() <= 10);
    }
    for pair in chunks.windows(2) {
        let prev: Vec<&str> = pair[0].split_whitespace().collect();
        let next: Vec<&str> = pair[1].split_whitespace().collect();
        assert_eq!(&prev[prev.len() - 3..], &next[..3], "consecutive chunks share the overlap");
    }
    assert_eq!(reconstruct(&chunks, 3, ChunkUnit::Word), text);
}

#[test]
fn sentence_chunks_cover_the_cleaned_text() {
    let text = "Check-in is at 3pm. The spa opens at 9am. Breakfast is served until 10:30! Pets are welcome? Parking costs 12.50 per night.";
    let chunks = chunk(text, 2, 1, ChunkUnit::Sentence).expect("chunk");
    assert_eq!(chunks.len(), 4);
    assert_eq!(chunks[0], "Check-in is at 3pm. The spa opens at 9am.");
    assert_eq!(reconstruct(&chunks, 1, ChunkUnit::Sentence), text);
}

#[test]
fn empty_input_yields_one_empty_chunk() {
    let chunker = Chunker::new(ChunkingConfig::default()).unwrap();
    assert_eq!(chunker.split("   "), vec![String::new()]);
    assert_eq!(chunk("", 5, 1, ChunkUnit::Sentence).unwrap(), vec![String::new()]);
}

#[test]
fn short_text_is_a_single_chunk() {
    let chunker = Chunker::new(ChunkingConfig { size: 50, overlap: 5, unit: ChunkUnit::Word }).unwrap();
    assert_eq!(chunker.split("Check-in is at 3pm."), vec!["Check-in is at 3pm.".to_string()]);
}

#[test]
fn invalid_chunking_is_rejected() {
    let err = Chunker::new(ChunkingConfig { size: 4, overlap: 4, unit: ChunkUnit::Word }).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn spa_scenario_metadata() {
    let m = extract_metadata("Check-in is at 3pm. The spa opens at 9am.");
    let entities = m.get("entities").and_then(MetadataValue::as_str).unwrap_or_default();
    assert!(entities.contains("3pm") && entities.contains("9am"), "entities: {entities}");
    assert_eq!(m.get("word_count"), Some(&MetadataValue::Int(9)));
    assert!(m.contains_key("category"));
}

#[test]
fn filter_semantics() {
    let mut meta = ragdb_core::Metadata::new();
    meta.insert("category".into(), "amenities".into());
    meta.insert("chunk_id".into(), MetadataValue::Int(2));
    meta.insert("rating".into(), MetadataValue::Float(4.5));

    assert!(MetadataFilter::new().matches(&meta), "empty filter matches everything");
    assert!(MetadataFilter::new().eq("category", "amenities").matches(&meta));
    assert!(!MetadataFilter::new().eq("category", "dining").matches(&meta));
    assert!(!MetadataFilter::new().eq("missing", "x").matches(&meta), "missing field never matches");
    assert!(MetadataFilter::new().eq("chunk_id", 2.0).matches(&meta), "int and float compare numerically");
    assert!(MetadataFilter::new().one_of("category", ["dining", "amenities"]).matches(&meta));
    assert!(MetadataFilter::new().range("rating", Some(4.5), Some(5.0)).matches(&meta), "range is inclusive");
    assert!(!MetadataFilter::new().range("rating", None, Some(4.0)).matches(&meta));
    assert!(!MetadataFilter::new().eq("category", "amenities").range("chunk_id", Some(3.0), None).matches(&meta));
}

#[test]
fn filter_json_forms() {
    let f = MetadataFilter::from_json(r#"{"category":"amenities","source":["a","b"],"chunk_id":{"max":3}}"#).unwrap();
    let expected = MetadataFilter::new()
        .eq("category", "amenities")
        .one_of("source", ["a", "b"])
        .range("chunk_id", None, Some(3.0));
    assert_eq!(f, expected);
    assert!(MetadataFilter::from_json("[1,2").is_err());
}

#[test]
fn source_loader_walks_sorted_text_files() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::create_dir_all(dir.join("policies")).unwrap();
    fs::write(dir.join("policies/checkin.md"), "Check-in is at 3pm.").unwrap();
    fs::write(dir.join("amenities.txt"), "The spa opens at 9am.").unwrap();
    fs::write(dir.join("image.png"), [0u8, 1, 2]).unwrap();
    fs::write(dir.join("latin1.txt"), [b'c', b'a', b'f', 0xE9]).unwrap();

    let sources = SourceLoader::new().load_directory(dir).expect("load");
    let names: Vec<&str> = sources.iter().map(|s| s.source.as_str()).collect();
    assert_eq!(names, vec!["amenities", "latin1", "policies/checkin"]);
    assert!(sources[1].text.starts_with("caf"), "lossy fallback keeps readable prefix");

    let limited = SourceLoader::new().with_limit(1).load_directory(dir).unwrap();
    assert_eq!(limited.len(), 1);
}

#[test]
fn config_defaults_and_overrides() {
    let engine = Config::from_toml_str("").engine().expect("defaults");
    assert_eq!(engine.chunking.size, 200);
    assert_eq!(engine.index.kind, IndexKind::Flat);
    assert_eq!(engine.retrieval.default_k, 5);

    let cfg = Config::from_toml_str(
        r#"
        [engine]
        data_dir = "/tmp/ragdb"
        [engine.index]
        kind = "graph"
        ef_search = 32
        [engine.chunking]
        size = 50
        overlap = 10
        unit = "sentence"
        "#,
    );
    let engine = cfg.engine().expect("overrides");
    assert_eq!(engine.index.kind, IndexKind::Graph);
    assert_eq!(engine.index.ef_search, 32);
    assert_eq!(engine.index.m, 16, "unset keys keep defaults");
    assert_eq!(engine.chunking.unit, ChunkUnit::Sentence);
    assert_eq!(engine.data_dir, std::path::PathBuf::from("/tmp/ragdb"));
}

#[test]
fn config_rejects_invalid_values() {
    let cfg = Config::from_toml_str("[engine.chunking]\nsize = 10\noverlap = 10\n");
    assert!(cfg.engine().is_err());
    let cfg = Config::from_toml_str("[engine.embedding]\nmodel = \"gpt\"\n");
    assert!(cfg.engine().is_err());
}
