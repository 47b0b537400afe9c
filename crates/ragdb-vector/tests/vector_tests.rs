use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use tempfile::TempDir;

use ragdb_core::{Document, Error, IndexKind, Metadata, MetadataFilter, MetadataValue, Metric};
use ragdb_vector::distance::distance;
use ragdb_vector::index::{build_index, ClusteredIndex, IndexParams};
use ragdb_vector::persist::{DOCUMENTS_FILE, INDEX_FILE, STATS_FILE};
use ragdb_vector::{VectorIndex, VectorStore};

const DIM: usize = 8;
const CATEGORIES: [&str; 3] = ["amenities", "dining", "policies"];

fn random_vectors(n: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| (0..DIM).map(|_| rng.gen_range(-1.0..1.0)).collect()).collect()
}

fn corpus(n: usize, seed: u64) -> Vec<Document> {
    random_vectors(n, seed)
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            let mut m = Metadata::new();
            m.insert("category".into(), MetadataValue::from(CATEGORIES[i % 3]));
            m.insert("source".into(), MetadataValue::from(format!("file{}", i % 4)));
            m.insert("chunk_id".into(), MetadataValue::from(i));
            Document::new(format!("doc-{i}"), format!("passage {i}")).with_metadata(m).with_embedding(v)
        })
        .collect()
}

fn brute_force<'a>(docs: &'a [Document], query: &[f32], k: usize, filter: Option<&MetadataFilter>) -> Vec<&'a str> {
    let mut scored: Vec<(&str, f32)> = docs
        .iter()
        .filter(|d| filter.map_or(true, |f| f.matches(&d.metadata)))
        .map(|d| (d.id.as_str(), distance(Metric::Euclidean, query, d.embedding.as_ref().unwrap())))
        .collect();
    scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
    scored.into_iter().take(k).map(|(id, _)| id).collect()
}

fn ids<'a>(hits: &[(&'a Document, f32)]) -> Vec<&'a str> {
    hits.iter().map(|(d, _)| d.id.as_str()).collect()
}

fn store_with(kind: IndexKind, docs: &[Document]) -> VectorStore {
    let mut store = VectorStore::new(IndexParams::new(kind, DIM));
    store.add(docs.to_vec()).expect("add");
    store
}

#[test]
fn flat_search_is_exact() {
    let docs = corpus(200, 1);
    let store = store_with(IndexKind::Flat, &docs);
    for query in random_vectors(10, 99) {
        let hits = store.search(&query, 7, None).unwrap();
        assert_eq!(ids(&hits), brute_force(&docs, &query, 7, None));
        assert!(hits.windows(2).all(|w| w[0].1 <= w[1].1), "ascending distance");
    }
}

#[test]
fn filtered_search_matches_brute_force() {
    let docs = corpus(150, 2);
    let store = store_with(IndexKind::Flat, &docs);
    let filter = MetadataFilter::new().eq("category", "dining").range("chunk_id", Some(20.0), Some(120.0));
    for query in random_vectors(5, 7) {
        let hits = store.search(&query, 5, Some(&filter)).unwrap();
        assert_eq!(ids(&hits), brute_force(&docs, &query, 5, Some(&filter)));
        assert!(hits.iter().all(|(d, _)| filter.matches(&d.metadata)));
    }
    let nothing = MetadataFilter::new().eq("category", "spa");
    assert!(store.search(&docs[0].embedding.clone().unwrap(), 5, Some(&nothing)).unwrap().is_empty());
}

#[test]
fn search_never_exceeds_corpus() {
    let docs = corpus(3, 3);
    let store = store_with(IndexKind::Flat, &docs);
    assert_eq!(store.search(&random_vectors(1, 4)[0], 10, None).unwrap().len(), 3);
    let empty = VectorStore::new(IndexParams::new(IndexKind::Graph, DIM));
    assert!(empty.search(&random_vectors(1, 4)[0], 10, None).unwrap().is_empty());
}

#[test]
fn invalid_batches_leave_store_unchanged() {
    let docs = corpus(10, 5);
    let mut store = store_with(IndexKind::Flat, &docs);

    let mut batch = corpus(2, 6);
    batch[0].id = "fresh".into();
    batch[1].id = "doc-3".into();
    assert!(matches!(store.add(batch), Err(Error::DuplicateId(id)) if id == "doc-3"));

    let short = Document::new("short", "x").with_embedding(vec![0.0; DIM - 1]);
    assert!(matches!(store.add(vec![short]), Err(Error::DimensionMismatch { .. })));

    let missing = Document::new("bare", "no vector");
    assert!(store.add(vec![missing]).is_err());

    assert_eq!(store.len(), 10);
    assert_eq!(store.index_slots(), 10);
    assert!(store.get("fresh").is_none());
}

#[test]
fn delete_and_update_tombstone_until_rebuild() {
    let docs = corpus(20, 8);
    let mut store = store_with(IndexKind::Flat, &docs);
    let query = docs[4].embedding.clone().unwrap();

    assert!(store.delete("doc-4"));
    assert!(!store.delete("doc-4"));
    let hits = store.search(&query, 3, None).unwrap();
    assert!(!ids(&hits).contains(&"doc-4"));

    let moved = Document::new("doc-5", "moved").with_metadata(docs[5].metadata.clone()).with_embedding(query.clone());
    store.update(moved).unwrap();
    assert_eq!(store.search(&query, 1, None).unwrap()[0].0.id, "doc-5");
    assert_eq!(store.tombstones(), 2);
    assert_eq!(store.len(), 19);

    let ghost = Document::new("ghost", "x").with_embedding(query.clone());
    assert!(matches!(store.update(ghost), Err(Error::NotFound(_))));

    let before: Vec<String> = ids(&store.search(&query, 10, None).unwrap()).into_iter().map(String::from).collect();
    store.rebuild().unwrap();
    assert_eq!(store.tombstones(), 0);
    assert_eq!(store.index_slots(), 19);
    let after: Vec<String> = ids(&store.search(&query, 10, None).unwrap()).into_iter().map(String::from).collect();
    assert_eq!(before, after, "rebuild preserves results");
}

#[test]
fn needs_rebuild_past_threshold() {
    let docs = corpus(10, 9);
    let mut store = store_with(IndexKind::Flat, &docs);
    for i in 0..3 {
        store.delete(&format!("doc-{i}"));
    }
    assert!(!store.needs_rebuild(), "3/10 is not above 0.3");
    store.delete("doc-3");
    assert!(store.needs_rebuild());
}

#[test]
fn persist_and_open_round_trip_every_backend() {
    for kind in [IndexKind::Flat, IndexKind::Clustered, IndexKind::Graph] {
        let tmp = TempDir::new().unwrap();
        let docs = corpus(120, 10);
        let mut store = store_with(kind, &docs);
        store.delete("doc-7");
        store.persist(tmp.path()).unwrap();
        for file in [DOCUMENTS_FILE, INDEX_FILE, STATS_FILE] {
            assert!(tmp.path().join(file).exists(), "{file} written for {kind}");
        }

        let reopened = VectorStore::open(tmp.path(), IndexParams::new(kind, DIM)).unwrap();
        assert_eq!(reopened.len(), 119);
        assert_eq!(reopened.tombstones(), 1, "tombstones survive a reload for {kind}");
        for query in random_vectors(5, 11) {
            assert_eq!(
                ids(&store.search(&query, 5, None).unwrap()),
                ids(&reopened.search(&query, 5, None).unwrap()),
                "{kind} results differ after reload"
            );
        }
    }
}

#[test]
fn corrupt_index_is_rebuilt_from_documents() {
    let tmp = TempDir::new().unwrap();
    let docs = corpus(30, 12);
    let store = store_with(IndexKind::Flat, &docs);
    store.persist(tmp.path()).unwrap();
    fs::write(tmp.path().join(INDEX_FILE), b"not an index at all").unwrap();

    let reopened = VectorStore::open(tmp.path(), IndexParams::new(IndexKind::Flat, DIM)).unwrap();
    assert_eq!(reopened.len(), 30);
    let query = &random_vectors(1, 13)[0];
    assert_eq!(ids(&reopened.search(query, 4, None).unwrap()), brute_force(&docs, query, 4, None));
}

#[test]
fn backend_change_triggers_rebuild() {
    let tmp = TempDir::new().unwrap();
    let docs = corpus(40, 14);
    store_with(IndexKind::Flat, &docs).persist(tmp.path()).unwrap();

    let reopened = VectorStore::open(tmp.path(), IndexParams::new(IndexKind::Graph, DIM)).unwrap();
    assert_eq!(reopened.stats().index_kind, IndexKind::Graph);
    assert_eq!(reopened.index_slots(), 40);
}

#[test]
fn corrupt_documents_start_empty() {
    let tmp = TempDir::new().unwrap();
    store_with(IndexKind::Flat, &corpus(5, 15)).persist(tmp.path()).unwrap();
    fs::write(tmp.path().join(DOCUMENTS_FILE), b"{ truncated").unwrap();

    let reopened = VectorStore::open(tmp.path(), IndexParams::new(IndexKind::Flat, DIM)).unwrap();
    assert!(reopened.is_empty());
    assert_eq!(reopened.index_slots(), 0);
    assert!(tmp.path().join(format!("{DOCUMENTS_FILE}.corrupt")).exists());
}

#[test]
fn dimension_change_keeps_old_documents_aside() {
    let tmp = TempDir::new().unwrap();
    store_with(IndexKind::Flat, &corpus(5, 18)).persist(tmp.path()).unwrap();

    let reopened = VectorStore::open(tmp.path(), IndexParams::new(IndexKind::Flat, DIM / 2)).unwrap();
    assert!(reopened.is_empty());
    reopened.persist(tmp.path()).unwrap();

    let aside = fs::read_to_string(tmp.path().join(format!("{DOCUMENTS_FILE}.corrupt"))).unwrap();
    assert!(aside.contains("doc-0") && aside.contains("doc-4"));
    let back = VectorStore::open(tmp.path(), IndexParams::new(IndexKind::Flat, DIM)).unwrap();
    assert!(back.is_empty(), "the emptied store was persisted over the old path");
}

#[test]
fn reopen_uses_configured_nprobe() {
    let tmp = TempDir::new().unwrap();
    let docs = corpus(300, 19);
    let mut narrow = IndexParams::new(IndexKind::Clustered, DIM);
    narrow.min_train_size = 100;
    narrow.nprobe = 1;
    let mut store = VectorStore::new(narrow.clone());
    store.add(docs.clone()).unwrap();
    store.persist(tmp.path()).unwrap();

    let wide = IndexParams { nprobe: 10_000, ..narrow };
    let reopened = VectorStore::open(tmp.path(), wide).unwrap();
    assert_eq!(reopened.index_slots(), 300);
    for query in random_vectors(20, 20) {
        let hits = reopened.search(&query, 5, None).unwrap();
        assert_eq!(ids(&hits), brute_force(&docs, &query, 5, None), "every cluster is probed");
    }
}

#[test]
fn missing_directory_is_an_empty_store() {
    let tmp = TempDir::new().unwrap();
    let store = VectorStore::open(&tmp.path().join("nothing-here"), IndexParams::new(IndexKind::Flat, DIM)).unwrap();
    assert!(store.is_empty());
}

#[test]
fn stats_count_categories_and_sources() {
    let docs = corpus(12, 16);
    let mut store = store_with(IndexKind::Flat, &docs);
    store.delete("doc-0");
    let stats = store.stats();
    assert_eq!(stats.document_count, 11);
    assert_eq!(stats.tombstones, 1);
    assert_eq!(stats.categories.get("amenities"), Some(&3));
    assert_eq!(stats.categories.get("dining"), Some(&4));
    assert_eq!(stats.sources.values().sum::<usize>(), 11);
    assert!(stats.memory_bytes > 0);
}

#[test]
fn clustered_index_trains_at_threshold() {
    let mut params = IndexParams::new(IndexKind::Clustered, DIM);
    params.min_train_size = 50;
    let mut index = ClusteredIndex::new(&params);
    let vectors = random_vectors(80, 17);

    index.add(&vectors[..49]).unwrap();
    assert!(!index.is_trained(), "pending until the minimum is reached");
    let hits = index.search(&vectors[10], 1);
    assert_eq!(hits[0].position, 10, "pending vectors are scanned exactly");

    index.add(&vectors[49..]).unwrap();
    assert!(index.is_trained());
    assert_eq!(index.nlist(), 14, "2 * floor(sqrt(50))");
    assert_eq!(index.len(), 80);
    assert_eq!(index.search(&vectors[70], 1)[0].position, 70);
}

fn recall(params: IndexParams, seed: u64) -> f32 {
    let docs = corpus(500, seed);
    let mut store = VectorStore::new(params);
    store.add(docs.clone()).unwrap();
    let queries = random_vectors(20, seed + 1);
    let mut found = 0;
    for q in &queries {
        let truth = brute_force(&docs, q, 10, None);
        let got = ids(&store.search(q, 10, None).unwrap());
        found += got.iter().filter(|id| truth.contains(id)).count();
    }
    #[allow(clippy::cast_precision_loss)]
    let r = found as f32 / (queries.len() * 10) as f32;
    r
}

#[test]
fn approximate_backends_have_high_recall() {
    let graph = recall(IndexParams::new(IndexKind::Graph, DIM), 18);
    assert!(graph >= 0.9, "graph recall {graph}");
    let mut params = IndexParams::new(IndexKind::Clustered, DIM);
    params.nprobe = 16;
    let clustered = recall(params, 19);
    assert!(clustered >= 0.7, "clustered recall {clustered}");
}

#[test]
fn build_index_honours_kind_and_metric() {
    let mut params = IndexParams::new(IndexKind::Graph, DIM);
    params.metric = Metric::Cosine;
    let index = build_index(&params);
    assert_eq!(index.kind(), IndexKind::Graph);
    assert_eq!(index.metric(), Metric::Cosine);
    assert!(index.is_empty());
}
