//! On-disk layout under the data directory.
//!
//! - `index.bin`: magic, backend kind byte, bincode header (dimension, metric,
//!   position map) followed by the bincode backend state
//! - `documents.json`: the document store
//! - `stats.json`: pretty-printed [`VectorStoreStats`]
//!
//! Every write goes to a sibling temp file that is renamed into place.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use ragdb_core::types::DocumentId;
use ragdb_core::{Error, IndexKind, Metric, Result};

use crate::documents::DocumentStore;
use crate::index::{load_index, IndexParams, VectorIndex};
use crate::stats::VectorStoreStats;

pub const INDEX_FILE: &str = "index.bin";
pub const DOCUMENTS_FILE: &str = "documents.json";
pub const STATS_FILE: &str = "stats.json";

const MAGIC: &[u8; 8] = b"RAGDBIX1";

#[derive(Serialize, Deserialize)]
struct IndexHeader {
    dim: usize,
    metric: Metric,
    positions: Vec<Option<DocumentId>>,
}

fn kind_byte(kind: IndexKind) -> u8 {
    match kind {
        IndexKind::Flat => 0,
        IndexKind::Clustered => 1,
        IndexKind::Graph => 2,
    }
}

pub fn write_atomic(path: &Path, write: impl FnOnce(&mut dyn Write) -> Result<()>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = Path::new(&tmp_name);
    {
        let mut out = BufWriter::new(fs::File::create(tmp)?);
        write(&mut out)?;
        out.flush()?;
    }
    fs::rename(tmp, path)?;
    Ok(())
}

pub fn save_index(path: &Path, index: &dyn VectorIndex, positions: &[Option<DocumentId>]) -> Result<()> {
    let header = IndexHeader { dim: index.dim(), metric: index.metric(), positions: positions.to_vec() };
    write_atomic(path, |w| {
        w.write_all(MAGIC)?;
        w.write_all(&[kind_byte(index.kind())])?;
        bincode::serialize_into(&mut *w, &header).map_err(|e| Error::Serialization(e.to_string()))?;
        index.save(w)
    })
}

/// Load `index.bin`, checking it against the configured backend. Query-time
/// settings (`nprobe`, `ef_search`) come from `params`, not the file.
/// `Ok(None)` when the file does not exist.
pub fn load_index_file(path: &Path, params: &IndexParams) -> Result<Option<(Box<dyn VectorIndex>, Vec<Option<DocumentId>>)>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut reader = BufReader::new(fs::File::open(path)?);
    let mut magic = [0u8; 8];
    let mut kind = [0u8; 1];
    reader.read_exact(&mut magic).map_err(|_| Error::IndexCorrupt("truncated header".into()))?;
    if &magic != MAGIC {
        return Err(Error::IndexCorrupt("bad magic".into()));
    }
    reader.read_exact(&mut kind).map_err(|_| Error::IndexCorrupt("truncated header".into()))?;
    if kind[0] != kind_byte(params.kind) {
        return Err(Error::IndexCorrupt(format!("index file is not a {} index", params.kind)));
    }
    let header: IndexHeader =
        bincode::deserialize_from(&mut reader).map_err(|e| Error::IndexCorrupt(e.to_string()))?;
    if header.dim != params.dim {
        return Err(Error::DimensionMismatch { expected: params.dim, got: header.dim });
    }
    if header.metric != params.metric {
        return Err(Error::IndexCorrupt(format!("index built with {} distance", header.metric)));
    }
    let mut index = load_index(params.kind, &mut reader)?;
    index.apply_query_params(params);
    if index.len() != header.positions.len() {
        return Err(Error::IndexCorrupt(format!(
            "{} slots but {} mapped positions",
            index.len(),
            header.positions.len()
        )));
    }
    Ok(Some((index, header.positions)))
}

pub fn save_documents(path: &Path, documents: &DocumentStore) -> Result<()> {
    write_atomic(path, |w| Ok(serde_json::to_writer(w, documents)?))
}

/// `Ok(None)` when the file does not exist.
pub fn load_documents(path: &Path) -> Result<Option<DocumentStore>> {
    if !path.exists() {
        return Ok(None);
    }
    let reader = BufReader::new(fs::File::open(path)?);
    Ok(Some(serde_json::from_reader(reader)?))
}

pub fn save_stats(path: &Path, stats: &VectorStoreStats) -> Result<()> {
    write_atomic(path, |w| Ok(serde_json::to_writer_pretty(w, stats)?))
}
