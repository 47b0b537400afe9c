//! ragdb-core
//!
//! Domain types, errors, configuration and text processing shared by the
//! embedding, vector and engine crates.

#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod config;
pub mod error;
pub mod filter;
pub mod metadata;
pub mod source;
pub mod text;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use filter::{Matcher, MetadataFilter};
pub use types::{Document, Metadata, MetadataValue, RetrievalResult, ScoredDocument};
pub use config::{EngineConfig, IndexKind, Metric, ScorerKind};
pub use text::{ChunkUnit, Chunker, ChunkingConfig};
pub use traits::Embedder;
