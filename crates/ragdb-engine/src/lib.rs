//! ragdb-engine
//!
//! The retrieval-augmented generation orchestrator: ingest text into a
//! persistent vector store and answer queries with ranked documents plus an
//! assembled context block.

#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod context;
pub mod engine;
pub mod feedback;
pub mod query;
pub mod retriever;
pub mod scoring;

pub use context::assemble_context;
pub use engine::RagEngine;
pub use feedback::{FeedbackEntry, FeedbackLog, FEEDBACK_FILE};
pub use query::preprocess_query;
pub use retriever::Retriever;
pub use scoring::{scorer_for, DistanceScorer, KeywordBlendScorer, RelevanceScorer};
