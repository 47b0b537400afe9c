//! Vector storage for ragdb: pluggable nearest-neighbor backends, the
//! document store they index, and on-disk persistence.

pub mod distance;
pub mod documents;
pub mod index;
pub mod persist;
pub mod stats;
pub mod store;

pub use documents::DocumentStore;
pub use index::{build_index, IndexParams, Neighbor, VectorIndex};
pub use stats::VectorStoreStats;
pub use store::VectorStore;
