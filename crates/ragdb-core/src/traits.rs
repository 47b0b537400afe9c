use crate::error::Result;

/// Contract for the external embedding model: text in, fixed-length vector out.
///
/// Implementations must return exactly one vector of length `dim()` per
/// input, in input order, and must be deterministic for a given `id()`.
/// Unreachable or failing models report `Error::EmbeddingUnavailable`.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `hash:d384`).
    fn id(&self) -> &str;
    fn dim(&self) -> usize;
    /// Maximum token length for this provider.
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
