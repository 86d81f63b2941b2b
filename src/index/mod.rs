//! Vector index abstraction.
//!
//! The evaluation pipeline talks to vector storage through the
//! [`VectorIndex`] trait so the same orchestration runs against a real
//! Qdrant instance or the in-memory index used in tests.

mod memory;
mod qdrant;

pub use memory::MemoryIndex;
pub use qdrant::QdrantIndex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chunking::Chunk;
use crate::error::Result;

/// Distance metric for a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    /// Cosine similarity; higher is better.
    Cosine,
    /// Euclidean distance; lower is better.
    Euclid,
    /// Inner product; higher is better.
    Dot,
}

impl Metric {
    /// The three metrics every evaluation run compares, in report order.
    pub fn all() -> [Metric; 3] {
        [Metric::Cosine, Metric::Euclid, Metric::Dot]
    }

    /// Short name used in collection names and report rows.
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::Euclid => "euclid",
            Metric::Dot => "dot",
        }
    }

    /// Whether a smaller score means a closer match.
    pub fn ascending(&self) -> bool {
        matches!(self, Metric::Euclid)
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One point to store: a vector plus the chunk it encodes.
#[derive(Debug, Clone)]
pub struct IndexPoint {
    /// Point id, a UUID string.
    pub id: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// Chunk text.
    pub text: String,
    /// Name of the source document.
    pub source: String,
}

impl IndexPoint {
    /// Pair a chunk with its embedding under a fresh id.
    pub fn from_chunk(chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            vector,
            text: chunk.text.clone(),
            source: chunk.source.clone(),
        }
    }
}

/// One retrieved point.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Chunk text stored with the point.
    pub text: String,
    /// Source document name stored with the point; empty if absent.
    pub source: String,
    /// Score in the collection's native metric. Callers must not
    /// reinterpret or re-sort across metrics.
    pub score: f32,
}

/// Backend-neutral interface to vector storage.
///
/// `query` returns hits in the index's native order for the
/// collection's metric. Implementations never re-sort results under a
/// different metric than the collection was created with.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create a collection for vectors of the given dimensionality.
    async fn create_collection(&self, name: &str, dimension: usize, metric: Metric) -> Result<()>;

    /// Whether the collection exists.
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Delete the collection and everything in it.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Store points in the collection.
    async fn upsert(&self, collection: &str, points: Vec<IndexPoint>) -> Result<()>;

    /// Retrieve the closest points to `vector`, optionally restricted
    /// to points from one source document.
    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<SearchHit>>;

    /// Drop the collection if it exists, then create it fresh. Every
    /// evaluation cell starts from an empty collection.
    async fn reset_collection(&self, name: &str, dimension: usize, metric: Metric) -> Result<()> {
        if self.collection_exists(name).await? {
            self.delete_collection(name).await?;
        }
        self.create_collection(name, dimension, metric).await
    }
}

/// Build the collection name for one evaluation cell. Anything outside
/// ASCII alphanumerics becomes an underscore so the name is valid for
/// Qdrant regardless of the configured prefix.
pub fn collection_name(prefix: &str, policy: &str, metric: Metric) -> String {
    let raw = format!("{}_{}_{}", prefix, policy, metric.label());
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_labels() {
        assert_eq!(Metric::Cosine.label(), "cosine");
        assert_eq!(Metric::Euclid.label(), "euclid");
        assert_eq!(Metric::Dot.label(), "dot");
    }

    #[test]
    fn test_only_euclid_is_ascending() {
        assert!(Metric::Euclid.ascending());
        assert!(!Metric::Cosine.ascending());
        assert!(!Metric::Dot.ascending());
    }

    #[test]
    fn test_collection_name_sanitizes() {
        assert_eq!(
            collection_name("rag_bench", "fixed", Metric::Cosine),
            "rag_bench_fixed_cosine"
        );
        assert_eq!(
            collection_name("my-run.2", "sliding", Metric::Dot),
            "my_run_2_sliding_dot"
        );
    }

    #[test]
    fn test_point_ids_are_unique() {
        let chunk = Chunk {
            text: "內容".to_string(),
            source: "doc".to_string(),
            start: 0,
        };
        let a = IndexPoint::from_chunk(&chunk, vec![0.1]);
        let b = IndexPoint::from_chunk(&chunk, vec![0.1]);
        assert_ne!(a.id, b.id);
    }
}
