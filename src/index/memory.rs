//! In-memory vector index.
//!
//! Brute-force scan over stored points, used by tests and by runs
//! where standing up Qdrant is not worth it. Scores are computed in
//! the collection's metric and sorted in that metric's native order,
//! matching what Qdrant returns.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{IndexPoint, Metric, SearchHit, VectorIndex};
use crate::error::{RagBenchError, Result};

struct CollectionState {
    dimension: usize,
    metric: Metric,
    points: Vec<IndexPoint>,
}

/// Vector index backed by a process-local map.
#[derive(Default)]
pub struct MemoryIndex {
    collections: RwLock<HashMap<String, CollectionState>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn create_collection(&self, name: &str, dimension: usize, metric: Metric) -> Result<()> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Err(RagBenchError::index(
                "create",
                name,
                "collection already exists",
            ));
        }

        collections.insert(
            name.to_string(),
            CollectionState {
                dimension,
                metric,
                points: Vec::new(),
            },
        );
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        match collections.remove(name) {
            Some(_) => Ok(()),
            None => Err(RagBenchError::index(
                "delete",
                name,
                "collection does not exist",
            )),
        }
    }

    async fn upsert(&self, collection: &str, points: Vec<IndexPoint>) -> Result<()> {
        let mut collections = self.collections.write().await;
        let state = collections.get_mut(collection).ok_or_else(|| {
            RagBenchError::index("upsert", collection, "collection does not exist")
        })?;

        for point in points {
            if point.vector.len() != state.dimension {
                return Err(RagBenchError::index(
                    "upsert",
                    collection,
                    format!(
                        "expected dimension {}, got {}",
                        state.dimension,
                        point.vector.len()
                    ),
                ));
            }

            match state.points.iter_mut().find(|p| p.id == point.id) {
                Some(existing) => *existing = point,
                None => state.points.push(point),
            }
        }

        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let collections = self.collections.read().await;
        let state = collections
            .get(collection)
            .ok_or_else(|| RagBenchError::index("query", collection, "collection does not exist"))?;

        if vector.len() != state.dimension {
            return Err(RagBenchError::index(
                "query",
                collection,
                format!("expected dimension {}, got {}", state.dimension, vector.len()),
            ));
        }

        let mut hits: Vec<SearchHit> = state
            .points
            .iter()
            .filter(|p| source_filter.is_none_or(|source| p.source == source))
            .map(|p| SearchHit {
                text: p.text.clone(),
                source: p.source.clone(),
                score: score(state.metric, vector, &p.vector),
            })
            .collect();

        if state.metric.ascending() {
            hits.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));
        } else {
            hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        }
        hits.truncate(limit);

        Ok(hits)
    }
}

fn score(metric: Metric, query: &[f32], point: &[f32]) -> f32 {
    match metric {
        Metric::Cosine => cosine_similarity(query, point),
        Metric::Euclid => euclidean_distance(query, point),
        Metric::Dot => dot_product(query, point),
    }
}

fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot_product(a, b) / (norm_a * norm_b)
}

fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, vector: Vec<f32>, text: &str, source: &str) -> IndexPoint {
        IndexPoint {
            id: id.to_string(),
            vector,
            text: text.to_string(),
            source: source.to_string(),
        }
    }

    #[tokio::test]
    async fn test_collection_lifecycle() {
        let index = MemoryIndex::new();
        assert!(!index.collection_exists("c").await.unwrap());

        index.create_collection("c", 2, Metric::Cosine).await.unwrap();
        assert!(index.collection_exists("c").await.unwrap());

        // Creating twice is an error, deleting makes room again
        assert!(index.create_collection("c", 2, Metric::Cosine).await.is_err());
        index.delete_collection("c").await.unwrap();
        assert!(!index.collection_exists("c").await.unwrap());
        assert!(index.delete_collection("c").await.is_err());
    }

    #[tokio::test]
    async fn test_reset_collection_clears_points() {
        let index = MemoryIndex::new();
        index.reset_collection("c", 2, Metric::Cosine).await.unwrap();
        index
            .upsert("c", vec![point("a", vec![1.0, 0.0], "甲", "doc")])
            .await
            .unwrap();

        index.reset_collection("c", 2, Metric::Cosine).await.unwrap();
        let hits = index.query("c", &[1.0, 0.0], 10, None).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_cosine_query_ranks_closest_first() {
        let index = MemoryIndex::new();
        index.create_collection("c", 2, Metric::Cosine).await.unwrap();
        index
            .upsert(
                "c",
                vec![
                    point("a", vec![1.0, 0.0], "甲", "doc"),
                    point("b", vec![0.0, 1.0], "乙", "doc"),
                    point("m", vec![0.7, 0.7], "丙", "doc"),
                ],
            )
            .await
            .unwrap();

        let hits = index.query("c", &[1.0, 0.1], 2, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "甲");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_exact_match_query_returns_its_own_document() {
        let texts = [
            "人工智慧很有趣",
            "深度學習的應用",
            "機器學習初探",
            "今天天氣真好",
            "gta6延期幾次",
        ];
        let vectors: [Vec<f32>; 5] = [
            vec![0.9, 0.1, 0.1],
            vec![0.1, 0.9, 0.2],
            vec![0.2, 0.8, 0.1],
            vec![0.1, 0.1, 0.9],
            vec![0.5, 0.1, 0.7],
        ];

        let index = MemoryIndex::new();
        index.create_collection("c", 3, Metric::Cosine).await.unwrap();
        let points = texts
            .iter()
            .zip(&vectors)
            .enumerate()
            .map(|(i, (text, vector))| {
                point(&format!("p{i}"), vector.clone(), text, &format!("doc_{i}.txt"))
            })
            .collect();
        index.upsert("c", points).await.unwrap();

        // Querying with document 0's own vector must return document 0
        // at rank 1 with a perfect cosine score.
        let hits = index.query("c", &vectors[0], 1, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "人工智慧很有趣");
        assert_eq!(hits[0].source, "doc_0.txt");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_euclid_query_ranks_smallest_distance_first() {
        let index = MemoryIndex::new();
        index.create_collection("c", 2, Metric::Euclid).await.unwrap();
        index
            .upsert(
                "c",
                vec![
                    point("far", vec![10.0, 10.0], "遠", "doc"),
                    point("near", vec![1.0, 1.0], "近", "doc"),
                ],
            )
            .await
            .unwrap();

        let hits = index.query("c", &[1.0, 1.2], 2, None).await.unwrap();
        assert_eq!(hits[0].text, "近");
        assert!(hits[0].score < hits[1].score);
    }

    #[tokio::test]
    async fn test_dot_query_ranks_largest_product_first() {
        let index = MemoryIndex::new();
        index.create_collection("c", 2, Metric::Dot).await.unwrap();
        index
            .upsert(
                "c",
                vec![
                    point("small", vec![0.1, 0.1], "小", "doc"),
                    point("large", vec![2.0, 2.0], "大", "doc"),
                ],
            )
            .await
            .unwrap();

        let hits = index.query("c", &[1.0, 1.0], 2, None).await.unwrap();
        assert_eq!(hits[0].text, "大");
    }

    #[tokio::test]
    async fn test_source_filter_restricts_hits() {
        let index = MemoryIndex::new();
        index.create_collection("c", 2, Metric::Cosine).await.unwrap();
        index
            .upsert(
                "c",
                vec![
                    point("a", vec![1.0, 0.0], "甲", "manual"),
                    point("b", vec![1.0, 0.0], "乙", "faq"),
                ],
            )
            .await
            .unwrap();

        let hits = index.query("c", &[1.0, 0.0], 10, Some("faq")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "faq");
    }

    #[tokio::test]
    async fn test_limit_truncates() {
        let index = MemoryIndex::new();
        index.create_collection("c", 1, Metric::Cosine).await.unwrap();
        let points = (0..5)
            .map(|i| point(&i.to_string(), vec![1.0], "文", "doc"))
            .collect();
        index.upsert("c", points).await.unwrap();

        let hits = index.query("c", &[1.0], 3, None).await.unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn test_upsert_replaces_matching_id() {
        let index = MemoryIndex::new();
        index.create_collection("c", 1, Metric::Cosine).await.unwrap();
        index
            .upsert("c", vec![point("a", vec![1.0], "舊", "doc")])
            .await
            .unwrap();
        index
            .upsert("c", vec![point("a", vec![1.0], "新", "doc")])
            .await
            .unwrap();

        let hits = index.query("c", &[1.0], 10, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "新");
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_an_error() {
        let index = MemoryIndex::new();
        index.create_collection("c", 2, Metric::Cosine).await.unwrap();

        let err = index
            .upsert("c", vec![point("a", vec![1.0, 2.0, 3.0], "甲", "doc")])
            .await
            .unwrap_err();
        assert!(matches!(err, RagBenchError::Index { .. }));

        let err = index.query("c", &[1.0], 1, None).await.unwrap_err();
        assert!(matches!(err, RagBenchError::Index { .. }));
    }

    #[tokio::test]
    async fn test_query_missing_collection_is_an_error() {
        let index = MemoryIndex::new();
        let err = index.query("missing", &[1.0], 1, None).await.unwrap_err();
        assert!(matches!(err, RagBenchError::Index { .. }));
    }

    #[test]
    fn test_cosine_similarity_bounds() {
        let a = [1.0, 0.0];
        assert!((cosine_similarity(&a, &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_euclidean_distance_of_identical_vectors_is_zero() {
        let a = [0.3, 0.4];
        assert_eq!(euclidean_distance(&a, &a), 0.0);
        assert!((euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-6);
    }
}
