//! Vector index backed by [Qdrant](https://qdrant.tech/).
//!
//! One evaluation cell maps to one Qdrant collection created with the
//! cell's distance metric. Chunk text and source are stored as payload
//! so a hit can be reported without a second lookup.

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, Distance, Filter, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use tracing::debug;

use super::{IndexPoint, Metric, SearchHit, VectorIndex};
use crate::error::{RagBenchError, Result};

/// Vector index talking to a Qdrant instance over gRPC.
pub struct QdrantIndex {
    client: Qdrant,
}

impl QdrantIndex {
    /// Connect to the Qdrant instance at the given gRPC URL.
    pub fn connect(url: &str) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| RagBenchError::transport("qdrant", e.to_string()))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }

    fn distance(metric: Metric) -> Distance {
        match metric {
            Metric::Cosine => Distance::Cosine,
            Metric::Euclid => Distance::Euclid,
            Metric::Dot => Distance::Dot,
        }
    }

    /// Extract a string from a Qdrant payload value.
    fn extract_string(value: &QdrantValue) -> Option<String> {
        match &value.kind {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        }
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn create_collection(&self, name: &str, dimension: usize, metric: Metric) -> Result<()> {
        self.client
            .create_collection(
                CreateCollectionBuilder::new(name).vectors_config(VectorParamsBuilder::new(
                    dimension as u64,
                    Self::distance(metric),
                )),
            )
            .await
            .map_err(|e| RagBenchError::index("create", name, e.to_string()))?;

        debug!(collection = name, dimension, metric = %metric, "created qdrant collection");
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(|e| RagBenchError::index("list", name, e.to_string()))?;

        Ok(collections.collections.iter().any(|c| c.name == name))
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.client
            .delete_collection(name)
            .await
            .map_err(|e| RagBenchError::index("delete", name, e.to_string()))?;

        debug!(collection = name, "deleted qdrant collection");
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<IndexPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let count = points.len();
        let points: Vec<PointStruct> = points
            .into_iter()
            .map(|point| {
                let mut payload_map = serde_json::Map::new();
                payload_map.insert("text".to_string(), serde_json::Value::String(point.text));
                payload_map.insert("source".to_string(), serde_json::Value::String(point.source));

                // The payload is a flat object of strings, which always
                // converts.
                let payload =
                    Payload::try_from(serde_json::Value::Object(payload_map)).unwrap_or_default();

                PointStruct::new(point.id, point.vector, payload)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(|e| RagBenchError::index("upsert", collection, e.to_string()))?;

        debug!(collection, count, "upserted points to qdrant");
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        source_filter: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let mut builder =
            SearchPointsBuilder::new(collection, vector.to_vec(), limit as u64).with_payload(true);

        if let Some(source) = source_filter {
            builder = builder.filter(Filter::must([Condition::matches(
                "source",
                source.to_string(),
            )]));
        }

        let response = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| RagBenchError::index("query", collection, e.to_string()))?;

        // Hits stay in the order Qdrant returned them; the collection's
        // metric decides what "closest" means.
        let hits = response
            .result
            .into_iter()
            .map(|scored| {
                let text = scored
                    .payload
                    .get("text")
                    .and_then(Self::extract_string)
                    .unwrap_or_default();
                let source = scored
                    .payload
                    .get("source")
                    .and_then(Self::extract_string)
                    .unwrap_or_default();

                SearchHit {
                    text,
                    source,
                    score: scored.score,
                }
            })
            .collect();

        Ok(hits)
    }
}
