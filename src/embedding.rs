//! Embedding service integration.
//!
//! The remote service accepts a JSON batch of texts and returns one
//! vector per text. [`EmbeddingClient`] slices large inputs into
//! batches, retries each batch on transient failures, and verifies
//! that the service keeps its contract: one vector per input, all with
//! the same dimensionality. The [`Embedder`] trait is the seam the
//! pipeline depends on, so tests can run without the service.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::error::{RagBenchError, Result};
use crate::retry::RetryPolicy;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Text sent by `probe` to verify the service answers and to learn the
/// vector dimensionality before any real work.
const PROBE_TEXT: &str = "test";

/// Anything that turns texts into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed every text, preserving order. The call either returns one
    /// vector per input or fails; a shorter result is never returned.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let texts = [text.to_string()];
        let mut vectors = self.embed(&texts).await?;
        vectors.pop().ok_or_else(|| RagBenchError::MalformedResponse {
            service: "embedding",
            detail: "no vector returned for single text".to_string(),
        })
    }

    /// Embed a trivial text to verify the backend works and learn the
    /// vector dimensionality.
    async fn probe(&self) -> Result<usize> {
        let vector = self.embed_one(PROBE_TEXT).await?;
        Ok(vector.len())
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    texts: &'a [String],
    normalize: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    batch_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

/// HTTP client for the embedding service.
pub struct EmbeddingClient {
    http: reqwest::Client,
    config: EmbeddingConfig,
    retry: RetryPolicy,
    /// Dimensionality of the first vector ever returned; zero until then.
    dimension: AtomicUsize,
}

impl EmbeddingClient {
    /// Create a client with the default retry schedule.
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        Self::with_retry(config, RetryPolicy::embedding_default())
    }

    /// Create a client with an explicit retry schedule.
    pub fn with_retry(config: EmbeddingConfig, retry: RetryPolicy) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                RagBenchError::transport("embedding", format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            config,
            retry,
            dimension: AtomicUsize::new(0),
        })
    }

    /// Vector dimensionality observed so far, if any text has been
    /// embedded.
    pub fn dimension(&self) -> Option<usize> {
        match self.dimension.load(Ordering::Relaxed) {
            0 => None,
            dim => Some(dim),
        }
    }

    async fn post_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            texts,
            normalize: self.config.normalize,
            task_description: if self.config.task_description.is_empty() {
                None
            } else {
                Some(&self.config.task_description)
            },
            batch_size: Some(self.config.batch_size),
        };

        let response = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagBenchError::transport("embedding", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "unreadable body".to_string());
            return Err(RagBenchError::Api {
                service: "embedding",
                status: status.as_u16(),
                detail,
            });
        }

        let body: EmbeddingResponse =
            response
                .json()
                .await
                .map_err(|e| RagBenchError::MalformedResponse {
                    service: "embedding",
                    detail: e.to_string(),
                })?;

        if body.embeddings.len() != texts.len() {
            return Err(RagBenchError::MalformedResponse {
                service: "embedding",
                detail: format!(
                    "asked for {} vectors, got {}",
                    texts.len(),
                    body.embeddings.len()
                ),
            });
        }

        for vector in &body.embeddings {
            self.check_dimension(vector.len())?;
        }

        Ok(body.embeddings)
    }

    /// Record the dimensionality of the first vector and reject any
    /// later vector that disagrees with it.
    fn check_dimension(&self, got: usize) -> Result<()> {
        if got == 0 {
            return Err(RagBenchError::MalformedResponse {
                service: "embedding",
                detail: "zero-length embedding vector".to_string(),
            });
        }

        match self
            .dimension
            .compare_exchange(0, got, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => Ok(()),
            Err(expected) if expected == got => Ok(()),
            Err(expected) => Err(RagBenchError::DimensionMismatch { expected, got }),
        }
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let batch_size = self.config.batch_size.max(1);
        let mut vectors = Vec::with_capacity(texts.len());

        for (batch_index, batch) in texts.chunks(batch_size).enumerate() {
            let attempts = AtomicU32::new(0);
            let batch_vectors = self
                .retry
                .run(|| {
                    attempts.fetch_add(1, Ordering::Relaxed);
                    self.post_batch(batch)
                })
                .await
                .map_err(|err| {
                    // A retryable error escaping the loop means the
                    // budget is spent; contract violations pass through
                    // under their own name.
                    if err.is_retryable() {
                        RagBenchError::EmbeddingBatchFailed {
                            batch: batch_index,
                            texts: batch.len(),
                            attempts: attempts.load(Ordering::Relaxed),
                            last: err.to_string(),
                        }
                    } else {
                        err
                    }
                })?;

            debug!(batch = batch_index, texts = batch.len(), "embedded batch");
            vectors.extend(batch_vectors);
        }

        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> EmbeddingClient {
        let config = EmbeddingConfig {
            api_url: "http://localhost:9".to_string(),
            api_key: "test-key".to_string(),
            ..Default::default()
        };
        EmbeddingClient::new(config).unwrap()
    }

    #[test]
    fn test_request_includes_optional_fields() {
        let texts = vec!["人工智慧很有趣".to_string()];
        let request = EmbeddingRequest {
            texts: &texts,
            normalize: true,
            task_description: Some("檢索技術文件"),
            batch_size: Some(32),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["texts"][0], "人工智慧很有趣");
        assert_eq!(json["normalize"], true);
        assert_eq!(json["task_description"], "檢索技術文件");
        assert_eq!(json["batch_size"], 32);
    }

    #[test]
    fn test_request_omits_empty_task_description() {
        let texts = vec!["test".to_string()];
        let request = EmbeddingRequest {
            texts: &texts,
            normalize: false,
            task_description: None,
            batch_size: None,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("task_description").is_none());
        assert!(json.get("batch_size").is_none());
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"embeddings": [[0.1, 0.2], [0.3, 0.4]]}"#;
        let response: EmbeddingResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.embeddings.len(), 2);
        assert_eq!(response.embeddings[0], vec![0.1, 0.2]);
    }

    #[test]
    fn test_dimension_is_captured_once() {
        let client = test_client();
        assert_eq!(client.dimension(), None);

        client.check_dimension(1024).unwrap();
        assert_eq!(client.dimension(), Some(1024));

        client.check_dimension(1024).unwrap();

        let err = client.check_dimension(512).unwrap_err();
        assert!(matches!(
            err,
            RagBenchError::DimensionMismatch {
                expected: 1024,
                got: 512
            }
        ));
    }

    #[test]
    fn test_zero_length_vector_is_rejected() {
        let client = test_client();
        let err = client.check_dimension(0).unwrap_err();
        assert!(matches!(err, RagBenchError::MalformedResponse { .. }));
        assert_eq!(client.dimension(), None);
    }
}
