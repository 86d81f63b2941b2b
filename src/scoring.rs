//! Client for the remote scoring service.
//!
//! The service receives a question id and the retrieved answer text and
//! returns a numeric score. Scoring is optional; evaluation runs
//! without it when no endpoint is configured.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ScoringConfig;
use crate::error::{RagBenchError, Result};
use crate::retry::{Backoff, RetryPolicy};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    q_id: serde_json::Value,
    student_answer: &'a str,
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    /// Missing score means zero, not an error.
    #[serde(default)]
    score: f32,
}

/// HTTP client for the scoring service.
pub struct ScoringClient {
    http: reqwest::Client,
    config: ScoringConfig,
    retry: RetryPolicy,
}

impl ScoringClient {
    pub fn new(config: ScoringConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                RagBenchError::transport("scoring", format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            http,
            config,
            retry: RetryPolicy::new(3, Backoff::Exponential(Duration::from_millis(500))),
        })
    }

    /// Submit an answer and return its score.
    ///
    /// The answer is whitespace-normalized before submission: runs of
    /// whitespace collapse to single spaces and ends are trimmed.
    pub async fn submit(&self, question_id: &str, answer: &str) -> Result<f32> {
        let cleaned = normalize_whitespace(answer);
        let score = self
            .retry
            .run(|| self.post_answer(question_id, &cleaned))
            .await?;

        debug!(question_id, score, "scored answer");
        Ok(score)
    }

    async fn post_answer(&self, question_id: &str, answer: &str) -> Result<f32> {
        let request = ScoreRequest {
            q_id: question_id_value(question_id),
            student_answer: answer,
        };

        let response = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagBenchError::transport("scoring", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "unreadable body".to_string());
            return Err(RagBenchError::Api {
                service: "scoring",
                status: status.as_u16(),
                detail,
            });
        }

        let body: ScoreResponse =
            response
                .json()
                .await
                .map_err(|e| RagBenchError::MalformedResponse {
                    service: "scoring",
                    detail: e.to_string(),
                })?;

        Ok(body.score)
    }
}

/// Question ids are numeric in the standard question file; send them as
/// numbers when they parse, verbatim otherwise.
fn question_id_value(id: &str) -> serde_json::Value {
    match id.parse::<i64>() {
        Ok(n) => serde_json::Value::from(n),
        Err(_) => serde_json::Value::from(id),
    }
}

/// Collapse runs of whitespace to single spaces and trim the ends.
fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
