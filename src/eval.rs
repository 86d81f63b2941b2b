//! The evaluation runner.
//!
//! One run compares every chunking policy against every distance
//! metric. For each policy the corpus is chunked and embedded once;
//! for each (policy, metric) cell a fresh collection is built and all
//! questions are retrieved against it, one row per (question, policy,
//! metric). Failures are contained at the smallest sensible unit: a
//! document that cannot be embedded is noted and skipped, a cell that
//! cannot be built yields error rows for its questions, a question
//! that cannot be answered yields a single error row. Only a failed
//! probe aborts the run, since without the service nothing below can
//! work.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chunking::{chunk_document, Chunk, ChunkPolicy};
use crate::document::{Document, Question};
use crate::embedding::Embedder;
use crate::error::Result;
use crate::index::{collection_name, IndexPoint, Metric, SearchHit, VectorIndex};
use crate::scoring::ScoringClient;

/// Each question retrieves exactly one chunk.
const RETRIEVAL_LIMIT: usize = 1;

/// One row of the evaluation result table.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRecord {
    #[serde(rename = "q_id")]
    pub question_id: String,
    pub policy: String,
    pub metric: String,
    /// Text of the retrieved chunk; not serialized into the CSV.
    #[serde(skip_serializing)]
    pub retrieved: Option<String>,
    /// Source document of the retrieved chunk.
    pub source: Option<String>,
    /// Score in the cell's native metric.
    pub index_score: Option<f32>,
    /// Score from the scoring service, when configured.
    pub score: Option<f32>,
    /// What went wrong, for rows that failed.
    pub error: Option<String>,
}

impl EvaluationRecord {
    pub fn success(
        question: &Question,
        policy: ChunkPolicy,
        metric: Metric,
        hit: &SearchHit,
        score: Option<f32>,
    ) -> Self {
        Self {
            question_id: question.id.clone(),
            policy: policy.label().to_string(),
            metric: metric.label().to_string(),
            retrieved: Some(hit.text.clone()),
            source: Some(hit.source.clone()),
            index_score: Some(hit.score),
            score,
            error: None,
        }
    }

    /// Retrieval ran but found nothing. Nothing is submitted for
    /// scoring; the row simply stays empty.
    pub fn no_result(question: &Question, policy: ChunkPolicy, metric: Metric) -> Self {
        Self {
            question_id: question.id.clone(),
            policy: policy.label().to_string(),
            metric: metric.label().to_string(),
            retrieved: None,
            source: None,
            index_score: None,
            score: None,
            error: None,
        }
    }

    pub fn failed(
        question: &Question,
        policy: ChunkPolicy,
        metric: Metric,
        error: impl std::fmt::Display,
    ) -> Self {
        Self {
            question_id: question.id.clone(),
            policy: policy.label().to_string(),
            metric: metric.label().to_string(),
            retrieved: None,
            source: None,
            index_score: None,
            score: None,
            error: Some(error.to_string()),
        }
    }
}

/// A document that had to be skipped during ingest.
#[derive(Debug, Clone)]
pub struct IngestNote {
    pub policy: String,
    pub document: String,
    pub error: String,
}

/// Everything a finished evaluation run produced.
#[derive(Debug)]
pub struct EvaluationRun {
    pub records: Vec<EvaluationRecord>,
    pub notes: Vec<IngestNote>,
    /// Vector dimensionality reported by the probe.
    pub dimension: usize,
    pub elapsed: Duration,
}

/// What a standalone ingest produced.
#[derive(Debug)]
pub struct IngestSummary {
    pub collection: String,
    pub documents: usize,
    pub points: usize,
    pub notes: Vec<IngestNote>,
}

/// Runs the policy-by-metric comparison.
pub struct Evaluator<'a> {
    embedder: &'a dyn Embedder,
    index: &'a dyn VectorIndex,
    scoring: Option<&'a ScoringClient>,
    policies: Vec<ChunkPolicy>,
    collection_prefix: String,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        embedder: &'a dyn Embedder,
        index: &'a dyn VectorIndex,
        scoring: Option<&'a ScoringClient>,
        policies: Vec<ChunkPolicy>,
        collection_prefix: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            index,
            scoring,
            policies,
            collection_prefix: collection_prefix.into(),
        }
    }

    /// Run the full comparison and collect one record per (question,
    /// policy, metric).
    pub async fn run(
        &self,
        documents: &[Document],
        questions: &[Question],
    ) -> Result<EvaluationRun> {
        let started = Instant::now();

        let dimension = self.embedder.probe().await?;
        info!(dimension, "embedding service ready");

        let mut notes = Vec::new();
        let mut records = Vec::new();

        for policy in &self.policies {
            let points =
                embed_documents(self.embedder, *policy, documents, &mut notes).await;
            info!(policy = %policy, points = points.len(), "corpus chunked and embedded");

            for metric in Metric::all() {
                let collection =
                    collection_name(&self.collection_prefix, policy.label(), metric);

                if let Err(err) = self.prepare_cell(&collection, dimension, metric, &points).await {
                    warn!(
                        collection = collection.as_str(),
                        error = %err,
                        "cell setup failed, recording error rows"
                    );
                    for question in questions {
                        records.push(EvaluationRecord::failed(question, *policy, metric, &err));
                    }
                    continue;
                }

                for question in questions {
                    records.push(
                        self.evaluate_question(&collection, *policy, metric, question)
                            .await,
                    );
                }
            }
        }

        Ok(EvaluationRun {
            records,
            notes,
            dimension,
            elapsed: started.elapsed(),
        })
    }

    async fn prepare_cell(
        &self,
        collection: &str,
        dimension: usize,
        metric: Metric,
        points: &[IndexPoint],
    ) -> Result<()> {
        self.index
            .reset_collection(collection, dimension, metric)
            .await?;
        self.index.upsert(collection, points.to_vec()).await
    }

    /// Evaluate one question against one cell. Failures never abort the
    /// run; they become the row's error.
    async fn evaluate_question(
        &self,
        collection: &str,
        policy: ChunkPolicy,
        metric: Metric,
        question: &Question,
    ) -> EvaluationRecord {
        let hit = match self.retrieve_top(collection, question).await {
            Ok(Some(hit)) => hit,
            Ok(None) => return EvaluationRecord::no_result(question, policy, metric),
            Err(err) => {
                warn!(
                    question = question.id.as_str(),
                    collection,
                    error = %err,
                    "question failed"
                );
                return EvaluationRecord::failed(question, policy, metric, err);
            }
        };

        let record = match self.scoring {
            Some(scoring) => match scoring.submit(&question.id, &hit.text).await {
                Ok(score) => EvaluationRecord::success(question, policy, metric, &hit, Some(score)),
                Err(err) => {
                    warn!(
                        question = question.id.as_str(),
                        error = %err,
                        "scoring failed"
                    );
                    let mut record =
                        EvaluationRecord::success(question, policy, metric, &hit, None);
                    record.error = Some(err.to_string());
                    record
                }
            },
            None => EvaluationRecord::success(question, policy, metric, &hit, None),
        };

        debug!(
            question = question.id.as_str(),
            policy = policy.label(),
            metric = metric.label(),
            score = record.score,
            "evaluated question"
        );
        record
    }

    async fn retrieve_top(&self, collection: &str, question: &Question) -> Result<Option<SearchHit>> {
        let vector = self.embedder.embed_one(&question.text).await?;
        let mut hits = self
            .index
            .query(collection, &vector, RETRIEVAL_LIMIT, None)
            .await?;

        Ok(if hits.is_empty() {
            None
        } else {
            Some(hits.remove(0))
        })
    }
}

/// Chunk and embed the corpus under one policy. A document whose
/// embedding fails is recorded and skipped; the rest of the corpus
/// still ingests.
async fn embed_documents(
    embedder: &dyn Embedder,
    policy: ChunkPolicy,
    documents: &[Document],
    notes: &mut Vec<IngestNote>,
) -> Vec<IndexPoint> {
    let mut points = Vec::new();

    for document in documents {
        let chunks = chunk_document(policy, document);
        if chunks.is_empty() {
            continue;
        }

        match embed_chunks(embedder, &chunks).await {
            Ok(mut chunk_points) => points.append(&mut chunk_points),
            Err(err) => {
                warn!(
                    policy = %policy,
                    document = document.name.as_str(),
                    error = %err,
                    "skipping document"
                );
                notes.push(IngestNote {
                    policy: policy.label().to_string(),
                    document: document.name.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    points
}

async fn embed_chunks(embedder: &dyn Embedder, chunks: &[Chunk]) -> Result<Vec<IndexPoint>> {
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed(&texts).await?;

    Ok(chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| IndexPoint::from_chunk(chunk, vector))
        .collect())
}

/// Build one collection for one (policy, metric) pair outside a full
/// evaluation run, for the chat and query commands.
pub async fn ingest_collection(
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    policy: ChunkPolicy,
    metric: Metric,
    collection: &str,
    documents: &[Document],
) -> Result<IngestSummary> {
    let dimension = embedder.probe().await?;

    let mut notes = Vec::new();
    let points = embed_documents(embedder, policy, documents, &mut notes).await;
    let point_count = points.len();

    index.reset_collection(collection, dimension, metric).await?;
    index.upsert(collection, points).await?;

    info!(
        collection,
        documents = documents.len(),
        points = point_count,
        "ingested corpus"
    );

    Ok(IngestSummary {
        collection: collection.to_string(),
        documents: documents.len(),
        points: point_count,
        notes,
    })
}
