//! RAG Bench - a chunking and retrieval evaluation pipeline.
//!
//! This library benchmarks how chunking strategy and distance metric
//! affect retrieval quality over a plain-text corpus. Every run chunks
//! the corpus under three policies, embeds the chunks through an HTTP
//! embedding service, and retrieves every evaluation question against
//! a fresh vector collection per (policy, metric) cell.
//!
//! # Overview
//!
//! One evaluation run:
//! 1. Probes the embedding service for its vector dimensionality
//! 2. Chunks and embeds the corpus once per policy
//! 3. Builds one collection per (policy, metric) cell and retrieves
//!    every question top-1 against it
//! 4. Optionally submits each retrieved chunk to a scoring service
//! 5. Writes a CSV record table and a Markdown summary report
//!
//! Scores are native to their metric. Cells are compared across
//! metrics by rank-1 selection frequency, never by score magnitude.
//!
//! # Quick Start
//!
//! ```no_run
//! use rag_bench::{
//!     chunking::ChunkPolicy,
//!     config::Config,
//!     document::{load_corpus, load_questions},
//!     embedding::EmbeddingClient,
//!     eval::Evaluator,
//!     index::QdrantIndex,
//!     report,
//! };
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Load configuration
//!     let config = Config::load()?;
//!     config.validate()?;
//!
//!     // Load the corpus and the questions
//!     let documents = load_corpus(Path::new("data/docs"))?;
//!     let questions = load_questions(Path::new("data/questions.csv"))?;
//!
//!     // Create service clients
//!     let embedder = EmbeddingClient::new(config.embedding.clone())?;
//!     let index = QdrantIndex::connect(&config.qdrant.url)?;
//!
//!     // Run the full policy-by-metric comparison
//!     let policies = ChunkPolicy::standard_set(&config.chunking);
//!     let evaluator = Evaluator::new(
//!         &embedder,
//!         &index,
//!         None,
//!         policies,
//!         config.qdrant.collection_prefix.clone(),
//!     );
//!     let run = evaluator.run(&documents, &questions).await?;
//!
//!     // Write the report artifacts
//!     let summary = report::summarize(&run.records);
//!     report::write_records_csv(std::fs::File::create("results.csv")?, &run.records)?;
//!     std::fs::write("report.md", report::render_markdown(&run, &summary))?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **ChunkPolicy**: the three chunking strategies under comparison
//! - **EmbeddingClient**: batching HTTP client for the embedding service
//! - **VectorIndex**: storage abstraction with Qdrant and in-memory backends
//! - **Evaluator**: the policy-by-metric comparison loop
//! - **Reporter**: CSV record table and Markdown summary
//! - **ChatPipeline**: history-aware retrieval chat over one collection

pub mod chat;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod eval;
pub mod index;
pub mod llm;
pub mod report;
pub mod retry;
pub mod scoring;

// Re-export commonly used types
pub use chat::{ChatPipeline, ConversationContext};
pub use chunking::ChunkPolicy;
pub use config::Config;
pub use document::{Document, Question};
pub use embedding::{Embedder, EmbeddingClient};
pub use error::{RagBenchError, Result};
pub use eval::Evaluator;
pub use index::{MemoryIndex, Metric, QdrantIndex, VectorIndex};
pub use llm::LlmClient;
pub use scoring::ScoringClient;
