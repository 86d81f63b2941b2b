//! RAG Bench CLI
//!
//! Compares chunking policies across distance metrics and reports
//! retrieval quality per (policy, metric) cell.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rag_bench::{
    chat::ChatPipeline,
    chunking::ChunkPolicy,
    config::{ChunkingConfig, Config},
    document::{load_chat_prompts, load_corpus, load_questions},
    embedding::{Embedder, EmbeddingClient},
    eval::{ingest_collection, Evaluator},
    index::{collection_name, Metric, QdrantIndex, VectorIndex},
    llm::LlmClient,
    report,
    scoring::ScoringClient,
};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// RAG Bench - chunking and retrieval evaluation
#[derive(Parser)]
#[command(name = "rag-bench")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full policy-by-metric evaluation
    Evaluate {
        /// Directory with the corpus text files
        #[arg(short, long, default_value = "data/docs")]
        corpus: PathBuf,

        /// CSV file with q_id and questions columns
        #[arg(short, long, default_value = "data/questions.csv")]
        questions: PathBuf,

        /// Directory the CSV and Markdown artifacts are written to
        #[arg(short, long, default_value = "results")]
        output: PathBuf,
    },

    /// Chunk and embed the corpus into one collection
    Ingest {
        /// Directory with the corpus text files
        #[arg(short, long, default_value = "data/docs")]
        corpus: PathBuf,

        /// Chunking policy for the collection
        #[arg(long, value_enum, default_value_t = PolicyArg::Semantic)]
        policy: PolicyArg,

        /// Distance metric for the collection
        #[arg(long, value_enum, default_value_t = MetricArg::Cosine)]
        metric: MetricArg,
    },

    /// Retrieve chunks for a single question
    Query {
        /// The question text
        question: String,

        /// Chunking policy of the target collection
        #[arg(long, value_enum, default_value_t = PolicyArg::Semantic)]
        policy: PolicyArg,

        /// Distance metric of the target collection
        #[arg(long, value_enum, default_value_t = MetricArg::Cosine)]
        metric: MetricArg,

        /// Number of chunks to retrieve
        #[arg(short = 'k', long, default_value_t = 3)]
        limit: usize,

        /// Only return chunks from this source document
        #[arg(long)]
        source: Option<String>,
    },

    /// Run a scripted multi-turn chat over an ingested collection
    Chat {
        /// CSV file with conversation_id and questions columns
        script: PathBuf,

        /// Output CSV for the transcript
        #[arg(short, long, default_value = "chat_transcript.csv")]
        output: PathBuf,

        /// Chunking policy of the target collection
        #[arg(long, value_enum, default_value_t = PolicyArg::Semantic)]
        policy: PolicyArg,

        /// Distance metric of the target collection
        #[arg(long, value_enum, default_value_t = MetricArg::Cosine)]
        metric: MetricArg,
    },

    /// Test the embedding service connection
    Probe,
}

/// Chunking policy selector for the single-collection commands.
#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Fixed,
    Sliding,
    Semantic,
}

impl PolicyArg {
    fn to_policy(self, config: &ChunkingConfig) -> ChunkPolicy {
        match self {
            PolicyArg::Fixed => ChunkPolicy::FixedSize {
                size: config.fixed_size,
            },
            PolicyArg::Sliding => ChunkPolicy::SlidingWindow {
                size: config.window_size,
                overlap: config.window_overlap,
            },
            PolicyArg::Semantic => ChunkPolicy::Semantic {
                max_len: config.semantic_max_len,
            },
        }
    }
}

/// Distance metric selector for the single-collection commands.
#[derive(Clone, Copy, ValueEnum)]
enum MetricArg {
    Cosine,
    Euclid,
    Dot,
}

impl MetricArg {
    fn to_metric(self) -> Metric {
        match self {
            MetricArg::Cosine => Metric::Cosine,
            MetricArg::Euclid => Metric::Euclid,
            MetricArg::Dot => Metric::Dot,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rag_bench=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Evaluate {
            corpus,
            questions,
            output,
        } => cmd_evaluate(corpus, questions, output).await,
        Commands::Ingest {
            corpus,
            policy,
            metric,
        } => cmd_ingest(corpus, policy, metric).await,
        Commands::Query {
            question,
            policy,
            metric,
            limit,
            source,
        } => cmd_query(question, policy, metric, limit, source).await,
        Commands::Chat {
            script,
            output,
            policy,
            metric,
        } => cmd_chat(script, output, policy, metric).await,
        Commands::Probe => cmd_probe().await,
    }
}

async fn cmd_evaluate(
    corpus_dir: PathBuf,
    questions_path: PathBuf,
    output_dir: PathBuf,
) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let documents = load_corpus(&corpus_dir).context("Failed to load corpus")?;
    let questions = load_questions(&questions_path).context("Failed to load questions")?;

    println!("Corpus:     {} documents", documents.len());
    println!("Questions:  {}", questions.len());
    println!("Embedding:  {}", config.embedding.api_url);
    println!("Qdrant:     {}", config.qdrant.url);
    println!(
        "Scoring:    {}",
        if config.scoring.enabled() {
            config.scoring.api_url.as_str()
        } else {
            "disabled"
        }
    );

    let embedder = EmbeddingClient::new(config.embedding.clone())?;
    let index = QdrantIndex::connect(&config.qdrant.url)?;
    let scoring = if config.scoring.enabled() {
        Some(ScoringClient::new(config.scoring.clone())?)
    } else {
        None
    };

    let policies = ChunkPolicy::standard_set(&config.chunking);
    println!(
        "\nRunning {} policies x {} metrics...",
        policies.len(),
        Metric::all().len()
    );
    println!("{}", "─".repeat(60));

    let evaluator = Evaluator::new(
        &embedder,
        &index,
        scoring.as_ref(),
        policies,
        config.qdrant.collection_prefix.clone(),
    );
    let run = evaluator
        .run(&documents, &questions)
        .await
        .context("Evaluation failed")?;

    let summary = report::summarize(&run.records);

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create '{}'", output_dir.display()))?;
    let csv_path = output_dir.join("results.csv");
    let report_path = output_dir.join("report.md");

    let csv_file = std::fs::File::create(&csv_path)
        .with_context(|| format!("Failed to create '{}'", csv_path.display()))?;
    report::write_records_csv(csv_file, &run.records).context("Failed to write results CSV")?;
    std::fs::write(&report_path, report::render_markdown(&run, &summary))
        .with_context(|| format!("Failed to write '{}'", report_path.display()))?;

    println!("\nMean score by cell:");
    for cell in &summary.cells {
        let mean = cell
            .mean_score
            .map_or_else(|| "-".to_string(), |m| format!("{m:.4}"));
        println!(
            "  {:<10} {:<8} {:>8}   ({} records, {} errors)",
            cell.policy, cell.metric, mean, cell.records, cell.errors
        );
    }

    if !run.notes.is_empty() {
        println!("\nSkipped documents:");
        for note in &run.notes {
            println!("  [{}] {}: {}", note.policy, note.document, note.error);
        }
    }

    println!("{}", "─".repeat(60));
    println!("Recorded {} rows in {:.2?}", run.records.len(), run.elapsed);
    println!("\nResults saved to: {}", csv_path.display());
    println!("Report saved to:  {}", report_path.display());

    Ok(())
}

async fn cmd_ingest(corpus_dir: PathBuf, policy: PolicyArg, metric: MetricArg) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let documents = load_corpus(&corpus_dir).context("Failed to load corpus")?;

    let policy = policy.to_policy(&config.chunking);
    let metric = metric.to_metric();
    let collection = collection_name(&config.qdrant.collection_prefix, policy.label(), metric);

    println!(
        "Ingesting {} documents into '{}'...",
        documents.len(),
        collection
    );

    let start = Instant::now();
    let embedder = EmbeddingClient::new(config.embedding.clone())?;
    let index = QdrantIndex::connect(&config.qdrant.url)?;

    let summary = ingest_collection(&embedder, &index, policy, metric, &collection, &documents)
        .await
        .context("Ingest failed")?;

    println!("\nCollection built:");
    println!("  Documents:  {}", summary.documents);
    println!("  Points:     {}", summary.points);
    println!("  Time:       {:.2?}", start.elapsed());

    for note in &summary.notes {
        println!("  Skipped {}: {}", note.document, note.error);
    }

    Ok(())
}

async fn cmd_query(
    question: String,
    policy: PolicyArg,
    metric: MetricArg,
    limit: usize,
    source: Option<String>,
) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let policy = policy.to_policy(&config.chunking);
    let metric = metric.to_metric();
    let collection = collection_name(&config.qdrant.collection_prefix, policy.label(), metric);

    let embedder = EmbeddingClient::new(config.embedding.clone())?;
    let index = QdrantIndex::connect(&config.qdrant.url)?;

    if !index.collection_exists(&collection).await? {
        anyhow::bail!(
            "Collection '{}' not found. Run 'ingest --policy {} --metric {}' first.",
            collection,
            policy.label(),
            metric
        );
    }

    println!("Searching for: \"{}\"", question);
    println!("Collection:    {}", collection);
    println!();

    let start = Instant::now();
    let vector = embedder.embed_one(&question).await?;
    let hits = index
        .query(&collection, &vector, limit, source.as_deref())
        .await?;
    let elapsed = start.elapsed();

    if hits.is_empty() {
        println!("No matching chunks found.");
    } else {
        println!("{}", "─".repeat(60));
        for (i, hit) in hits.iter().enumerate() {
            println!("{:>2}. [{}] score {:.4}", i + 1, hit.source, hit.score);

            let preview: String = hit.text.chars().take(160).collect();
            for line in preview.lines().take(2) {
                println!("    {}", line);
            }
            if hit.text.chars().count() > 160 {
                println!("    ...");
            }
            println!();
        }
        println!("{}", "─".repeat(60));
        println!("Found {} chunks in {:.2?}", hits.len(), elapsed);
    }

    Ok(())
}

async fn cmd_chat(
    script: PathBuf,
    output: PathBuf,
    policy: PolicyArg,
    metric: MetricArg,
) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    config.validate_llm().context("Invalid LLM configuration")?;

    let prompts = load_chat_prompts(&script).context("Failed to load chat script")?;
    if prompts.is_empty() {
        anyhow::bail!("Chat script '{}' contains no rows.", script.display());
    }

    let policy = policy.to_policy(&config.chunking);
    let metric = metric.to_metric();
    let collection = collection_name(&config.qdrant.collection_prefix, policy.label(), metric);

    let embedder = EmbeddingClient::new(config.embedding.clone())?;
    let index = QdrantIndex::connect(&config.qdrant.url)?;
    let llm = LlmClient::new(config.llm.clone());

    if !index.collection_exists(&collection).await? {
        anyhow::bail!("Collection '{}' not found. Run 'ingest' first.", collection);
    }

    println!(
        "Running {} scripted turns against '{}'",
        prompts.len(),
        collection
    );
    println!("Using model: {}", config.llm.model);
    println!("{}", "─".repeat(60));

    let start = Instant::now();
    let pipeline = ChatPipeline::new(&embedder, &index, &llm, collection);
    let records = pipeline
        .run_script(&prompts)
        .await
        .context("Chat run failed")?;

    for record in &records {
        println!("[{}] {}", record.conversation_id, record.question);
        let preview: String = record.answer.chars().take(60).collect();
        println!("    {} (source: {})", preview, record.source);
    }

    println!("{}", "─".repeat(60));
    println!("Answered {} turns in {:.2?}", records.len(), start.elapsed());

    let file = std::fs::File::create(&output)
        .with_context(|| format!("Failed to create '{}'", output.display()))?;
    report::write_chat_csv(file, &records).context("Failed to write transcript")?;
    println!("Transcript saved to: {}", output.display());

    Ok(())
}

async fn cmd_probe() -> Result<()> {
    println!("Probing the embedding service...\n");

    let config = Config::load().context("Failed to load configuration")?;

    println!("Configuration:");
    println!("  Embedding: {}", config.embedding.api_url);
    println!("  Qdrant:    {}", config.qdrant.url);
    println!(
        "  API Key:   {}...",
        &config.embedding.api_key[..config.embedding.api_key.len().min(8)]
    );
    println!();

    if let Err(e) = config.validate() {
        println!("Configuration error: {}", e);
        return Ok(());
    }

    let embedder = EmbeddingClient::new(config.embedding)?;

    println!("Sending probe request...");
    match embedder.probe().await {
        Ok(dimension) => {
            println!("Embedding service ready (dimension {})", dimension);
        }
        Err(e) => {
            println!("Probe failed: {}", e);
        }
    }

    Ok(())
}
