//! # docbridge CLI Application
//!
//! Command-line access to the partition and embedding adapters.
//!
//! ## Key Components
//!
//! - CLI argument parsing with clap
//! - Subcommands:
//!   - `partition`: split documents into structured elements
//!   - `embed`: embed texts with the configured provider
//!   - `health`: check the partition service is reachable
//!
//! ## Features
//!
//! - Settings from `UNSTRUCTURED_*` and `EMBEDDING_*` environment variables,
//!   overridable by flags
//! - Progress tracking across multiple documents
//! - Telemetry export when an OTLP endpoint is configured
//! - Both JSON and text output formats

mod telemetry;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use docbridge::embedding::{Embedder, EmbeddingConfig, EmbeddingProviderKind};
use docbridge::partition::{
    ChunkingOptions, ChunkingStrategy, DeploymentMode, PartitionClient, PartitionConfig,
    PartitionStrategy, ProcessedElement, ProcessingParams,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use telemetry::OtelGuard;
use tracing::instrument;

#[derive(Parser)]
#[command(author, version, about = "Partition documents and embed text through vendor APIs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Split documents into structured elements
    Partition(PartitionArgs),

    /// Generate embeddings for text
    Embed(EmbedArgs),

    /// Check that the partition service is healthy
    Health(ServiceArgs),
}

#[derive(Args, Debug)]
struct ServiceArgs {
    /// Use the self-hosted deployment defaults
    #[arg(long)]
    self_hosted: bool,

    /// Partition endpoint URL
    #[arg(long)]
    api_url: Option<String>,

    /// Maximum retries per request
    #[arg(long)]
    max_retries: Option<u32>,
}

#[derive(Args, Debug)]
struct PartitionArgs {
    /// Documents to partition
    #[arg(required = true)]
    files: Vec<PathBuf>,

    #[command(flatten)]
    service: ServiceArgs,

    /// Extraction strategy (auto|fast|hi_res|ocr_only)
    #[arg(short, long, default_value = "auto")]
    strategy: PartitionStrategy,

    /// Chunking strategy (basic|by_title|by_page|by_similarity)
    #[arg(short, long)]
    chunking: Option<ChunkingStrategy>,

    /// Maximum chunk size in characters
    #[arg(long, requires = "chunking")]
    max_characters: Option<u32>,

    /// Return element coordinates
    #[arg(long)]
    coordinates: bool,

    /// Infer table structure
    #[arg(long)]
    tables: bool,

    /// OCR language hints (ISO 639-3)
    #[arg(short, long)]
    language: Vec<String>,

    /// Output format (text|json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Write JSON results to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct EmbedArgs {
    /// Texts to embed
    #[arg(required = true)]
    texts: Vec<String>,

    /// Embed as a search query instead of documents
    #[arg(short, long)]
    query: bool,

    /// Embedding provider (openai|azure_openai|cohere|gemini|ollama|voyage)
    #[arg(short, long)]
    provider: Option<EmbeddingProviderKind>,

    /// Model name (Azure: deployment name)
    #[arg(short, long)]
    model: Option<String>,

    /// Provider endpoint
    #[arg(long)]
    base_url: Option<String>,

    /// Requested vector size
    #[arg(short, long)]
    dimensions: Option<usize>,

    /// Output format (text|json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,
}

#[derive(Serialize)]
struct DocumentResult<'a> {
    file: String,
    elements: &'a [ProcessedElement],
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    let _otel: OtelGuard = telemetry::init_tracing_subscriber()?;

    match cli.command {
        Commands::Partition(args) => partition_command(args).await?,
        Commands::Embed(args) => embed_command(args).await?,
        Commands::Health(args) => health_command(args).await?,
    }

    Ok(())
}

fn partition_client(args: &ServiceArgs) -> anyhow::Result<PartitionClient> {
    let mut builder = PartitionConfig::env_builder()?;
    if args.self_hosted {
        builder = builder.mode(DeploymentMode::SelfHosted);
    }
    if let Some(api_url) = &args.api_url {
        builder = builder.api_url(api_url.clone());
    }
    if let Some(max_retries) = args.max_retries {
        builder = builder.max_retries(max_retries);
    }

    let config = builder.build().context("invalid partition configuration")?;
    Ok(PartitionClient::new(config)?)
}

#[instrument]
async fn partition_command(args: PartitionArgs) -> anyhow::Result<()> {
    let client = partition_client(&args.service)?;

    let mut params = ProcessingParams::builder()
        .strategy(args.strategy)
        .coordinates(args.coordinates)
        .infer_table_structure(args.tables)
        .languages(args.language.clone());
    if let Some(strategy) = args.chunking {
        params = params.chunking(ChunkingOptions {
            max_characters: args.max_characters,
            ..ChunkingOptions::new(strategy)
        });
    }
    let params = params.build();

    let progress_bar = ProgressBar::new(args.files.len() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("##-"),
    );

    let mut results = Vec::with_capacity(args.files.len());
    for path in &args.files {
        progress_bar.set_message(path.display().to_string());
        let elements = client
            .process_file(path, &params)
            .await
            .with_context(|| format!("failed to partition {}", path.display()))?;
        results.push((path.display().to_string(), elements));
        progress_bar.inc(1);
    }
    progress_bar.finish_and_clear();

    let documents: Vec<DocumentResult<'_>> = results
        .iter()
        .map(|(file, elements)| DocumentResult {
            file: file.clone(),
            elements,
        })
        .collect();

    if let Some(output) = &args.output {
        let json = serde_json::to_string_pretty(&documents)?;
        tokio::fs::write(output, json).await?;
        println!("Saved {} documents to {}", documents.len(), output.display());
        return Ok(());
    }

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&documents)?),
        _ => {
            for document in &documents {
                println!("{} ({} elements)", document.file, document.elements.len());
                for element in document.elements {
                    let page = element
                        .page_number
                        .map(|p| format!("p{}", p))
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "  [{:<14}] {:>4}  {}",
                        element.element_type.as_str(),
                        page,
                        preview(&element.text, 80)
                    );
                }
            }
        }
    }

    Ok(())
}

#[instrument(skip(args), fields(count = args.texts.len()))]
async fn embed_command(args: EmbedArgs) -> anyhow::Result<()> {
    let mut builder = EmbeddingConfig::env_builder()?;
    if let Some(provider) = args.provider {
        builder = builder.provider(provider);
        let key = std::env::var("EMBEDDING_API_KEY")
            .ok()
            .or_else(|| provider.api_key_env().and_then(|name| std::env::var(name).ok()));
        if let Some(key) = key {
            builder = builder.api_key(key);
        }
    }
    if let Some(model) = &args.model {
        builder = builder.model(model.clone());
    }
    if let Some(base_url) = &args.base_url {
        builder = builder.base_url(base_url.clone());
    }
    if let Some(dimensions) = args.dimensions {
        builder = builder.dimensions(dimensions);
    }

    let config = builder.build().context("invalid embedding configuration")?;
    let embedder = Embedder::from_config(config)?;

    let vectors = if args.query {
        let mut vectors = Vec::with_capacity(args.texts.len());
        for text in &args.texts {
            vectors.push(embedder.embed_query(text).await?);
        }
        vectors
    } else {
        embedder.embed_documents(&args.texts).await?
    };

    match args.format.as_str() {
        "json" => {
            let output: Vec<_> = args
                .texts
                .iter()
                .zip(&vectors)
                .map(|(text, vector)| serde_json::json!({ "text": text, "embedding": vector }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            println!(
                "{} embeddings from {} ({} dimensions)",
                vectors.len(),
                embedder.provider(),
                vectors.first().map_or(0, Vec::len)
            );
            for (text, vector) in args.texts.iter().zip(&vectors) {
                let head: Vec<String> = vector.iter().take(4).map(|v| format!("{:.4}", v)).collect();
                println!("  {}  [{}, ...]", preview(text, 40), head.join(", "));
            }
        }
    }

    Ok(())
}

#[instrument]
async fn health_command(args: ServiceArgs) -> anyhow::Result<()> {
    let client = partition_client(&args)?;
    client.health_check().await?;
    println!("{} is healthy", client.config().api_url);
    Ok(())
}

fn preview(text: &str, max_chars: usize) -> String {
    let line = text.replace('\n', " ");
    match line.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &line[..idx]),
        None => line,
    }
}
