//! # docbridge - Document Partitioning and Embedding Provider Adapters
//!
//! This crate puts two external services behind uniform Rust interfaces: a
//! document partitioning service that turns files into structured elements,
//! and a choice of text embedding vendors. Both share one error classifier
//! and one retry loop, and every outbound request is rate limited.
//!
//! ## Features
//!
//! - Document partitioning:
//!   - Hosted and self-hosted deployments
//!   - Extraction strategies, chunking and OCR language hints
//!   - Uniform elements with bounding boxes
//! - Embeddings:
//!   - OpenAI, Azure OpenAI, Cohere, Gemini, Ollama and Voyage
//!   - Batching with results kept in input order
//!   - `rig` embedding model integration
//! - Failures classified into a small taxonomy, retried with exponential
//!   backoff or the server's `Retry-After`
//! - Token bucket rate limiting with `governor`
//! - Async API with Tokio
//!
//! ## Example
//!
//! ```rust,no_run
//! use docbridge::embedding::{Embedder, EmbeddingConfig, EmbeddingProviderKind};
//! use docbridge::partition::{PartitionClient, PartitionConfig, ProcessingParams};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let partitioner = PartitionClient::new(PartitionConfig::from_env()?)?;
//!     let elements = partitioner
//!         .process_file("report.pdf", &ProcessingParams::default())
//!         .await?;
//!
//!     let embedder = Embedder::from_config(
//!         EmbeddingConfig::builder()
//!             .provider(EmbeddingProviderKind::Ollama)
//!             .build()?,
//!     )?;
//!     let texts: Vec<String> = elements.into_iter().map(|e| e.text).collect();
//!     let vectors = embedder.embed_documents(&texts).await?;
//!
//!     println!("{} elements embedded", vectors.len());
//!     Ok(())
//! }
//! ```

mod error;
pub mod embedding;
pub mod partition;
pub mod retry;

pub use error::{Error, Result};

/// Re-export of types module for public use
pub mod prelude {
    pub use crate::embedding::{Embedder, EmbeddingConfig, EmbeddingProviderKind, EmbedPurpose};
    pub use crate::error::Error;
    pub use crate::error::Result;
    pub use crate::partition::{PartitionClient, PartitionConfig, ProcessedElement, ProcessingParams};
    pub use crate::retry::{ClassifiedError, ErrorKind, RetryPolicy};
}
