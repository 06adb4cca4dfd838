//! # Partition Module
//!
//! Client for an Unstructured-style document partitioning service. Documents
//! are uploaded as multipart requests and the returned element records are
//! mapped into a uniform [`ProcessedElement`] shape.
//!
//! ## Key Components
//!
//! - `PartitionClient`: uploads documents, gated by a request limiter and
//!   retried with backoff
//! - `PartitionConfig`: deployment mode, endpoint, credential and quotas
//! - `ProcessingParams`: per-request extraction and chunking options
//! - `ProcessedElement`: the uniform element model
//!
//! ## Features
//!
//! - Hosted and self-hosted deployments with separate quota defaults
//! - Error classification with `Retry-After` support
//! - Bounding boxes from vendor coordinate points, with optional
//!   normalization to the page layout
//! - MIME type lookup for uploads
//!
//! ## Example
//!
//! ```no_run
//! use docbridge::partition::{PartitionClient, PartitionConfig, PartitionStrategy, ProcessingParams};
//!
//! # async fn run() -> docbridge::Result<()> {
//! let client = PartitionClient::new(
//!     PartitionConfig::builder().api_key("my-key").build()?,
//! )?;
//! let params = ProcessingParams::builder()
//!     .strategy(PartitionStrategy::HiRes)
//!     .coordinates(true)
//!     .build();
//! let elements = client.process_file("report.pdf", &params).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod element;
mod mime;
mod params;

pub use client::PartitionClient;
pub use config::{
    DeploymentMode, PartitionConfig, PartitionConfigBuilder, HOSTED_API_URL,
    HOSTED_REQUESTS_PER_MINUTE, SELF_HOSTED_API_URL, SELF_HOSTED_REQUESTS_PER_MINUTE,
};
pub(crate) use config::{env_var, parse_env};
pub use element::{
    bounding_box, transform_elements, BoundingBox, ElementType, ProcessedElement,
    DEFAULT_CONFIDENCE,
};
pub use mime::{is_supported, mime_for, supported_extensions};
pub use params::{
    ChunkingOptions, ChunkingStrategy, PartitionStrategy, ProcessingParams,
    ProcessingParamsBuilder,
};
