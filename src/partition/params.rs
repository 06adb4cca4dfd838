//! Per-request partitioning options and their multipart form encoding

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How the service extracts content from the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStrategy {
    /// Let the service choose per document
    #[default]
    Auto,
    /// Text extraction only, no layout model
    Fast,
    /// Layout model based extraction
    HiRes,
    /// OCR every page
    OcrOnly,
}

impl PartitionStrategy {
    /// Wire value
    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionStrategy::Auto => "auto",
            PartitionStrategy::Fast => "fast",
            PartitionStrategy::HiRes => "hi_res",
            PartitionStrategy::OcrOnly => "ocr_only",
        }
    }
}

impl fmt::Display for PartitionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartitionStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "auto" => Ok(PartitionStrategy::Auto),
            "fast" => Ok(PartitionStrategy::Fast),
            "hi_res" | "hires" => Ok(PartitionStrategy::HiRes),
            "ocr_only" | "ocr" => Ok(PartitionStrategy::OcrOnly),
            other => Err(Error::InvalidRequest(format!(
                "unknown partition strategy '{}'",
                other
            ))),
        }
    }
}

/// How extracted elements are grouped into chunks by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    /// Fill chunks up to the size limits
    Basic,
    /// Start a new chunk at each title
    ByTitle,
    /// Start a new chunk at each page
    ByPage,
    /// Group semantically similar elements
    BySimilarity,
}

impl ChunkingStrategy {
    /// Wire value
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkingStrategy::Basic => "basic",
            ChunkingStrategy::ByTitle => "by_title",
            ChunkingStrategy::ByPage => "by_page",
            ChunkingStrategy::BySimilarity => "by_similarity",
        }
    }
}

impl FromStr for ChunkingStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "basic" => Ok(ChunkingStrategy::Basic),
            "by_title" => Ok(ChunkingStrategy::ByTitle),
            "by_page" => Ok(ChunkingStrategy::ByPage),
            "by_similarity" => Ok(ChunkingStrategy::BySimilarity),
            other => Err(Error::InvalidRequest(format!(
                "unknown chunking strategy '{}'",
                other
            ))),
        }
    }
}

/// Server side chunking options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingOptions {
    /// Grouping strategy
    pub strategy: ChunkingStrategy,

    /// Hard limit on chunk size in characters
    pub max_characters: Option<u32>,

    /// Soft limit after which a new chunk is started
    pub new_after_n_chars: Option<u32>,

    /// Characters of overlap between consecutive chunks
    pub overlap: Option<u32>,

    /// Merge sections smaller than this into their neighbours
    pub combine_under_n_chars: Option<u32>,
}

impl ChunkingOptions {
    /// Chunking with the given strategy and service defaults for the limits
    pub fn new(strategy: ChunkingStrategy) -> Self {
        Self {
            strategy,
            max_characters: None,
            new_after_n_chars: None,
            overlap: None,
            combine_under_n_chars: None,
        }
    }
}

/// Options for a single partition request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingParams {
    /// Extraction strategy
    pub strategy: PartitionStrategy,

    /// Server side chunking, off when `None`
    pub chunking: Option<ChunkingOptions>,

    /// Return element coordinates
    pub coordinates: bool,

    /// Infer table structure and return it as HTML
    pub infer_table_structure: bool,

    /// Return image and table crops as base64
    pub extract_image_blocks: bool,

    /// OCR language hints (ISO 639-3 codes such as `eng`)
    pub languages: Vec<String>,

    /// Emit page break elements
    pub include_page_breaks: bool,
}

impl ProcessingParams {
    /// Create a new builder
    pub fn builder() -> ProcessingParamsBuilder {
        ProcessingParamsBuilder::default()
    }

    /// Encode as multipart text fields, in a stable order
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("strategy", self.strategy.as_str().to_string()),
            ("output_format", "application/json".to_string()),
            ("coordinates", self.coordinates.to_string()),
            (
                "pdf_infer_table_structure",
                self.infer_table_structure.to_string(),
            ),
            ("include_page_breaks", self.include_page_breaks.to_string()),
        ];

        if self.extract_image_blocks {
            fields.push((
                "extract_image_block_types",
                r#"["Image", "Table"]"#.to_string(),
            ));
        }

        for language in &self.languages {
            fields.push(("languages", language.clone()));
        }

        if let Some(chunking) = &self.chunking {
            fields.push(("chunking_strategy", chunking.strategy.as_str().to_string()));
            let limits = [
                ("max_characters", chunking.max_characters),
                ("new_after_n_chars", chunking.new_after_n_chars),
                ("overlap", chunking.overlap),
                ("combine_under_n_chars", chunking.combine_under_n_chars),
            ];
            for (name, value) in limits {
                if let Some(value) = value {
                    fields.push((name, value.to_string()));
                }
            }
        }

        fields
    }
}

/// Builder for ProcessingParams
#[derive(Debug, Default)]
pub struct ProcessingParamsBuilder {
    params: ProcessingParams,
}

impl ProcessingParamsBuilder {
    /// Set the extraction strategy
    pub fn strategy(mut self, strategy: PartitionStrategy) -> Self {
        self.params.strategy = strategy;
        self
    }

    /// Enable server side chunking
    pub fn chunking(mut self, chunking: ChunkingOptions) -> Self {
        self.params.chunking = Some(chunking);
        self
    }

    /// Request element coordinates
    pub fn coordinates(mut self, coordinates: bool) -> Self {
        self.params.coordinates = coordinates;
        self
    }

    /// Request table structure inference
    pub fn infer_table_structure(mut self, infer: bool) -> Self {
        self.params.infer_table_structure = infer;
        self
    }

    /// Request image block extraction
    pub fn extract_image_blocks(mut self, extract: bool) -> Self {
        self.params.extract_image_blocks = extract;
        self
    }

    /// Add an OCR language hint
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.params.languages.push(language.into());
        self
    }

    /// Replace the OCR language hints
    pub fn languages(mut self, languages: Vec<String>) -> Self {
        self.params.languages = languages;
        self
    }

    /// Request page break elements
    pub fn include_page_breaks(mut self, include: bool) -> Self {
        self.params.include_page_breaks = include;
        self
    }

    /// Build the params
    pub fn build(self) -> ProcessingParams {
        self.params
    }
}
