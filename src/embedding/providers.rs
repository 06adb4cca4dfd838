//! Per-vendor request shaping and response decoding
//!
//! Every provider takes the same input (a batch of texts and a purpose) and
//! yields the same output (one vector per text, in input order). Only the
//! URL, auth header, JSON body and response layout differ.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::embedding::config::{EmbeddingConfig, EmbeddingProviderKind};
use crate::embedding::error::EmbedError;
use crate::error::Result;

/// What the embedded texts will be used for
///
/// Retrieval-tuned models embed stored passages and search queries
/// differently. Providers without the distinction ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedPurpose {
    /// Passages to be indexed
    #[default]
    Document,
    /// Search queries matched against indexed passages
    Query,
}

/// A fully shaped vendor request
#[derive(Debug, Clone)]
pub(crate) struct ProviderRequest {
    pub url: Url,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
}

/// Shape the request for one batch of `texts`
pub(crate) fn build_request(
    config: &EmbeddingConfig,
    texts: &[String],
    purpose: EmbedPurpose,
) -> Result<ProviderRequest> {
    let endpoint = config.endpoint()?;
    let base = endpoint.as_str().trim_end_matches('/');
    let api_key = config.api_key.clone().unwrap_or_default();
    let dimensions = config
        .dimensions
        .filter(|_| config.provider.supports_dimensions());

    let bearer = || {
        config
            .api_key
            .as_ref()
            .map(|key| ("Authorization", format!("Bearer {}", key)))
            .into_iter()
            .collect::<Vec<_>>()
    };

    let request = match config.provider {
        EmbeddingProviderKind::OpenAi => {
            let mut body = json!({
                "model": config.model,
                "input": texts,
                "encoding_format": "float",
            });
            if let Some(dimensions) = dimensions {
                body["dimensions"] = json!(dimensions);
            }
            ProviderRequest {
                url: parse_url(&format!("{}/v1/embeddings", base))?,
                headers: bearer(),
                body,
            }
        }
        EmbeddingProviderKind::AzureOpenAi => {
            let mut url = parse_url(&format!(
                "{}/openai/deployments/{}/embeddings",
                base, config.model
            ))?;
            url.query_pairs_mut()
                .append_pair("api-version", &config.api_version);

            let mut body = json!({ "input": texts });
            if let Some(dimensions) = dimensions {
                body["dimensions"] = json!(dimensions);
            }
            ProviderRequest {
                url,
                headers: vec![("api-key", api_key)],
                body,
            }
        }
        EmbeddingProviderKind::Cohere => {
            let input_type = match purpose {
                EmbedPurpose::Document => "search_document",
                EmbedPurpose::Query => "search_query",
            };
            ProviderRequest {
                url: parse_url(&format!("{}/v1/embed", base))?,
                headers: bearer(),
                body: json!({
                    "model": config.model,
                    "texts": texts,
                    "input_type": input_type,
                    "truncate": "END",
                }),
            }
        }
        EmbeddingProviderKind::Gemini => {
            let model = config.model.trim_start_matches("models/");
            let task_type = match purpose {
                EmbedPurpose::Document => "RETRIEVAL_DOCUMENT",
                EmbedPurpose::Query => "RETRIEVAL_QUERY",
            };
            let requests: Vec<Value> = texts
                .iter()
                .map(|text| {
                    let mut request = json!({
                        "model": format!("models/{}", model),
                        "content": { "parts": [{ "text": text }] },
                        "taskType": task_type,
                    });
                    if let Some(dimensions) = dimensions {
                        request["outputDimensionality"] = json!(dimensions);
                    }
                    request
                })
                .collect();
            ProviderRequest {
                url: parse_url(&format!(
                    "{}/v1beta/models/{}:batchEmbedContents",
                    base, model
                ))?,
                headers: vec![("x-goog-api-key", api_key)],
                body: json!({ "requests": requests }),
            }
        }
        EmbeddingProviderKind::Ollama => ProviderRequest {
            url: parse_url(&format!("{}/api/embed", base))?,
            headers: bearer(),
            body: json!({
                "model": config.model,
                "input": texts,
            }),
        },
        EmbeddingProviderKind::Voyage => {
            let input_type = match purpose {
                EmbedPurpose::Document => "document",
                EmbedPurpose::Query => "query",
            };
            let mut body = json!({
                "model": config.model,
                "input": texts,
                "input_type": input_type,
            });
            if let Some(dimensions) = dimensions {
                body["output_dimension"] = json!(dimensions);
            }
            ProviderRequest {
                url: parse_url(&format!("{}/v1/embeddings", base))?,
                headers: bearer(),
                body,
            }
        }
    };

    Ok(request)
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| EmbedError::from(e).into())
}

#[derive(Deserialize)]
struct DataResponse {
    data: Vec<DataItem>,
}

#[derive(Deserialize)]
struct DataItem {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CohereEmbeddings {
    Float(Vec<Vec<f64>>),
    ByType { float: Vec<Vec<f64>> },
}

#[derive(Deserialize)]
struct CohereResponse {
    embeddings: CohereEmbeddings,
}

#[derive(Deserialize)]
struct GeminiResponse {
    embeddings: Vec<GeminiValues>,
}

#[derive(Deserialize)]
struct GeminiValues {
    values: Vec<f64>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    embeddings: Vec<Vec<f64>>,
}

/// Decode a vendor response into vectors, in input order
pub(crate) fn parse_embeddings(
    provider: EmbeddingProviderKind,
    body: Value,
) -> std::result::Result<Vec<Vec<f64>>, EmbedError> {
    let malformed = |e: serde_json::Error| EmbedError::MalformedResponse {
        provider: provider.to_string(),
        reason: e.to_string(),
    };

    match provider {
        EmbeddingProviderKind::OpenAi
        | EmbeddingProviderKind::AzureOpenAi
        | EmbeddingProviderKind::Voyage => {
            let mut response: DataResponse = serde_json::from_value(body).map_err(malformed)?;
            response.data.sort_by_key(|item| item.index);
            Ok(response.data.into_iter().map(|item| item.embedding).collect())
        }
        EmbeddingProviderKind::Cohere => {
            let response: CohereResponse = serde_json::from_value(body).map_err(malformed)?;
            Ok(match response.embeddings {
                CohereEmbeddings::Float(vectors) => vectors,
                CohereEmbeddings::ByType { float } => float,
            })
        }
        EmbeddingProviderKind::Gemini => {
            let response: GeminiResponse = serde_json::from_value(body).map_err(malformed)?;
            Ok(response.embeddings.into_iter().map(|e| e.values).collect())
        }
        EmbeddingProviderKind::Ollama => {
            let response: OllamaResponse = serde_json::from_value(body).map_err(malformed)?;
            Ok(response.embeddings)
        }
    }
}
