use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::llm::prompt::truncate_to_char_boundary;

/// Queries longer than this are cut before embedding.
const MAX_QUERY_CHARS: usize = 2_000;

/// Embed one search query using the configured provider.
pub async fn embed_query(
    client: &reqwest::Client,
    config: &LlmConfig,
    text: &str,
) -> Result<Vec<f32>> {
    let input = truncate_to_char_boundary(text, MAX_QUERY_CHARS);

    let embedding = match config.provider.as_str() {
        "ollama" => embed_ollama(client, config, &input).await?,
        "openai" => embed_openai(client, config, &input).await?,
        other => anyhow::bail!("Unknown LLM provider: {other}"),
    };

    if embedding.is_empty() {
        anyhow::bail!("{} returned an empty embedding", config.provider);
    }
    Ok(embedding)
}

async fn ensure_success(resp: reqwest::Response, api: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    anyhow::bail!("{api} returned {status}: {body}")
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

async fn embed_ollama(client: &reqwest::Client, config: &LlmConfig, input: &str) -> Result<Vec<f32>> {
    let resp = client
        .post(format!("{}/api/embed", config.base_url))
        .json(&OllamaEmbedRequest {
            model: &config.embedding_model,
            input,
            truncate: true,
        })
        .send()
        .await
        .context("Failed to call Ollama embed API")?;

    let body: OllamaEmbedResponse = ensure_success(resp, "Ollama embed API")
        .await?
        .json()
        .await
        .context("Failed to parse Ollama embed response")?;

    body.embeddings
        .into_iter()
        .next()
        .context("Ollama returned no embedding")
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiEmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Deserialize)]
struct OpenAiEmbedding {
    embedding: Vec<f32>,
}

async fn embed_openai(client: &reqwest::Client, config: &LlmConfig, input: &str) -> Result<Vec<f32>> {
    let api_key = config.api_key.as_deref().unwrap_or_default();

    let resp = client
        .post(format!("{}/v1/embeddings", config.base_url))
        .bearer_auth(api_key)
        .json(&OpenAiEmbedRequest {
            model: &config.embedding_model,
            input,
        })
        .send()
        .await
        .context("Failed to call OpenAI embed API")?;

    let body: OpenAiEmbedResponse = ensure_success(resp, "OpenAI embed API")
        .await?
        .json()
        .await
        .context("Failed to parse OpenAI embed response")?;

    body.data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .context("OpenAI returned no embedding")
}
