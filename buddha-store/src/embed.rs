//! Embedding providers for the local backend and the semantic chunker.

use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::StoreError;

/// Turns text into vectors.
#[derive(Clone)]
pub enum Embedder {
    OpenAi(OpenAiEmbedder),
    Hashing(HashingEmbedder),
}

impl Embedder {
    pub async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        match self {
            Embedder::OpenAi(e) => e.embed(inputs).await,
            Embedder::Hashing(e) => Ok(inputs.iter().map(|s| e.embed_one(s)).collect()),
        }
    }

    pub async fn embed_one(&self, input: &str) -> Result<Vec<f32>, StoreError> {
        self.embed(&[input.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Embedding("empty embedding response".to_string()))
    }
}

/// Inputs per `/embeddings` request. The hosted API rejects more than 2048.
pub const EMBED_BATCH_SIZE: usize = 1000;

/// OpenAI-compatible `/embeddings` client.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    api_key: String,
    base_url: String,
    model: String,
    batch_size: usize,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, base_url: &str, model: &str) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            batch_size: EMBED_BATCH_SIZE,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Embed in order, one request per batch.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        let mut out = Vec::with_capacity(inputs.len());
        for (n, batch) in inputs.chunks(self.batch_size).enumerate() {
            tracing::debug!(batch = n, inputs = batch.len(), "Embedding batch");
            out.extend(self.embed_batch(batch).await?);
        }
        Ok(out)
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        let resp = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": &self.model,
                "input": inputs,
            }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Embedding(format!("{status}: {body}")));
        }

        let mut parsed: EmbeddingResponse = resp.json().await?;
        if parsed.data.len() != inputs.len() {
            return Err(StoreError::Embedding(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Deterministic bag-of-words feature hashing. No network, stable across runs.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dims];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let bucket = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
                digest[7],
            ]) as usize
                % self.dims;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

/// Cosine similarity; 0 when either vector is all zeros or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::post,
        Json, Router,
    };
    use serde_json::{json, Value};

    #[test]
    fn hashing_is_deterministic_and_normalized() {
        let e = HashingEmbedder::default();
        let a = e.embed_one("The Four Noble Truths");
        let b = e.embed_one("the four noble truths");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn similar_texts_score_higher() {
        let e = HashingEmbedder::default();
        let q = e.embed_one("customer support agent for refunds");
        let close = e.embed_one("an agent that handles customer refunds and support");
        let far = e.embed_one("meditation on impermanence");
        assert!(cosine_similarity(&q, &close) > cosine_similarity(&q, &far));
    }

    #[test]
    fn cosine_edge_cases() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
    }

    async fn capped_embeddings(Json(body): Json<Value>) -> Response {
        let inputs = body["input"].as_array().cloned().unwrap_or_default();
        if inputs.len() > 2 {
            return (StatusCode::BAD_REQUEST, "too many inputs").into_response();
        }
        // Reversed, so the client has to restore order by index.
        let data: Vec<Value> = inputs
            .iter()
            .enumerate()
            .rev()
            .map(|(index, input)| {
                let n: f32 = input.as_str().unwrap().parse().unwrap();
                json!({ "index": index, "embedding": [n] })
            })
            .collect();
        Json(json!({ "data": data })).into_response()
    }

    #[tokio::test]
    async fn openai_inputs_are_sent_in_batches() {
        let app = Router::new().route("/embeddings", post(capped_embeddings));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let base = format!("http://{addr}");

        let inputs: Vec<String> = (0..5).map(|n| n.to_string()).collect();
        let client = OpenAiEmbedder::new("k".into(), &base, "m");
        assert_eq!(client.batch_size, EMBED_BATCH_SIZE);

        let unbatched = Embedder::OpenAi(client.clone().with_batch_size(5));
        let err = unbatched.embed(&inputs).await.unwrap_err();
        assert!(err.to_string().contains("too many inputs"));

        let e = Embedder::OpenAi(client.with_batch_size(2));
        let vectors = e.embed(&inputs).await.unwrap();
        let firsts: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
        assert_eq!(firsts, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn empty_input_skips_provider() {
        let e = Embedder::Hashing(HashingEmbedder::new(8));
        assert!(e.embed(&[]).await.unwrap().is_empty());
        assert_eq!(e.embed_one("x").await.unwrap().len(), 8);
    }
}
