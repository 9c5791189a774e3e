//! The embedding capability: `embed_text` / `embed_diff`, both pure functions
//! of their argument within a process lifetime. External collaborators only —
//! the core never constructs a default one for callers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{DetectorError, Result};

const EMBED_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_text(&self, s: &str) -> Result<Vec<f32>>;
    async fn embed_diff(&self, s: &str) -> Result<Vec<f32>>;
}

#[async_trait]
impl<T: Embedder + ?Sized> Embedder for Arc<T> {
    async fn embed_text(&self, s: &str) -> Result<Vec<f32>> {
        (**self).embed_text(s).await
    }

    async fn embed_diff(&self, s: &str) -> Result<Vec<f32>> {
        (**self).embed_diff(s).await
    }
}

/// Strips diff metadata and keeps only change-carrying lines, then truncates.
/// Lives on the diff embedder rather than the core, since preprocessing is an
/// embedder concern, not a detector one.
pub fn preprocess_diff(diff: &str, max_chars: usize) -> String {
    let mut out = String::new();
    for line in diff.lines() {
        if line.starts_with("@@") || line.starts_with("diff ") || line.starts_with("index ") {
            continue;
        }
        if line.starts_with('+') || line.starts_with('-') || !line.trim().is_empty() {
            out.push_str(line);
            out.push('\n');
        }
        if out.chars().count() >= max_chars {
            break;
        }
    }
    out.chars().take(max_chars).collect()
}

/// Deterministic, content-dependent, hash-indexed bag-of-chars embedder,
/// L2-normalized. Offered out of the box so the core is usable without any
/// remote service.
pub struct LocalEmbedder {
    dimensions: usize,
    diff_max_chars: usize,
}

impl LocalEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            diff_max_chars: 4000,
        }
    }

    fn vectorize(&self, s: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        for (i, byte) in s.bytes().enumerate() {
            let bucket = ((byte as usize).wrapping_add(i.wrapping_mul(31))) % self.dimensions;
            v[bucket] += 1.0;
        }
        // Also fold in character bigrams so near-duplicate phrasing shares
        // more buckets than unrelated text of similar length.
        let bytes: Vec<u8> = s.bytes().collect();
        for pair in bytes.windows(2) {
            let h = (pair[0] as usize).wrapping_mul(257).wrapping_add(pair[1] as usize);
            v[h % self.dimensions] += 0.5;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        v
    }
}

impl Default for LocalEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed_text(&self, s: &str) -> Result<Vec<f32>> {
        Ok(self.vectorize(s))
    }

    async fn embed_diff(&self, s: &str) -> Result<Vec<f32>> {
        let cleaned = preprocess_diff(s, self.diff_max_chars);
        Ok(self.vectorize(&cleaned))
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    input: &'a str,
    model: &'a str,
    dimensions: usize,
}

#[derive(Deserialize)]
struct EmbedResponseItem {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedResponseItem>,
}

/// Calls an external embedding service: `POST {input, model, dimensions}` →
/// `{data: [{embedding: [...]}]}`. Uses the synchronous `ureq` client (the
/// same one the rest of this codebase already depends on for a near-identical
/// blocking POST), bridged into async via `spawn_blocking` so it still
/// satisfies the "embedder calls are suspension points" contract.
pub struct RemoteHttpEmbedder {
    endpoint: String,
    model: String,
    dimensions: usize,
    diff_max_chars: usize,
}

impl RemoteHttpEmbedder {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            dimensions,
            diff_max_chars: 4000,
        }
    }

    fn call(endpoint: String, model: String, dimensions: usize, input: String) -> Result<Vec<f32>> {
        let body = EmbedRequest {
            input: &input,
            model: &model,
            dimensions,
        };
        let response = ureq::post(&endpoint)
            .timeout(EMBED_TIMEOUT)
            .send_json(body)
            .map_err(|e| DetectorError::embedding(format!("request failed: {e}")))?;
        let parsed: EmbedResponse = response
            .into_json()
            .map_err(|e| DetectorError::embedding(format!("malformed response: {e}")))?;
        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| DetectorError::embedding("empty response data".to_string()))?;
        if vector.is_empty() {
            return Err(DetectorError::embedding("embedder returned an empty vector".to_string()));
        }
        Ok(vector)
    }
}

#[async_trait]
impl Embedder for RemoteHttpEmbedder {
    async fn embed_text(&self, s: &str) -> Result<Vec<f32>> {
        let endpoint = self.endpoint.clone();
        let model = self.model.clone();
        let dimensions = self.dimensions;
        let input = s.to_string();
        tokio::task::spawn_blocking(move || Self::call(endpoint, model, dimensions, input))
            .await
            .map_err(|e| DetectorError::transient(format!("embedder task panicked: {e}")))?
    }

    async fn embed_diff(&self, s: &str) -> Result<Vec<f32>> {
        let cleaned = preprocess_diff(s, self.diff_max_chars);
        let endpoint = self.endpoint.clone();
        let model = self.model.clone();
        let dimensions = self.dimensions;
        tokio::task::spawn_blocking(move || Self::call(endpoint, model, dimensions, cleaned))
            .await
            .map_err(|e| DetectorError::transient(format!("embedder task panicked: {e}")))?
    }
}
