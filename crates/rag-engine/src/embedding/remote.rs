//! Remote embedding backend (§4.4): per-string HTTP POST to an embedding
//! endpoint. No weighted/context embedding, no in-process cache — the
//! Vector Index already persists embeddings, so a query-time cache would be
//! the retrieval pipeline's concern, not this backend's.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedding::Embedder;
use crate::error::EngineError;
use crate::utils::similarity::l2_normalize;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDatum>,
}

#[derive(Deserialize)]
struct EmbedDatum {
    embedding: Vec<f32>,
}

pub struct RemoteEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dim: usize,
}

impl RemoteEmbedder {
    pub fn new(base_url: String, model: String, dim: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            model,
            dim,
        }
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EngineError> {
        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .json(&EmbedRequest { input: text, model: &self.model })
            .send()
            .await
            .map_err(|e| EngineError::EmbedderProtocol(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(EngineError::EmbedderProtocol(format!(
                "embedding endpoint returned {}",
                resp.status()
            )));
        }

        let body: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| EngineError::EmbedderProtocol(format!("malformed response: {e}")))?;

        let datum = body
            .data
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::EmbedderProtocol("empty embedding response".to_string()))?;

        if datum.embedding.len() != self.dim {
            return Err(EngineError::EmbedderProtocol(format!(
                "dimension mismatch: expected {}, got {}",
                self.dim,
                datum.embedding.len()
            )));
        }

        let mut v = datum.embedding;
        l2_normalize(&mut v);
        Ok(v)
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn dimensions(&self) -> usize {
        self.dim
    }

    fn backend_name(&self) -> &'static str {
        "remote"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_one(text).await?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_name_is_remote() {
        let e = RemoteEmbedder::new("http://localhost:1234".to_string(), "model".to_string(), 8);
        assert_eq!(e.backend_name(), "remote");
        assert_eq!(e.dimensions(), 8);
    }
}
