//! HTTP streaming LM backend (§4.12): an OpenAI-compatible
//! `/v1/chat/completions` client with the same request shape and SSE
//! `data:` framing as a typical reverse-proxied inference server. Uses a
//! line-buffering parser so a JSON event split across two network reads
//! still parses correctly, and re-inlines the backend's
//! `reasoning_content` delta as `<think>...</think>` when the model config
//! says the backend provides it out of band.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EngineError;
use crate::lm::{ChatMessage, GenerationParams, LmAdapter, Role};

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct CompletionChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Deserialize)]
struct ChunkDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
}

fn role_str(role: &Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

pub struct HttpLmAdapter {
    client: reqwest::Client,
    base_url: String,
    model_name: String,
    /// Whether the backend exposes reasoning out-of-band (as
    /// `delta.reasoning_content`) rather than inline `<think>` tags.
    reinline_think: bool,
}

impl HttpLmAdapter {
    pub fn new(base_url: String, model_name: String, timeout_seconds: u64, reinline_think: bool) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(timeout_seconds))
                .build()
                .expect("failed to build reqwest client"),
            base_url,
            model_name,
            reinline_think,
        }
    }
}

#[async_trait]
impl LmAdapter for HttpLmAdapter {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        params: GenerationParams,
    ) -> Result<BoxStream<'static, Result<String, EngineError>>, EngineError> {
        let wire_messages = messages
            .iter()
            .map(|m| WireMessage { role: role_str(&m.role), content: m.content.clone() })
            .collect();

        let request = CompletionRequest {
            model: &self.model_name,
            messages: wire_messages,
            max_tokens: params.max_new_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            stream: true,
        };

        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        debug!(url = %url, "starting LM stream");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::BackendUnavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(EngineError::ModelUnknown(self.model_name.clone()));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::GenerationFailed(format!("LM backend returned {status}: {body}")));
        }

        let reinline_think = self.reinline_think;
        let mut byte_stream = response.bytes_stream();

        let stream = async_stream::try_stream! {
            let mut line_buf = String::new();
            let mut in_think = false;

            while let Some(frame) = byte_stream.next().await {
                let bytes = frame.map_err(|e| EngineError::GenerationFailed(format!("stream error: {e}")))?;
                line_buf.push_str(&String::from_utf8_lossy(&bytes));

                loop {
                    let Some(newline_at) = line_buf.find('\n') else { break };
                    let line = line_buf[..newline_at].trim_end_matches('\r').to_string();
                    line_buf.drain(..=newline_at);

                    let Some(payload) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) else {
                        continue;
                    };
                    let payload = payload.trim();
                    if payload.is_empty() {
                        continue;
                    }
                    if payload == "[DONE]" {
                        return;
                    }

                    let chunk: CompletionChunk = match serde_json::from_str(payload) {
                        Ok(c) => c,
                        Err(e) => {
                            debug!(error = %e, "skipping malformed SSE payload");
                            continue;
                        }
                    };

                    let Some(delta) = chunk.choices.into_iter().next().map(|c| c.delta) else { continue };

                    if reinline_think {
                        if let Some(reasoning) = delta.reasoning_content.filter(|s| !s.is_empty()) {
                            if !in_think {
                                in_think = true;
                                yield "<think>".to_string();
                            }
                            yield reasoning;
                        }
                    }
                    if let Some(content) = delta.content.filter(|s| !s.is_empty()) {
                        if in_think {
                            in_think = false;
                            yield "</think>".to_string();
                        }
                        yield content;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_str_maps_every_variant() {
        assert_eq!(role_str(&Role::System), "system");
        assert_eq!(role_str(&Role::User), "user");
        assert_eq!(role_str(&Role::Assistant), "assistant");
    }
}
