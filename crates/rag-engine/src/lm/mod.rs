pub mod http;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::EngineError;

pub use http::HttpLmAdapter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_new_tokens: u32,
}

/// Uniform LM contract (§4.12). Any backend-specific out-of-band reasoning
/// channel must be re-inlined as `<think>...</think>` spans so the demux
/// (§4.11) is the single source of truth for separating thought from
/// answer.
#[async_trait]
pub trait LmAdapter: Send + Sync {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        params: GenerationParams,
    ) -> Result<BoxStream<'static, Result<String, EngineError>>, EngineError>;

    async fn chat(&self, messages: &[ChatMessage], params: GenerationParams) -> Result<String, EngineError> {
        use futures::StreamExt;
        let mut stream = self.stream_chat(messages, params).await?;
        let mut out = String::new();
        while let Some(piece) = stream.next().await {
            out.push_str(&piece?);
        }
        Ok(out)
    }
}
