//! Streaming chat endpoint (§6): the protocol's single entry point. The
//! inbound JSON body is the init frame; the response is the outbound
//! event-frame sequence carried over SSE.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::Json;
use futures::Stream;
use serde::Deserialize;

use crate::chat::ChatRequest;
use crate::error::EngineError;
use crate::state::AppState;
use crate::transport::chat_event_sse_stream;

#[derive(Debug, Deserialize)]
pub struct ChatInitFrame {
    pub session_id: String,
    pub message: String,
    pub chat_id: Option<String>,
}

pub async fn chat_stream_handler(
    State(state): State<Arc<AppState>>,
    Json(frame): Json<ChatInitFrame>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, EngineError> {
    if frame.message.trim().is_empty() {
        return Err(EngineError::BadRequest("message must not be empty".to_string()));
    }

    let request = ChatRequest {
        session_id: frame.session_id,
        chat_id: frame.chat_id,
        message: frame.message,
    };

    let events = state.orchestrator.clone().handle(request);
    Ok(chat_event_sse_stream(events))
}
