//! Ancillary chat-history endpoints (§6): list chats, fetch a chat's
//! messages, delete a chat. Thin read-through wrappers over `HistoryStore`.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::state::AppState;

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

#[derive(Debug, Serialize)]
pub struct ChatRow {
    pub chat_id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct MessageRow {
    pub msg_id: i64,
    pub chat_id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub ok: bool,
}

/// `GET /v1/chats?limit=N`
pub async fn list_chats_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Vec<ChatRow>>, EngineError> {
    let chats = state.history.list_chats(q.limit).await?;
    Ok(Json(
        chats
            .into_iter()
            .map(|c| ChatRow {
                chat_id: c.chat_id,
                title: c.title,
                created_at: c.created_at.to_rfc3339(),
                updated_at: c.updated_at.to_rfc3339(),
            })
            .collect(),
    ))
}

/// `GET /v1/chats/{chat_id}/messages?limit=N`
pub async fn get_messages_handler(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Vec<MessageRow>>, EngineError> {
    let messages = state.history.get_messages(&chat_id, q.limit).await?;
    Ok(Json(
        messages
            .into_iter()
            .map(|m| MessageRow {
                msg_id: m.msg_id,
                chat_id: m.chat_id,
                role: m.role,
                content: m.content,
                created_at: m.created_at.to_rfc3339(),
            })
            .collect(),
    ))
}

/// `DELETE /v1/chats/{chat_id}`
pub async fn delete_chat_handler(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
) -> Result<Json<DeleteResponse>, EngineError> {
    state.history.delete_chat(&chat_id).await?;
    Ok(Json(DeleteResponse { ok: true }))
}
