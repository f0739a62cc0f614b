//! Chat Orchestrator (§4.13): `Init -> EnsureChat -> PersistUser -> Retrieve
//! -> BuildPrompt -> Stream -> Finalize -> Done`, with a sink `Error` state.
//! Bridges the LM adapter's stream to the event emitter through a bounded
//! producer/consumer queue (§5), so a slow client naturally back-pressures
//! the LM call without the orchestrator doing anything explicit about it.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::{info, warn};

use crate::budget::{fill_budget, BudgetLimits};
use crate::chat::events::{ChatEvent, RagDoc};
use crate::demux::ThinkAnswerDemux;
use crate::error::EngineError;
use crate::lm::{ChatMessage, GenerationParams, LmAdapter, Role};
use crate::retrieval::RetrievalPipeline;
use crate::store::history_store::HistoryStore;

/// Capacity of the bounded queue bridging the LM adapter's stream to the
/// demux/event-emission consumer (§5).
const LM_QUEUE_CAPACITY: usize = 256;

/// Inbound init frame (§4.14, §6): `{session_id, chat_id?, message}`.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub session_id: String,
    pub chat_id: Option<String>,
    pub message: String,
}

/// Aborts the producer task if the orchestrator's output stream is dropped
/// before the LM stream finishes — this is how client disconnect (§5
/// cancellation) reaches into an in-flight LM call.
struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub struct ChatOrchestrator {
    history: Arc<HistoryStore>,
    retrieval: Arc<RetrievalPipeline>,
    lm: Arc<dyn LmAdapter>,
    limits: BudgetLimits,
    generation_params: GenerationParams,
    top_k: usize,
    recent_message_limit: usize,
    system_prompt: String,
}

impl ChatOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        history: Arc<HistoryStore>,
        retrieval: Arc<RetrievalPipeline>,
        lm: Arc<dyn LmAdapter>,
        limits: BudgetLimits,
        generation_params: GenerationParams,
        top_k: usize,
        recent_message_limit: usize,
        system_prompt: String,
    ) -> Self {
        Self {
            history,
            retrieval,
            lm,
            limits,
            generation_params,
            top_k,
            recent_message_limit,
            system_prompt,
        }
    }

    /// A concise, groundedness-first instruction prompt (see DESIGN.md for
    /// where this default comes from).
    pub fn default_system_prompt() -> String {
        "You are an on-device assistant answering from the user's own document \
         corpus. Answer using only the retrieved context and the conversation \
         so far; if the context does not contain the answer, say so plainly \
         instead of guessing. Keep answers concise and cite source paths \
         using the bracketed numbers from the retrieved context when you use \
         them."
            .to_string()
    }

    /// Drives one request to completion, emitting events as they occur.
    /// Dropping the returned stream before it ends (client disconnect)
    /// cancels the in-flight LM call and persists nothing for this turn.
    pub fn handle(self: Arc<Self>, request: ChatRequest) -> BoxStream<'static, ChatEvent> {
        Box::pin(async_stream::stream! {
            let t0 = Instant::now();
            info!(session_id = %request.session_id, "chat request started");

            if request.message.trim().is_empty() {
                yield ChatEvent::Error { error: EngineError::BadRequest("message must not be empty".to_string()).client_message() };
                return;
            }

            // --- EnsureChat ---
            let mut chat_created = false;
            let chat_id = match request.chat_id.as_deref().filter(|s| !s.is_empty()) {
                Some(id) => id.to_string(),
                None => {
                    let title = derive_title(&request.message);
                    match self.history.create_chat(&title).await {
                        Ok(id) => {
                            chat_created = true;
                            id
                        }
                        Err(e) => {
                            yield ChatEvent::Error { error: e.client_message() };
                            return;
                        }
                    }
                }
            };

            if chat_created {
                yield ChatEvent::ChatCreated { chat_id: chat_id.clone() };
            }

            // --- PersistUser ---
            let user_msg_id = match self.history.add_message(&chat_id, "user", &request.message).await {
                Ok(id) => id,
                Err(e) => {
                    yield ChatEvent::Error { error: e.client_message() };
                    return;
                }
            };

            // --- Retrieve ---
            yield ChatEvent::Stage { stage: "retrieval" };

            let snippets = match self.retrieval.retrieve(&request.message).await {
                Ok(s) => s,
                Err(e) => {
                    yield ChatEvent::Error { error: e.client_message() };
                    return;
                }
            };

            let rag_docs: Vec<RagDoc> = snippets
                .iter()
                .take(self.top_k)
                .map(|s| RagDoc {
                    path: s.path.clone(),
                    score: s.score,
                    chunk_id: s.chunk_id.clone(),
                    text: truncate_chars(&s.text, 800),
                })
                .collect();
            yield ChatEvent::Rag { docs: rag_docs };

            // --- BuildPrompt ---
            let summary = match self.history.get_summary(&chat_id).await {
                Ok(s) => s.map(|r| r.summary),
                Err(e) => {
                    yield ChatEvent::Error { error: e.client_message() };
                    return;
                }
            };

            let all_messages = match self.history.get_messages(&chat_id, i64::MAX).await {
                Ok(m) => m,
                Err(e) => {
                    yield ChatEvent::Error { error: e.client_message() };
                    return;
                }
            };

            let mut recent_records: Vec<_> = all_messages
                .into_iter()
                .filter(|m| m.msg_id != user_msg_id && (m.role == "user" || m.role == "assistant"))
                .collect();
            if recent_records.len() > self.recent_message_limit {
                recent_records = recent_records.split_off(recent_records.len() - self.recent_message_limit);
            }

            let recent_formatted: Vec<String> = recent_records
                .iter()
                .map(|m| format!("{}: {}", capitalize(&m.role), m.content))
                .collect();

            let evidence_items: Vec<String> = snippets
                .iter()
                .take(self.top_k)
                .enumerate()
                .map(|(i, s)| format!("[{}] {} (score={:.4})\n{}", i + 1, s.path, s.score, s.text))
                .collect();

            let budget = fill_budget(&request.message, summary.as_deref(), &evidence_items, &[], &recent_formatted, &self.limits);

            let mut system_content = self.system_prompt.clone();
            if let Some(summary_text) = &budget.summary {
                system_content.push_str("\n\nConversation summary:\n");
                system_content.push_str(summary_text);
            }
            if !budget.evidence.is_empty() {
                system_content.push_str("\n\nRetrieved context:\n");
                for block in &budget.evidence {
                    system_content.push_str(block);
                    system_content.push_str("\n\n");
                }
            }

            let mut messages = vec![ChatMessage { role: Role::System, content: system_content }];
            let included = budget.recent_messages.len().min(recent_records.len());
            for record in &recent_records[recent_records.len() - included..] {
                let role = if record.role == "assistant" { Role::Assistant } else { Role::User };
                messages.push(ChatMessage { role, content: record.content.clone() });
            }
            messages.push(ChatMessage { role: Role::User, content: request.message.clone() });

            // --- Stream ---
            yield ChatEvent::Stage { stage: "generation" };

            let lm_stream = match self.lm.stream_chat(&messages, self.generation_params).await {
                Ok(s) => s,
                Err(e) => {
                    yield ChatEvent::Error { error: e.client_message() };
                    return;
                }
            };

            let (tx, rx) = flume::bounded::<Result<String, EngineError>>(LM_QUEUE_CAPACITY);
            let producer = tokio::spawn(async move {
                let mut stream = lm_stream;
                while let Some(item) = stream.next().await {
                    if tx.send_async(item).await.is_err() {
                        break;
                    }
                }
            });
            let _abort_guard = AbortOnDrop(producer);

            let mut demux = ThinkAnswerDemux::new();
            let mut think_started = false;
            let mut think_t0: Option<Instant> = None;
            let mut think_ms: u64 = 0;
            let mut think_buf = String::new();
            let mut answer_buf = String::new();
            let mut stream_error = None;

            while let Ok(item) = rx.recv_async().await {
                match item {
                    Ok(piece) => {
                        let out = demux.push(&piece);
                        if !out.think.is_empty() {
                            if !think_started {
                                think_started = true;
                                think_t0 = Some(Instant::now());
                                yield ChatEvent::ThinkStart;
                            }
                            think_buf.push_str(&out.think);
                            yield ChatEvent::ThinkToken { token: out.think };
                        }
                        if !out.answer.is_empty() {
                            if let Some(started_at) = think_t0.take() {
                                think_ms = started_at.elapsed().as_millis() as u64;
                                yield ChatEvent::ThinkEnd { think_ms };
                            }
                            answer_buf.push_str(&out.answer);
                            yield ChatEvent::AnswerToken { token: out.answer };
                        }
                    }
                    Err(e) => {
                        stream_error = Some(e);
                        break;
                    }
                }
            }

            let flushed = demux.flush();
            if !flushed.think.is_empty() {
                if !think_started {
                    think_started = true;
                    think_t0 = Some(Instant::now());
                    yield ChatEvent::ThinkStart;
                }
                think_buf.push_str(&flushed.think);
                yield ChatEvent::ThinkToken { token: flushed.think };
            }
            if !flushed.answer.is_empty() {
                if let Some(started_at) = think_t0.take() {
                    think_ms = started_at.elapsed().as_millis() as u64;
                    yield ChatEvent::ThinkEnd { think_ms };
                }
                answer_buf.push_str(&flushed.answer);
                yield ChatEvent::AnswerToken { token: flushed.answer };
            }
            if let Some(started_at) = think_t0.take() {
                // Stream ended mid-think with no answer following.
                think_ms = started_at.elapsed().as_millis() as u64;
                yield ChatEvent::ThinkEnd { think_ms };
            }

            if let Some(e) = stream_error {
                warn!(chat_id = %chat_id, error = %e, "LM stream failed");
                yield ChatEvent::Error { error: e.client_message() };
                return;
            }

            if answer_buf.trim().is_empty() {
                let e = EngineError::GenerationFailed("model produced an empty answer".to_string());
                yield ChatEvent::Error { error: e.client_message() };
                return;
            }

            // --- Finalize ---
            if !think_buf.is_empty() {
                if let Err(e) = self.history.add_message(&chat_id, "assistant_think", &think_buf).await {
                    yield ChatEvent::Error { error: e.client_message() };
                    return;
                }
            }

            let total_ms = t0.elapsed().as_millis() as u64;
            let meta = serde_json::json!({ "think_ms": think_ms, "total_ms": total_ms }).to_string();
            if let Err(e) = self.history.add_message(&chat_id, "meta", &meta).await {
                yield ChatEvent::Error { error: e.client_message() };
                return;
            }

            if let Err(e) = self.history.add_message(&chat_id, "assistant", &answer_buf).await {
                yield ChatEvent::Error { error: e.client_message() };
                return;
            }

            info!(chat_id = %chat_id, total_ms, think_ms, "chat request finished");
            yield ChatEvent::Done { chat_id, think_ms, total_ms };
        })
    }
}

/// First 80 trimmed chars of the user's opening message (see DESIGN.md for
/// why this rule was chosen).
fn derive_title(message: &str) -> String {
    let trimmed = message.trim();
    let mut end = trimmed.len().min(80);
    while end > 0 && !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars).collect()
}

fn capitalize(role: &str) -> String {
    let mut chars = role.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::embedding::HashingEmbedder;
    use crate::store::chunk_store::ChunkStore;

    /// Hand-written LM fake: `mockall::automock` does not play well with
    /// `async_trait`'s boxed-stream return type, so orchestrator tests use
    /// a small scripted adapter instead (see DESIGN.md).
    struct ScriptedLm {
        chunks: Mutex<Vec<Vec<&'static str>>>,
    }

    impl ScriptedLm {
        fn once(chunks: Vec<&'static str>) -> Self {
            Self { chunks: Mutex::new(vec![chunks]) }
        }
    }

    #[async_trait]
    impl LmAdapter for ScriptedLm {
        async fn stream_chat(
            &self,
            _messages: &[ChatMessage],
            _params: GenerationParams,
        ) -> Result<BoxStream<'static, Result<String, EngineError>>, EngineError> {
            let script = self.chunks.lock().unwrap().remove(0);
            Ok(Box::pin(futures::stream::iter(script.into_iter().map(|s| Ok(s.to_string())))))
        }
    }

    struct FailingLm;

    #[async_trait]
    impl LmAdapter for FailingLm {
        async fn stream_chat(
            &self,
            _messages: &[ChatMessage],
            _params: GenerationParams,
        ) -> Result<BoxStream<'static, Result<String, EngineError>>, EngineError> {
            Err(EngineError::BackendUnavailable("no backend configured".to_string()))
        }
    }

    async fn orchestrator(lm: Arc<dyn LmAdapter>) -> (Arc<ChatOrchestrator>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let history = Arc::new(HistoryStore::connect(&dir.path().join("history.sqlite")).await.unwrap());
        let chunk_store = ChunkStore::connect(&dir.path().join("chunks.sqlite")).await.unwrap();
        let embedder = Box::new(HashingEmbedder::new(64));
        let retrieval = Arc::new(RetrievalPipeline::new(
            vec![],
            vec!["txt".to_string()],
            1024 * 1024,
            200,
            20,
            3,
            10,
            0.1,
            dir.path().join("vectors.idx"),
            embedder,
            chunk_store,
            false,
        ));
        retrieval.build_or_update_index().await.unwrap();

        let orchestrator = Arc::new(ChatOrchestrator::new(
            history,
            retrieval,
            lm,
            BudgetLimits {
                model_context_window: 4096,
                summary_token_limit: 256,
                memory_token_limit: 128,
                evidence_token_limit: 1024,
            },
            GenerationParams { temperature: 0.7, top_p: 0.9, max_new_tokens: 256 },
            3,
            10,
            ChatOrchestrator::default_system_prompt(),
        ));
        (orchestrator, dir)
    }

    async fn drain(orchestrator: Arc<ChatOrchestrator>, request: ChatRequest) -> Vec<ChatEvent> {
        orchestrator.handle(request).collect().await
    }

    #[tokio::test]
    async fn empty_corpus_simple_chat_emits_full_event_sequence() {
        let (orchestrator, _dir) = orchestrator(Arc::new(ScriptedLm::once(vec!["hello", " there"]))).await;
        let events = drain(
            orchestrator,
            ChatRequest { session_id: "s1".to_string(), chat_id: None, message: "hello".to_string() },
        )
        .await;

        assert!(matches!(events[0], ChatEvent::ChatCreated { .. }));
        assert!(matches!(events[1], ChatEvent::Stage { stage: "retrieval" }));
        assert!(matches!(&events[2], ChatEvent::Rag { docs } if docs.is_empty()));
        assert!(matches!(events[3], ChatEvent::Stage { stage: "generation" }));

        let answer: String = events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::AnswerToken { token } => Some(token.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(answer, "hello there");

        let done = events.last().unwrap();
        match done {
            ChatEvent::Done { think_ms, .. } => assert_eq!(*think_ms, 0),
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn think_answer_spans_demux_into_separate_events() {
        let (orchestrator, _dir) = orchestrator(Arc::new(ScriptedLm::once(vec!["a<thi", "nk>b</", "think>c"]))).await;
        let events = drain(
            orchestrator,
            ChatRequest { session_id: "s1".to_string(), chat_id: None, message: "hi".to_string() },
        )
        .await;

        assert!(events.iter().any(|e| matches!(e, ChatEvent::ThinkStart)));
        assert!(events.iter().any(|e| matches!(e, ChatEvent::ThinkEnd { .. })));

        let think: String = events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::ThinkToken { token } => Some(token.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(think, "b");

        let answer: String = events
            .iter()
            .filter_map(|e| match e {
                ChatEvent::AnswerToken { token } => Some(token.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(answer, "ac");
    }

    #[tokio::test]
    async fn empty_message_fails_fast_without_touching_history() {
        let (orchestrator, _dir) = orchestrator(Arc::new(ScriptedLm::once(vec!["unused"]))).await;
        let events = drain(
            orchestrator,
            ChatRequest { session_id: "s1".to_string(), chat_id: None, message: "   ".to_string() },
        )
        .await;

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ChatEvent::Error { .. }));
    }

    #[tokio::test]
    async fn backend_failure_surfaces_as_error_event() {
        let (orchestrator, _dir) = orchestrator(Arc::new(FailingLm)).await;
        let events = drain(
            orchestrator,
            ChatRequest { session_id: "s1".to_string(), chat_id: None, message: "hello".to_string() },
        )
        .await;

        assert!(matches!(events.last().unwrap(), ChatEvent::Error { .. }));
    }

    #[tokio::test]
    async fn empty_answer_is_reported_as_generation_failed() {
        let (orchestrator, _dir) = orchestrator(Arc::new(ScriptedLm::once(vec!["<think>only thinking</think>"]))).await;
        let events = drain(
            orchestrator,
            ChatRequest { session_id: "s1".to_string(), chat_id: None, message: "hello".to_string() },
        )
        .await;

        assert!(matches!(events.last().unwrap(), ChatEvent::Error { .. }));
    }
}
