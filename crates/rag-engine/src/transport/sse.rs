use std::convert::Infallible;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};

use crate::chat::ChatEvent;

/// Adapts a `ChatEvent` stream into an SSE response. Every `ChatEvent`
/// already self-tags with an `"event"` field when serialized (§6), so a
/// single SSE frame shape carries every event kind — the client
/// discriminates on the JSON payload, not the SSE `event:` line.
pub fn chat_event_sse_stream(
    events: BoxStream<'static, ChatEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mapped = events.map(|event| {
        let data = serde_json::to_string(&event)
            .unwrap_or_else(|_| r#"{"event":"error","error":"failed to encode event"}"#.to_string());
        Ok(Event::default().data(data))
    });

    Sse::new(mapped).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_event_serializes_into_sse_data() {
        let event = ChatEvent::Done { chat_id: "c1".to_string(), think_ms: 5, total_ms: 20 };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event":"done""#));
    }
}
