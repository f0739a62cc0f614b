//! Event frame types (§4.14, §6). Each variant self-tags its `"event"`
//! field on serialization, so the wire format carries no separate type
//! discriminator.

use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RagDoc {
    pub path: String,
    pub score: f32,
    pub chunk_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event")]
pub enum ChatEvent {
    #[serde(rename = "chat_created")]
    ChatCreated { chat_id: String },

    #[serde(rename = "stage")]
    Stage { stage: &'static str },

    #[serde(rename = "rag")]
    Rag { docs: Vec<RagDoc> },

    #[serde(rename = "think_start")]
    ThinkStart,

    #[serde(rename = "think_token")]
    ThinkToken { token: String },

    #[serde(rename = "think_end")]
    ThinkEnd { think_ms: u64 },

    #[serde(rename = "answer_token")]
    AnswerToken { token: String },

    #[serde(rename = "done")]
    Done { chat_id: String, think_ms: u64, total_ms: u64 },

    #[serde(rename = "error")]
    Error { error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_serializes_with_event_tag() {
        let json = serde_json::to_string(&ChatEvent::Stage { stage: "retrieval" }).unwrap();
        assert_eq!(json, r#"{"event":"stage","stage":"retrieval"}"#);
    }

    #[test]
    fn unit_variant_serializes_with_only_the_tag() {
        let json = serde_json::to_string(&ChatEvent::ThinkStart).unwrap();
        assert_eq!(json, r#"{"event":"think_start"}"#);
    }

    #[test]
    fn done_carries_all_three_fields() {
        let json = serde_json::to_string(&ChatEvent::Done {
            chat_id: "c1".to_string(),
            think_ms: 10,
            total_ms: 200,
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"done","chat_id":"c1","think_ms":10,"total_ms":200}"#);
    }
}
