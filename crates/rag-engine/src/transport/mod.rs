//! Event Transport (§4.14): frames `ChatEvent`s onto a streaming HTTP
//! connection. The protocol is logically bidirectional (one inbound init
//! frame, many outbound event frames) which maps directly onto an HTTP
//! POST-with-streamed-response; realized here as Server-Sent Events.

pub mod sse;

pub use sse::chat_event_sse_stream;
