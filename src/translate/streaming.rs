//! State machine for translating Converse-style stream events into external
//! chat-completion chunks.
//!
//! The [`StreamTranslator`] processes provider events one at a time as they
//! arrive, emitting zero or more external chunks per event in arrival order.
//! It never buffers ahead of the event it was handed. After the terminal
//! event has been produced it goes quiet; re-running a stream requires a
//! brand-new provider call.

use super::converse_types::{ConverseStreamEvent, ConverseUsage};
use super::openai_types::{ChatCompletionChunk, ChunkChoice, ChunkDelta};
use super::response::{map_stop_reason, map_usage, new_response_id, unix_now};

#[derive(Debug)]
pub struct StreamTranslator {
    id: String,
    created: u64,
    model: String,
    started: bool,
    finished: bool,
    deltas_emitted: usize,
}

impl StreamTranslator {
    /// `model` is the external model name the caller requested; every chunk
    /// echoes it back.
    pub fn new(model: &str) -> Self {
        Self {
            id: new_response_id(),
            created: unix_now(),
            model: model.to_string(),
            started: false,
            finished: false,
            deltas_emitted: 0,
        }
    }

    /// Whether any content delta has already been emitted downstream. The
    /// orchestrator's fallback rule hinges on this: once a delta has reached
    /// the caller, a silent non-streaming retry would duplicate content.
    pub fn deltas_emitted(&self) -> bool {
        self.deltas_emitted > 0
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Process one provider event, returning the external chunks it maps to.
    pub fn process_event(&mut self, event: &ConverseStreamEvent) -> Vec<ChatCompletionChunk> {
        if self.finished {
            // Usage metadata trails messageStop on Converse streams; it is
            // the only event still surfaced after the terminal chunk.
            if let Some(ref metadata) = event.metadata {
                return vec![self.usage_chunk(&metadata.usage)];
            }
            return Vec::new();
        }

        let mut chunks = Vec::new();

        if event.message_start.is_some() && !self.started {
            chunks.push(self.role_chunk());
            self.started = true;
        }

        if let Some(ref block_delta) = event.content_block_delta {
            if let Some(ref text) = block_delta.delta.text {
                if !self.started {
                    // Provider skipped messageStart; open the message ourselves.
                    chunks.push(self.role_chunk());
                    self.started = true;
                }
                chunks.push(self.text_chunk(text));
                self.deltas_emitted += 1;
            }
        }

        if let Some(ref stop) = event.message_stop {
            chunks.push(self.finish_chunk(map_stop_reason(&stop.stop_reason)));
            self.finished = true;
        }

        if let Some(ref metadata) = event.metadata {
            chunks.push(self.usage_chunk(&metadata.usage));
        }

        chunks
    }

    /// Call when the provider stream ends. Closes the message if no terminal
    /// event was seen, so the caller always gets exactly one finish chunk.
    pub fn finish(&mut self) -> Vec<ChatCompletionChunk> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut chunks = Vec::new();
        if !self.started {
            self.started = true;
            chunks.push(self.role_chunk());
        }
        chunks.push(self.finish_chunk("stop"));
        chunks
    }

    fn base_chunk(&self) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: Vec::new(),
            usage: None,
        }
    }

    fn role_chunk(&self) -> ChatCompletionChunk {
        let mut chunk = self.base_chunk();
        chunk.choices.push(ChunkChoice {
            index: 0,
            delta: ChunkDelta {
                role: Some("assistant".to_string()),
                content: None,
            },
            finish_reason: None,
        });
        chunk
    }

    fn text_chunk(&self, text: &str) -> ChatCompletionChunk {
        let mut chunk = self.base_chunk();
        chunk.choices.push(ChunkChoice {
            index: 0,
            delta: ChunkDelta {
                role: None,
                content: Some(text.to_string()),
            },
            finish_reason: None,
        });
        chunk
    }

    fn finish_chunk(&self, finish_reason: &str) -> ChatCompletionChunk {
        let mut chunk = self.base_chunk();
        chunk.choices.push(ChunkChoice {
            index: 0,
            delta: ChunkDelta::default(),
            finish_reason: Some(finish_reason.to_string()),
        });
        chunk
    }

    fn usage_chunk(&self, usage: &ConverseUsage) -> ChatCompletionChunk {
        let mut chunk = self.base_chunk();
        chunk.usage = Some(map_usage(usage));
        chunk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::converse_types::{
        BlockDelta, ContentBlockDelta, MessageStart, MessageStop, StreamMetadata,
    };

    fn start_event() -> ConverseStreamEvent {
        ConverseStreamEvent {
            message_start: Some(MessageStart {
                role: "assistant".to_string(),
            }),
            ..Default::default()
        }
    }

    fn delta_event(text: &str) -> ConverseStreamEvent {
        ConverseStreamEvent {
            content_block_delta: Some(ContentBlockDelta {
                delta: BlockDelta {
                    text: Some(text.to_string()),
                },
                content_block_index: 0,
            }),
            ..Default::default()
        }
    }

    fn stop_event(reason: &str) -> ConverseStreamEvent {
        ConverseStreamEvent {
            message_stop: Some(MessageStop {
                stop_reason: reason.to_string(),
            }),
            ..Default::default()
        }
    }

    fn metadata_event(input: u64, output: u64) -> ConverseStreamEvent {
        ConverseStreamEvent {
            metadata: Some(StreamMetadata {
                usage: ConverseUsage {
                    input_tokens: input,
                    output_tokens: output,
                    total_tokens: input + output,
                },
            }),
            ..Default::default()
        }
    }

    fn content_of(chunk: &ChatCompletionChunk) -> Option<&str> {
        chunk.choices.first()?.delta.content.as_deref()
    }

    #[test]
    fn test_n_deltas_in_order_then_one_finish() {
        let mut t = StreamTranslator::new("gpt-4o-mini");
        let texts = ["Hel", "lo", ", world"];

        let mut out = Vec::new();
        out.extend(t.process_event(&start_event()));
        for text in &texts {
            out.extend(t.process_event(&delta_event(text)));
        }
        out.extend(t.process_event(&stop_event("end_turn")));

        // role chunk + 3 deltas + finish
        assert_eq!(out.len(), 5);
        assert_eq!(out[0].choices[0].delta.role.as_deref(), Some("assistant"));

        let streamed: Vec<&str> = out[1..4].iter().filter_map(content_of).collect();
        assert_eq!(streamed, texts);

        assert_eq!(out[4].choices[0].finish_reason.as_deref(), Some("stop"));

        // Nothing after the terminal event
        assert!(t.process_event(&delta_event("late")).is_empty());
        assert!(t.finish().is_empty());
    }

    #[test]
    fn test_deltas_emitted_flag() {
        let mut t = StreamTranslator::new("m");
        assert!(!t.deltas_emitted());
        t.process_event(&start_event());
        assert!(!t.deltas_emitted());
        t.process_event(&delta_event("x"));
        assert!(t.deltas_emitted());
    }

    #[test]
    fn test_missing_message_start_still_opens_message() {
        let mut t = StreamTranslator::new("m");
        let out = t.process_event(&delta_event("hi"));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].choices[0].delta.role.as_deref(), Some("assistant"));
        assert_eq!(content_of(&out[1]), Some("hi"));
    }

    #[test]
    fn test_stop_reason_mapped_in_terminal_chunk() {
        let mut t = StreamTranslator::new("m");
        t.process_event(&start_event());
        let out = t.process_event(&stop_event("max_tokens"));
        assert_eq!(out[0].choices[0].finish_reason.as_deref(), Some("length"));
    }

    #[test]
    fn test_metadata_after_stop_emits_usage_chunk() {
        let mut t = StreamTranslator::new("m");
        t.process_event(&start_event());
        t.process_event(&delta_event("x"));
        t.process_event(&stop_event("end_turn"));

        let out = t.process_event(&metadata_event(7, 2));
        assert_eq!(out.len(), 1);
        let usage = out[0].usage.as_ref().unwrap();
        assert_eq!(usage.prompt_tokens, 7);
        assert_eq!(usage.completion_tokens, 2);
        assert_eq!(usage.total_tokens, 9);
        assert!(out[0].choices.is_empty());
    }

    #[test]
    fn test_finish_without_terminal_event_closes_stream() {
        let mut t = StreamTranslator::new("m");
        t.process_event(&start_event());
        t.process_event(&delta_event("partial"));

        let out = t.finish();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].choices[0].finish_reason.as_deref(), Some("stop"));
        assert!(t.is_finished());
    }

    #[test]
    fn test_finish_on_empty_stream_still_opens_and_closes() {
        let mut t = StreamTranslator::new("m");
        let out = t.finish();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].choices[0].delta.role.as_deref(), Some("assistant"));
        assert_eq!(out[1].choices[0].finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_chunks_share_id_and_model() {
        let mut t = StreamTranslator::new("alias-a");
        let a = t.process_event(&start_event());
        let b = t.process_event(&delta_event("x"));
        assert_eq!(a[0].id, b[0].id);
        assert!(a[0].id.starts_with("chatcmpl-"));
        assert_eq!(b[0].model, "alias-a");
        assert_eq!(b[0].object, "chat.completion.chunk");
    }
}
