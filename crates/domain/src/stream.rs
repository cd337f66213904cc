use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for streaming provider responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events produced by a streaming dispatch.
#[derive(Debug, Clone)]
pub enum ChunkEvent {
    /// One upstream chunk. The raw payload is re-emitted downstream
    /// bit-for-bit; the extracted fields exist only for accumulation.
    Chunk(StreamChunk),
    /// The upstream `[DONE]` sentinel (or end of body).
    Done,
}

/// A parsed OpenAI streaming chunk.
///
/// `raw` is the verbatim upstream JSON payload text, including any
/// delta fields this struct does not model. Downstream emission always
/// writes `raw` — never a re-serialization — so unknown fields and even
/// key order survive bit-for-bit.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub raw: String,
    /// `choices[0].delta.content`, when present and non-empty.
    pub content: Option<String>,
    /// `choices[0].delta.reasoning_content` or `.thinking`, when present.
    pub reasoning: Option<String>,
    /// `choices[0].finish_reason`, when present.
    pub finish_reason: Option<String>,
    /// Usage block, when the provider includes one in the chunk.
    pub usage: Option<Usage>,
}

/// Token usage for a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}
