//! Wire protocol for streamed chat completions.
//!
//! The backend answers streaming requests in SSE form: each protocol line
//! carries `data: ` followed by one self-contained JSON chunk, and the
//! stream ends with the literal `data: [DONE]`. A single network delta may
//! carry any number of lines, so decoding happens in two stages:
//!
//! 1. [`scan_data_lines`] splits a raw text blob into payload segments,
//!    ignoring blank lines, comments and keepalives, and recognizing the
//!    end-of-stream sentinel without attempting to parse it.
//! 2. [`parse_chunk`] deserializes one payload into a [`StreamChunk`].
//!    Invalid JSON is skipped with a diagnostic; a bad line never aborts
//!    processing of its neighbors.
//!
//! Tool-call arguments inside chunks are *not* guaranteed to be complete
//! JSON; they arrive as string fragments that the stream assembler
//! reassembles across chunks. Only the chunk envelope itself is parsed
//! here.

use serde::Deserialize;

/// End-of-stream sentinel payload
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded SSE line of interest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseEvent<'a> {
    /// A `data:` payload to be parsed as a chunk
    Payload(&'a str),
    /// The `[DONE]` sentinel
    Done,
}

/// Lazily scan a raw text blob for `data:` payload segments.
///
/// The blob may hold several newline-delimited protocol lines; it is
/// typically the fresh suffix of a response buffer that grows as the
/// transport delivers more bytes. Lines without a `data: ` marker are
/// protocol comments or keepalives and are dropped.
pub fn scan_data_lines(blob: &str) -> impl Iterator<Item = SseEvent<'_>> {
    blob.lines().filter_map(|line| {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        let (_, payload) = trimmed.split_once("data: ")?;
        if payload.is_empty() {
            None
        } else if payload == DONE_SENTINEL {
            Some(SseEvent::Done)
        } else {
            Some(SseEvent::Payload(payload))
        }
    })
}

/// Parse one payload segment into a chunk.
///
/// Returns `None` (with a warning) when the payload is not valid JSON for
/// the chunk envelope; callers continue with the next line.
pub fn parse_chunk(payload: &str) -> Option<StreamChunk> {
    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => Some(chunk),
        Err(err) => {
            let preview: String = payload.chars().take(100).collect();
            log::warn!("skipping invalid chunk payload ({err}): {preview}");
            None
        }
    }
}

/// Whether a finish reason ends the turn.
///
/// Both natural stops and stop-for-tool-calls complete a turn: either can
/// legitimately end a generation that produced tool calls.
pub fn is_terminal_finish_reason(reason: &str) -> bool {
    matches!(reason, "stop" | "tool_calls")
}

/// One streamed chat-completion chunk
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamChunk {
    /// Agent id serving this stream; the backend reports it in place of a
    /// model name
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

/// One choice inside a chunk
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Incremental delta carried by a choice
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// Fragment of one tool call, correlated by positional slot index
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolCallDelta {
    /// Positional slot within the turn; absent means slot 0
    #[serde(default)]
    pub index: u32,
    /// Call id; present when a call opens (or replaces the slot occupant)
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionDelta>,
}

/// Function name/argument fragment of a tool call delta
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}
