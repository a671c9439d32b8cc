//! Stream assembly: turning raw SSE deltas into a coherent transcript.
//!
//! [`StreamAssembler`] is the stateful engine behind a streaming turn. It
//! owns three pieces of transient state, all scoped to one turn of one
//! session:
//!
//! - a FIFO of raw chunks awaiting processing, so that deltas delivered
//!   while an earlier delta is still being applied are consumed strictly
//!   in arrival order;
//! - a map of open tool calls keyed by the protocol's positional slot
//!   index, each accumulating argument fragments for exactly one call id;
//! - the set of call ids already finalized this turn, plus the
//!   fired-at-most-once finish latch.
//!
//! # Tool call lifecycle
//!
//! A slot opens when a fragment carries a call id and tool name for an
//! unoccupied (or differently occupied) index. Argument fragments append
//! to the slot's buffer and keep a live placeholder in the transcript up
//! to date. The slot index is only a correlation hint within one call's
//! lifetime; identity is the call id. When a fragment shows a *different*
//! call id at an occupied slot, the occupant is closed out first: its
//! accumulated arguments are parsed and spliced into the transcript (or
//! its placeholder is discarded when nothing accumulated), and only then
//! does the new call take the slot. Two calls never merge.
//!
//! At turn finish every still-open call is finalized the same way. Calls
//! whose accumulated arguments never became valid JSON are dropped with a
//! warning rather than surfaced as errors: truncated tool-call JSON is an
//! expected consequence of abrupt stream termination, and a best-effort
//! transcript beats a failed turn.
//!
//! # Finish handshake
//!
//! A turn ends on the `[DONE]` sentinel or on a `"stop"` / `"tool_calls"`
//! finish reason. Detection does not short-circuit the blob in hand:
//! tool-call fragments can legitimately follow the finish-reason line
//! within the same flushed buffer, so every queued line is applied before
//! the completion hook runs. The hook fires at most once per turn no
//! matter how many terminal conditions the stream carries.

use crate::transcript::{ChatSession, Message, ToolRecordItem};
use crate::wire::{self, SseEvent, StreamChunk, ToolCallDelta};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::future::Future;

/// One open tool call occupying a slot
#[derive(Debug)]
struct OpenCall {
    call_id: String,
    tool_name: String,
    arguments: String,
}

/// Per-turn stream reassembly engine.
///
/// One assembler serves one [`ChatSession`]; it is reset when a turn
/// starts or is abandoned. All transcript mutation funnels through
/// [`ingest`](Self::ingest), which guarantees chunks apply in strict
/// arrival order.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    /// Open tool calls by wire slot index. Ordered map so batch
    /// finalization walks slots deterministically.
    slots: BTreeMap<u32, OpenCall>,
    /// Call ids already finalized this turn; suppresses double
    /// finalization when a call closed eagerly during slot replacement
    /// shows up again in the batch finalize.
    processed_call_ids: HashSet<String>,
    /// Raw chunks awaiting sequential processing
    pending_chunks: VecDeque<String>,
    /// Drain loop in progress
    draining: bool,
    /// Completion hook already invoked this turn
    finish_fired: bool,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all transient state for a new (or abandoned) turn
    pub fn reset(&mut self) {
        self.slots.clear();
        self.processed_call_ids.clear();
        self.pending_chunks.clear();
        self.draining = false;
        self.finish_fired = false;
    }

    /// Whether the completion hook has fired for the current turn
    pub fn is_finished(&self) -> bool {
        self.finish_fired
    }

    /// Whether any tool call is still accumulating
    pub fn has_open_calls(&self) -> bool {
        !self.slots.is_empty()
    }

    /// Enqueue a raw chunk without processing it.
    ///
    /// Pair with [`drain`](Self::drain); [`ingest`](Self::ingest) does
    /// both.
    pub fn push_chunk(&mut self, raw_chunk: impl Into<String>) {
        self.pending_chunks.push_back(raw_chunk.into());
    }

    /// Enqueue a raw chunk and drain the queue.
    pub async fn ingest<F, Fut>(
        &mut self,
        session: &mut ChatSession,
        raw_chunk: impl Into<String>,
        on_finish: F,
    ) where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        self.push_chunk(raw_chunk);
        self.drain(session, on_finish).await;
    }

    /// Drain queued chunks in FIFO order, applying each to the session's
    /// last message.
    ///
    /// Entries enqueued while the drain runs are still consumed before it
    /// exits. A drain already in progress makes this call a no-op; the
    /// active loop will pick up whatever was enqueued. When a terminal
    /// condition is seen, the turn's transcript is settled (placeholders
    /// cleared, streaming flag dropped) and `on_finish` is awaited, once.
    pub async fn drain<F, Fut>(&mut self, session: &mut ChatSession, on_finish: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        if self.draining {
            return;
        }
        self.draining = true;

        let mut hook = Some(on_finish);
        while let Some(raw_chunk) = self.pending_chunks.pop_front() {
            let terminal = self.process_raw(session, &raw_chunk);

            if terminal && !self.finish_fired {
                self.finish_fired = true;
                // The sentinel can arrive without a finish-reason chunk;
                // outstanding calls get their one finalization attempt
                // either way.
                if let Some(message) = session.last_message_mut() {
                    self.finalize_open_calls(message);
                }
                self.settle_transcript(session);
                if let Some(hook) = hook.take() {
                    hook().await;
                }
            }
        }

        self.draining = false;
    }

    /// Settle the in-flight message: no streaming residue survives a
    /// completed turn.
    fn settle_transcript(&mut self, session: &mut ChatSession) {
        if let Some(message) = session.last_message_mut() {
            let dropped = message.clear_pending();
            if dropped > 0 {
                log::debug!("dropped {dropped} unfinished tool placeholder(s) at turn finish");
            }
            message.is_streaming = false;
        }
    }

    /// Process one raw blob: scan its lines, apply each chunk, and report
    /// whether a terminal condition was seen.
    ///
    /// A finish reason does not stop line processing; only the `[DONE]`
    /// sentinel does, and by then nothing else can follow.
    fn process_raw(&mut self, session: &mut ChatSession, raw_chunk: &str) -> bool {
        let mut terminal = false;

        for event in wire::scan_data_lines(raw_chunk) {
            match event {
                SseEvent::Done => {
                    log::debug!("stream finished with done sentinel");
                    terminal = true;
                    break;
                }
                SseEvent::Payload(payload) => {
                    if let Some(chunk) = wire::parse_chunk(payload) {
                        if self.apply_chunk(session, chunk) {
                            terminal = true;
                        }
                    }
                }
            }
        }

        terminal
    }

    /// Apply one parsed chunk; returns true on a terminal finish reason.
    ///
    /// Within a chunk, tool-call bookkeeping runs before content: the
    /// content path asks whether calls are open to decide if a JSON blob
    /// is an echo of streaming arguments.
    fn apply_chunk(&mut self, session: &mut ChatSession, chunk: StreamChunk) -> bool {
        let Some(choice) = chunk.choices.into_iter().next() else {
            return false;
        };

        if let Some(model) = chunk.model {
            if session.agent_id.is_none() {
                log::debug!("agent id learned from stream: {model}");
                session.agent_id = Some(model);
            }
        }

        let Some(message) = session.last_message_mut() else {
            return false;
        };

        if let Some(tool_calls) = choice.delta.tool_calls {
            for delta in tool_calls {
                self.apply_tool_call_delta(message, delta);
            }
        }

        if let Some(content) = choice.delta.content {
            self.apply_content(message, &content);
        }

        if let Some(reason) = choice.finish_reason {
            if !self.slots.is_empty() {
                log::debug!("finalizing open tool calls on finish reason {reason}");
            }
            self.finalize_open_calls(message);
            return wire::is_terminal_finish_reason(&reason);
        }

        false
    }

    /// Route one tool-call fragment to its slot.
    fn apply_tool_call_delta(&mut self, message: &mut Message, delta: ToolCallDelta) {
        let slot = delta.index;
        let (name, arguments) = match delta.function {
            Some(function) => (function.name, function.arguments),
            None => (None, None),
        };

        // A fragment naming a call id that differs from the slot's current
        // occupant starts a new call: close out the occupant first.
        if let Some(call_id) = delta.id {
            let occupied_by_other = self
                .slots
                .get(&slot)
                .is_some_and(|open| open.call_id != call_id);
            let vacant = !self.slots.contains_key(&slot);

            if vacant || occupied_by_other {
                let Some(tool_name) = name else {
                    // Cannot open a call without a tool name; ignore the
                    // fragment rather than guessing an identity.
                    log::debug!("ignoring unnamed tool call fragment at slot {slot}");
                    return;
                };

                if occupied_by_other {
                    log::debug!("slot {slot} reused, closing previous call");
                    self.close_slot(message, slot);
                } else {
                    log::debug!("opening tool call {tool_name} ({call_id}) at slot {slot}");
                }

                self.slots.insert(
                    slot,
                    OpenCall {
                        call_id,
                        tool_name,
                        arguments: String::new(),
                    },
                );
            }
        }

        // Argument fragments accumulate into the slot's current call. A
        // fragment with no call id belongs to whoever holds the slot; one
        // with a mismatched id was handled above and now matches.
        let Some(arguments) = arguments else { return };
        if arguments.is_empty() {
            return;
        }
        if let Some(open) = self.slots.get_mut(&slot) {
            open.arguments.push_str(&arguments);
            message.upsert_pending(&open.tool_name, &open.call_id, &open.arguments);
        }
    }

    /// Close the call occupying a slot because the slot was reassigned.
    ///
    /// A replaced call with accumulated arguments is finalized eagerly
    /// (it will not get another chance) and marked processed so the batch
    /// finalize skips it. A replaced call that never accumulated anything
    /// leaves no trace.
    fn close_slot(&mut self, message: &mut Message, slot: u32) {
        let Some(old) = self.slots.remove(&slot) else {
            return;
        };

        if old.arguments.trim().is_empty() {
            message.remove_pending(&old.tool_name, &old.call_id);
            return;
        }

        match serde_json::from_str::<Map<String, Value>>(&old.arguments) {
            Ok(parsed) => {
                self.processed_call_ids.insert(old.call_id.clone());
                message.finalize_tool(ToolRecordItem::new(old.tool_name, old.call_id, parsed));
            }
            Err(err) => {
                log::warn!(
                    "failed to finalize replaced tool call {}: {err}",
                    old.tool_name
                );
                message.remove_pending(&old.tool_name, &old.call_id);
            }
        }
    }

    /// Finalize every still-open call, in slot order.
    fn finalize_open_calls(&mut self, message: &mut Message) {
        let slots = std::mem::take(&mut self.slots);

        for (slot, call) in slots {
            if self.processed_call_ids.contains(&call.call_id) {
                log::debug!("call {} already finalized, skipping", call.call_id);
                continue;
            }

            if call.arguments.trim().is_empty() {
                log::debug!(
                    "dropping tool call {} at slot {slot}: no arguments",
                    call.tool_name
                );
                message.remove_pending(&call.tool_name, &call.call_id);
                continue;
            }

            match serde_json::from_str::<Map<String, Value>>(&call.arguments) {
                Ok(parsed) => {
                    self.processed_call_ids.insert(call.call_id.clone());
                    message.finalize_tool(ToolRecordItem::new(call.tool_name, call.call_id, parsed));
                }
                Err(err) => {
                    // Truncated arguments are expected under abnormal
                    // termination; the placeholder is swept up when the
                    // turn settles.
                    log::warn!(
                        "dropping tool call {} with incomplete arguments: {err}",
                        call.tool_name
                    );
                }
            }
        }
    }

    /// Apply a free-text content delta.
    ///
    /// Some backends echo a tool's argument JSON back as plain content
    /// once the tool runs. A complete JSON object arriving while calls
    /// are still streaming is such an echo and is dropped; one carrying a
    /// tool discriminator with no calls in flight is spliced in as a
    /// finalized record (deduplicated). Everything else is text.
    fn apply_content(&mut self, message: &mut Message, content: &str) {
        if content.is_empty() {
            return;
        }

        let trimmed = content.trim();
        if trimmed.starts_with('{') && trimmed.ends_with('}') {
            if let Ok(mut parsed) = serde_json::from_str::<Map<String, Value>>(trimmed) {
                if !self.slots.is_empty() {
                    log::debug!("skipping JSON content echo while tool calls stream");
                    return;
                }

                if let Some(Value::String(tool_name)) = parsed.remove("tool_name_discriminator") {
                    let call_id = match parsed.remove("_tool_call_id") {
                        Some(Value::String(id)) => id,
                        _ => String::new(),
                    };
                    message.push_tool_record(ToolRecordItem::new(tool_name, call_id, parsed));
                    return;
                }
                // JSON without a discriminator reads as ordinary text
            }
        }

        message.append_text(content);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::ContentItem;

    fn session_with_placeholder() -> ChatSession {
        let mut session = ChatSession::new("test");
        session.messages.push(Message::user("question"));
        session.messages.push(Message::assistant_placeholder());
        session
    }

    fn data_line(json: &str) -> String {
        format!("data: {json}\n")
    }

    fn text_chunk(text: &str) -> String {
        data_line(&format!(
            r#"{{"choices":[{{"delta":{{"content":{}}},"finish_reason":null}}]}}"#,
            serde_json::to_string(text).unwrap()
        ))
    }

    fn tool_chunk(index: u32, id: &str, name: &str, args: &str) -> String {
        data_line(&format!(
            r#"{{"choices":[{{"delta":{{"tool_calls":[{{"index":{index},"id":{},"function":{{"name":{},"arguments":{}}}}}]}},"finish_reason":null}}]}}"#,
            serde_json::to_string(id).unwrap(),
            serde_json::to_string(name).unwrap(),
            serde_json::to_string(args).unwrap()
        ))
    }

    fn finish_chunk(reason: &str) -> String {
        data_line(&format!(
            r#"{{"choices":[{{"delta":{{}},"finish_reason":"{reason}"}}]}}"#
        ))
    }

    fn records(message: &Message) -> Vec<&ToolRecordItem> {
        message
            .content
            .iter()
            .filter_map(|item| match item {
                ContentItem::ToolRecord(record) => Some(record),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_text_fragments_assemble_into_one_item() {
        let mut assembler = StreamAssembler::new();
        let mut session = session_with_placeholder();
        let mut finishes = 0;

        for fragment in ["Hel", "lo", " world"] {
            assembler
                .ingest(&mut session, text_chunk(fragment), || {
                    finishes += 1;
                    async {}
                })
                .await;
        }
        assembler
            .ingest(&mut session, finish_chunk("stop"), || {
                finishes += 1;
                async {}
            })
            .await;

        let message = session.last_message().unwrap();
        assert_eq!(
            message.content,
            vec![ContentItem::Text("Hello world".to_string())]
        );
        assert!(!message.is_streaming);
        assert_eq!(finishes, 1);
    }

    #[tokio::test]
    async fn test_tool_call_accumulates_and_finalizes() {
        let mut assembler = StreamAssembler::new();
        let mut session = session_with_placeholder();

        assembler
            .ingest(
                &mut session,
                tool_chunk(0, "call_1", "websearchtool", "{\"query\":"),
                || async {},
            )
            .await;

        // Placeholder visible mid-stream
        assert!(session.last_message().unwrap().has_pending());

        assembler
            .ingest(
                &mut session,
                tool_chunk(0, "call_1", "websearchtool", "\"rust\"}"),
                || async {},
            )
            .await;
        assembler
            .ingest(&mut session, finish_chunk("tool_calls"), || async {})
            .await;

        let message = session.last_message().unwrap();
        assert!(!message.has_pending());
        let recs = records(message);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].tool_name, "websearchtool");
        assert_eq!(recs[0].call_id, "call_1");
        assert_eq!(recs[0].arguments["query"], "rust");
    }

    #[tokio::test]
    async fn test_slot_reuse_finalizes_old_call_eagerly() {
        let mut assembler = StreamAssembler::new();
        let mut session = session_with_placeholder();

        assembler
            .ingest(
                &mut session,
                tool_chunk(0, "a", "search", "{\"q\":1}"),
                || async {},
            )
            .await;
        assembler
            .ingest(
                &mut session,
                tool_chunk(0, "b", "fetch", "{\"u\":2}"),
                || async {},
            )
            .await;
        assembler
            .ingest(&mut session, finish_chunk("tool_calls"), || async {})
            .await;

        let message = session.last_message().unwrap();
        assert!(!message.has_pending());
        let recs = records(message);
        assert_eq!(recs.len(), 2);
        assert_eq!((recs[0].tool_name.as_str(), recs[0].call_id.as_str()), ("search", "a"));
        assert_eq!(recs[0].arguments["q"], 1);
        assert_eq!((recs[1].tool_name.as_str(), recs[1].call_id.as_str()), ("fetch", "b"));
        assert_eq!(recs[1].arguments["u"], 2);
    }

    #[tokio::test]
    async fn test_slot_reuse_with_empty_old_call_leaves_no_trace() {
        let mut assembler = StreamAssembler::new();
        let mut session = session_with_placeholder();

        assembler
            .ingest(&mut session, tool_chunk(0, "a", "search", ""), || async {})
            .await;
        assembler
            .ingest(
                &mut session,
                tool_chunk(0, "b", "fetch", "{\"u\":2}"),
                || async {},
            )
            .await;
        assembler
            .ingest(&mut session, finish_chunk("tool_calls"), || async {})
            .await;

        let message = session.last_message().unwrap();
        let recs = records(message);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].call_id, "b");
        assert!(!message.has_pending());
    }

    #[tokio::test]
    async fn test_finish_hook_fires_exactly_once() {
        let mut assembler = StreamAssembler::new();
        let mut session = session_with_placeholder();
        let mut finishes = 0;

        // Duplicate finish reasons plus the sentinel, across blobs
        let blob = format!(
            "{}{}data: [DONE]\n",
            finish_chunk("stop"),
            finish_chunk("stop")
        );
        assembler
            .ingest(&mut session, blob, || {
                finishes += 1;
                async {}
            })
            .await;
        assembler
            .ingest(&mut session, finish_chunk("tool_calls"), || {
                finishes += 1;
                async {}
            })
            .await;

        assert_eq!(finishes, 1);
    }

    #[tokio::test]
    async fn test_fragments_after_finish_reason_still_apply() {
        let mut assembler = StreamAssembler::new();
        let mut session = session_with_placeholder();
        let mut finishes = 0;

        // The finish-reason line precedes tool fragments in the same blob
        let blob = format!(
            "{}{}{}",
            tool_chunk(0, "call_1", "search", "{\"q\":1}"),
            finish_chunk("tool_calls"),
            "data: [DONE]\n"
        );
        assembler
            .ingest(&mut session, blob, || {
                finishes += 1;
                async {}
            })
            .await;

        let message = session.last_message().unwrap();
        assert_eq!(records(message).len(), 1);
        assert_eq!(finishes, 1);
    }

    #[tokio::test]
    async fn test_empty_argument_call_dropped_silently() {
        let mut assembler = StreamAssembler::new();
        let mut session = session_with_placeholder();
        let mut finishes = 0;

        let blob = format!(
            "{}{}data: [DONE]\n",
            tool_chunk(0, "c1", "clarificationtool", ""),
            finish_chunk("tool_calls")
        );
        assembler
            .ingest(&mut session, blob, || {
                finishes += 1;
                async {}
            })
            .await;

        let message = session.last_message().unwrap();
        assert!(records(message).is_empty());
        assert!(!message.has_pending());
        assert!(!message.is_streaming);
        assert_eq!(finishes, 1);
    }

    #[tokio::test]
    async fn test_truncated_arguments_drop_call_without_error() {
        let mut assembler = StreamAssembler::new();
        let mut session = session_with_placeholder();

        assembler
            .ingest(
                &mut session,
                tool_chunk(0, "call_1", "search", "{\"q\":\"unfinis"),
                || async {},
            )
            .await;
        assembler
            .ingest(&mut session, finish_chunk("stop"), || async {})
            .await;
        assembler
            .ingest(&mut session, "data: [DONE]\n", || async {})
            .await;

        let message = session.last_message().unwrap();
        assert!(records(message).is_empty());
        assert!(!message.has_pending());
    }

    #[tokio::test]
    async fn test_malformed_line_between_valid_lines() {
        let mut assembler = StreamAssembler::new();
        let mut session = session_with_placeholder();

        let blob = format!(
            "{}data: {{not valid}}\n{}",
            text_chunk("before "),
            text_chunk("after")
        );
        assembler.ingest(&mut session, blob, || async {}).await;

        let message = session.last_message().unwrap();
        assert_eq!(
            message.content,
            vec![ContentItem::Text("before after".to_string())]
        );
    }

    #[tokio::test]
    async fn test_fifo_order_under_interleaved_enqueue() {
        let mut assembler = StreamAssembler::new();
        let mut session = session_with_placeholder();

        // B lands in the queue while A has not been processed yet; one
        // drain applies both, in order.
        assembler.push_chunk(text_chunk("first "));
        assembler.push_chunk(text_chunk("second"));
        assembler.drain(&mut session, || async {}).await;

        let message = session.last_message().unwrap();
        assert_eq!(
            message.content,
            vec![ContentItem::Text("first second".to_string())]
        );
    }

    #[tokio::test]
    async fn test_json_echo_skipped_while_calls_stream() {
        let mut assembler = StreamAssembler::new();
        let mut session = session_with_placeholder();

        assembler
            .ingest(
                &mut session,
                tool_chunk(0, "call_1", "search", "{\"q\":1}"),
                || async {},
            )
            .await;
        // Echo of the argument JSON arrives as plain content mid-call
        assembler
            .ingest(&mut session, text_chunk("{\"q\":1}"), || async {})
            .await;
        assembler
            .ingest(&mut session, finish_chunk("tool_calls"), || async {})
            .await;

        let message = session.last_message().unwrap();
        assert_eq!(records(message).len(), 1);
        // No stray text item holding the echo
        assert!(
            !message
                .content
                .iter()
                .any(|item| matches!(item, ContentItem::Text(_)))
        );
    }

    #[tokio::test]
    async fn test_discriminated_json_content_becomes_record() {
        let mut assembler = StreamAssembler::new();
        let mut session = session_with_placeholder();

        assembler
            .ingest(
                &mut session,
                text_chunk(r#"{"answer":"done","tool_name_discriminator":"finalanswertool"}"#),
                || async {},
            )
            .await;

        let message = session.last_message().unwrap();
        let recs = records(message);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].tool_name, "finalanswertool");
        assert_eq!(recs[0].arguments["answer"], "done");
    }

    #[tokio::test]
    async fn test_plain_json_content_stays_text() {
        let mut assembler = StreamAssembler::new();
        let mut session = session_with_placeholder();

        assembler
            .ingest(&mut session, text_chunk(r#"{"just":"json"}"#), || async {})
            .await;

        let message = session.last_message().unwrap();
        assert_eq!(
            message.content,
            vec![ContentItem::Text(r#"{"just":"json"}"#.to_string())]
        );
    }

    #[tokio::test]
    async fn test_agent_id_learned_from_first_chunk() {
        let mut assembler = StreamAssembler::new();
        let mut session = session_with_placeholder();

        let blob = data_line(
            r#"{"model":"agent-42","choices":[{"delta":{"content":"hi"},"finish_reason":null}]}"#,
        );
        assembler.ingest(&mut session, blob, || async {}).await;

        assert_eq!(session.agent_id.as_deref(), Some("agent-42"));
    }

    #[tokio::test]
    async fn test_parallel_slots_accumulate_independently() {
        let mut assembler = StreamAssembler::new();
        let mut session = session_with_placeholder();

        assembler
            .ingest(&mut session, tool_chunk(0, "a", "search", "{\"q\""), || async {})
            .await;
        assembler
            .ingest(&mut session, tool_chunk(1, "b", "fetch", "{\"u\""), || async {})
            .await;
        assembler
            .ingest(&mut session, tool_chunk(0, "a", "search", ":1}"), || async {})
            .await;
        assembler
            .ingest(&mut session, tool_chunk(1, "b", "fetch", ":2}"), || async {})
            .await;
        assembler
            .ingest(&mut session, finish_chunk("tool_calls"), || async {})
            .await;

        let message = session.last_message().unwrap();
        let recs = records(message);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].arguments["q"], 1);
        assert_eq!(recs[1].arguments["u"], 2);
    }

    #[tokio::test]
    async fn test_continuation_fragment_without_id() {
        let mut assembler = StreamAssembler::new();
        let mut session = session_with_placeholder();

        assembler
            .ingest(&mut session, tool_chunk(0, "a", "search", "{\"q\""), || async {})
            .await;
        // Standard continuation delta: index + arguments only
        let continuation = data_line(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":":1}"}}]},"finish_reason":null}]}"#,
        );
        assembler.ingest(&mut session, continuation, || async {}).await;
        assembler
            .ingest(&mut session, finish_chunk("tool_calls"), || async {})
            .await;

        let recs_count = records(session.last_message().unwrap()).len();
        assert_eq!(recs_count, 1);
        assert_eq!(
            records(session.last_message().unwrap())[0].arguments["q"],
            1
        );
    }

    #[tokio::test]
    async fn test_reset_clears_turn_state() {
        let mut assembler = StreamAssembler::new();
        let mut session = session_with_placeholder();

        assembler
            .ingest(&mut session, tool_chunk(0, "a", "search", "{\"q\""), || async {})
            .await;
        assembler
            .ingest(&mut session, "data: [DONE]\n", || async {})
            .await;
        assert!(assembler.is_finished());

        assembler.reset();
        assert!(!assembler.is_finished());
        assert!(!assembler.has_open_calls());
    }
}
