//! Conversation transcript model and splicing operations.
//!
//! A transcript is an ordered sequence of [`Message`]s; each message holds an
//! ordered sequence of [`ContentItem`]s. During a streaming turn the last
//! message of the session is mutated in place: free text is merged into the
//! trailing text item, in-flight tool calls appear as pending placeholders,
//! and completed calls replace their placeholder with a finalized record at
//! the same position.
//!
//! # Wire shape
//!
//! The backend's transcript JSON mixes bare strings and objects inside the
//! content array:
//!
//! ```text
//! "content": [
//!   "Let me look that up.",
//!   { "query": "rust async", "tool_name_discriminator": "websearchtool",
//!     "_tool_call_id": "call_1" }
//! ]
//! ```
//!
//! [`ContentItem`] keeps that shape: text items serialize as bare strings,
//! finalized records serialize as their argument object with the
//! `tool_name_discriminator` / `_tool_call_id` fields injected, and pending
//! placeholders additionally carry `_streaming: true` plus the raw argument
//! preview in `_raw_content`. A placeholder never survives a completed turn,
//! so persisted transcripts only ever contain strings and finalized records.

use crate::types::{MessageRole, generate_message_id, generate_session_id};
use serde::de::Error as DeError;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// A tool call still being streamed: visible "in progress" marker.
///
/// Uniquely identified by `(tool_name, call_id)` within a message.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingToolItem {
    pub tool_name: String,
    pub call_id: String,
    /// Raw accumulated argument text, shown as a live preview
    pub partial_arguments: String,
}

/// A completed tool call: the parsed argument object plus its identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRecordItem {
    pub tool_name: String,
    pub call_id: String,
    pub arguments: Map<String, Value>,
}

impl ToolRecordItem {
    pub fn new(
        tool_name: impl Into<String>,
        call_id: impl Into<String>,
        arguments: Map<String, Value>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            call_id: call_id.into(),
            arguments,
        }
    }
}

/// One element of a message's content sequence
#[derive(Debug, Clone, PartialEq)]
pub enum ContentItem {
    /// Accumulated free text; adjacent fragments are merged
    Text(String),
    /// Streaming placeholder for a tool call still in flight
    PendingTool(PendingToolItem),
    /// Finalized tool record, spliced in place of its placeholder
    ToolRecord(ToolRecordItem),
}

impl Serialize for ContentItem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ContentItem::Text(text) => serializer.serialize_str(text),
            ContentItem::PendingTool(pending) => {
                let mut map = serializer.serialize_map(Some(4))?;
                map.serialize_entry("tool_name_discriminator", &pending.tool_name)?;
                map.serialize_entry("_tool_call_id", &pending.call_id)?;
                map.serialize_entry("_streaming", &true)?;
                map.serialize_entry("_raw_content", &pending.partial_arguments)?;
                map.end()
            }
            ContentItem::ToolRecord(record) => {
                let mut map = serializer.serialize_map(Some(record.arguments.len() + 2))?;
                for (key, value) in &record.arguments {
                    map.serialize_entry(key, value)?;
                }
                map.serialize_entry("tool_name_discriminator", &record.tool_name)?;
                if !record.call_id.is_empty() {
                    map.serialize_entry("_tool_call_id", &record.call_id)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for ContentItem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(text) => Ok(ContentItem::Text(text)),
            Value::Object(mut fields) => {
                let streaming = fields
                    .remove("_streaming")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                let tool_name = take_string(&mut fields, "tool_name_discriminator");
                let call_id = take_string(&mut fields, "_tool_call_id");

                if streaming {
                    let partial_arguments = take_string(&mut fields, "_raw_content");
                    Ok(ContentItem::PendingTool(PendingToolItem {
                        tool_name,
                        call_id,
                        partial_arguments,
                    }))
                } else {
                    Ok(ContentItem::ToolRecord(ToolRecordItem {
                        tool_name,
                        call_id,
                        arguments: fields,
                    }))
                }
            }
            other => Err(D::Error::custom(format!(
                "content item must be a string or object, got {other}"
            ))),
        }
    }
}

fn take_string(fields: &mut Map<String, Value>, key: &str) -> String {
    match fields.remove(key) {
        Some(Value::String(s)) => s,
        _ => String::new(),
    }
}

/// One intermediate step (reasoning or tool activity) behind an assistant
/// message reconstructed from stored history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolHistoryEntry {
    pub id: String,
    pub role: MessageRole,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: MessageRole,
    pub content: Vec<ContentItem>,
    #[serde(default)]
    pub is_streaming: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Intermediate steps behind this message, present on messages loaded
    /// from stored history
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_history: Vec<ToolHistoryEntry>,
}

impl Message {
    pub fn new(role: MessageRole, content: Vec<ContentItem>) -> Self {
        Self {
            id: generate_message_id(),
            role,
            content,
            is_streaming: false,
            error: None,
            tool_history: Vec::new(),
        }
    }

    /// Create a user message from plain text
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, vec![ContentItem::Text(text.into())])
    }

    /// Create the empty assistant message a streaming turn writes into
    pub fn assistant_placeholder() -> Self {
        let mut msg = Self::new(MessageRole::Assistant, Vec::new());
        msg.is_streaming = true;
        msg
    }

    /// Append a text fragment, merging with a trailing text item.
    ///
    /// Feeding `"Hel"`, `"lo"` produces the same content as feeding
    /// `"Hello"` once.
    pub fn append_text(&mut self, text: &str) {
        if let Some(ContentItem::Text(existing)) = self.content.last_mut() {
            existing.push_str(text);
        } else {
            self.content.push(ContentItem::Text(text.to_string()));
        }
    }

    /// Insert or update the streaming placeholder for one tool call.
    ///
    /// Located by `(tool_name, call_id)`; replaced in place when present,
    /// appended otherwise.
    pub fn upsert_pending(&mut self, tool_name: &str, call_id: &str, partial_arguments: &str) {
        let item = PendingToolItem {
            tool_name: tool_name.to_string(),
            call_id: call_id.to_string(),
            partial_arguments: partial_arguments.to_string(),
        };

        if let Some(position) = self.find_pending(tool_name, call_id) {
            self.content[position] = ContentItem::PendingTool(item);
        } else {
            self.content.push(ContentItem::PendingTool(item));
        }
    }

    /// Replace a tool call's placeholder with its finalized record.
    ///
    /// The record takes the placeholder's position in the sequence. When no
    /// placeholder exists (the call produced arguments without ever being
    /// previewed) the record is appended instead, subject to duplicate
    /// suppression. Returns false only when the record was dropped as a
    /// duplicate.
    pub fn finalize_tool(&mut self, record: ToolRecordItem) -> bool {
        if let Some(position) = self.find_pending(&record.tool_name, &record.call_id) {
            self.content[position] = ContentItem::ToolRecord(record);
            true
        } else {
            self.push_tool_record(record)
        }
    }

    /// Remove the streaming placeholder for one tool call, if present
    pub fn remove_pending(&mut self, tool_name: &str, call_id: &str) -> bool {
        if let Some(position) = self.find_pending(tool_name, call_id) {
            self.content.remove(position);
            true
        } else {
            false
        }
    }

    /// Drop every streaming placeholder.
    ///
    /// Called when a turn finishes: calls that never completed leave no
    /// trace in the settled transcript.
    pub fn clear_pending(&mut self) -> usize {
        let before = self.content.len();
        self.content
            .retain(|item| !matches!(item, ContentItem::PendingTool(_)));
        before - self.content.len()
    }

    /// Append a finalized record unless a structurally identical one exists.
    ///
    /// Returns false when the record was dropped as a duplicate.
    pub fn push_tool_record(&mut self, record: ToolRecordItem) -> bool {
        if self.has_duplicate_record(&record) {
            log::debug!(
                "skipping duplicate record for tool {}",
                record.tool_name
            );
            return false;
        }
        self.content.push(ContentItem::ToolRecord(record));
        true
    }

    /// Structural duplicate check against existing finalized records.
    ///
    /// Equality covers the full structural value, not just identifiers: two
    /// distinct calls sharing identical arguments differ in call id and are
    /// both kept. A candidate with no call id (a tool-output echo parsed
    /// out of plain content) matches on tool name and arguments alone.
    pub fn has_duplicate_record(&self, record: &ToolRecordItem) -> bool {
        self.content.iter().any(|item| match item {
            ContentItem::ToolRecord(existing) => {
                existing.tool_name == record.tool_name
                    && existing.arguments == record.arguments
                    && (record.call_id.is_empty() || existing.call_id == record.call_id)
            }
            _ => false,
        })
    }

    /// Whether any tool call is still streaming in this message
    pub fn has_pending(&self) -> bool {
        self.content
            .iter()
            .any(|item| matches!(item, ContentItem::PendingTool(_)))
    }

    fn find_pending(&self, tool_name: &str, call_id: &str) -> Option<usize> {
        self.content.iter().position(|item| {
            matches!(item, ContentItem::PendingTool(pending)
                if pending.tool_name == tool_name && pending.call_id == call_id)
        })
    }
}

/// One conversation owned by a session client.
///
/// The streaming pipeline mutates only the last message of `messages`,
/// appends in insertion order, and never reorders or deletes messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    /// Backend agent driving this conversation, once known. Extracted from
    /// the first streamed chunk's `model` field when not set up front.
    pub agent_id: Option<String>,
    /// Last observed backend agent state
    pub state: Option<String>,
}

impl ChatSession {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: generate_session_id(),
            title: title.into(),
            messages: Vec::new(),
            agent_id: None,
            state: None,
        }
    }

    /// Session bound to an existing backend agent
    pub fn with_agent(title: impl Into<String>, agent_id: impl Into<String>) -> Self {
        let mut session = Self::new(title);
        session.agent_id = Some(agent_id.into());
        session
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn last_message_mut(&mut self) -> Option<&mut Message> {
        self.messages.last_mut()
    }
}
