//! Reconstruction of transcripts from stored chat history.
//!
//! The backend persists conversations in a structured turn/iteration
//! format: each turn pairs the user's message with the agent's iterations,
//! and each iteration records a reasoning step plus the tool action it
//! took. [`messages_from_history`] folds that structure back into the flat
//! transcript shape the session renders: one user message per turn, and
//! one assistant message carrying the final answer with the intermediate
//! steps attached as tool history.

use crate::transcript::{ContentItem, Message, ToolHistoryEntry};
use crate::types::MessageRole;
use serde::Deserialize;
use serde_json::Value;

/// Tool the agent answers with; its payload's `response` field is the
/// user-facing text of the turn.
const RESPONSE_TOOL: &str = "responsetool";

/// Tool name attached to reasoning steps in reconstructed history
const REASONING_TOOL: &str = "reasoningtool";

/// One stored message inside a turn or iteration
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryMessage {
    pub id: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<HistoryToolCall>>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub created_at: String,
}

/// A stored tool call reference
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: HistoryToolFunction,
}

/// Stored function name/arguments of a tool call
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryToolFunction {
    pub name: String,
    pub arguments: String,
}

/// One reasoning/action iteration within a turn
#[derive(Debug, Clone, Deserialize)]
pub struct ChatIteration {
    pub iteration: u32,
    #[serde(default)]
    pub reasoning_message: Option<HistoryMessage>,
    #[serde(default)]
    pub reasoning_result: Option<HistoryMessage>,
    #[serde(default)]
    pub action_message: Option<HistoryMessage>,
    #[serde(default)]
    pub action_result: Option<HistoryMessage>,
}

/// One user turn with the agent's iterations
#[derive(Debug, Clone, Deserialize)]
pub struct ChatTurn {
    pub user_message: HistoryMessage,
    #[serde(default)]
    pub iterations: Vec<ChatIteration>,
}

/// Response of `GET /v1/chats/{id}/history`
#[derive(Debug, Clone, Deserialize)]
pub struct ChatHistoryResponse {
    pub chat_id: String,
    pub agent_id: String,
    #[serde(default)]
    pub turns: Vec<ChatTurn>,
    #[serde(default)]
    pub total_turns: u64,
    #[serde(default)]
    pub total_iterations: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
}

/// Fold a structured history response into transcript messages.
pub fn messages_from_history(history: &ChatHistoryResponse) -> Vec<Message> {
    let mut messages = Vec::new();

    if history.turns.is_empty() {
        log::debug!("no turns in chat history {}", history.chat_id);
        return messages;
    }

    for turn in &history.turns {
        let mut user = Message::new(
            MessageRole::User,
            vec![ContentItem::Text(
                turn.user_message.content.clone().unwrap_or_default(),
            )],
        );
        user.id = turn.user_message.id.clone();
        messages.push(user);

        if turn.iterations.is_empty() {
            continue;
        }

        let mut tool_history = Vec::new();
        let mut final_response = String::new();
        let mut final_response_id = String::new();

        for iteration in &turn.iterations {
            if let Some(reasoning) = &iteration.reasoning_result {
                if let Some(content) = &reasoning.content {
                    tool_history.push(ToolHistoryEntry {
                        id: reasoning.id.clone(),
                        role: MessageRole::Assistant,
                        content: Some(format_reasoning_content(content)),
                        tool_name: Some(REASONING_TOOL.to_string()),
                        tool_call_id: reasoning.tool_call_id.clone(),
                        iteration: Some(iteration.iteration),
                    });
                }
            }

            let Some(action) = &iteration.action_result else {
                continue;
            };

            if action.tool_name.as_deref() == Some(RESPONSE_TOOL) {
                final_response = extract_response_text(action.content.as_deref());
                final_response_id = action.id.clone();
            } else {
                tool_history.push(ToolHistoryEntry {
                    id: action.id.clone(),
                    role: MessageRole::Tool,
                    content: action.content.clone(),
                    tool_name: Some(
                        action
                            .tool_name
                            .clone()
                            .unwrap_or_else(|| "unknown".to_string()),
                    ),
                    tool_call_id: action.tool_call_id.clone(),
                    iteration: Some(iteration.iteration),
                });
            }
        }

        // A turn without a final response (agent still working, or cut
        // short) contributes only its user message.
        if !final_response.is_empty() {
            let mut assistant = Message::new(
                MessageRole::Assistant,
                vec![ContentItem::Text(final_response)],
            );
            assistant.id = final_response_id;
            assistant.tool_history = tool_history;
            messages.push(assistant);
        }
    }

    log::debug!(
        "loaded {} messages from {} turns",
        messages.len(),
        history.turns.len()
    );
    messages
}

/// Render stored reasoning content for display.
///
/// Reasoning payloads are JSON with a `reasoning_steps` string array;
/// those render as bullet lines. Anything else passes through untouched.
fn format_reasoning_content(content: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(content) else {
        return content.to_string();
    };

    let steps: Vec<&str> = value
        .get("reasoning_steps")
        .and_then(Value::as_array)
        .map(|steps| steps.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    if steps.is_empty() {
        return content.to_string();
    }

    steps
        .iter()
        .map(|step| format!("• {step}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Pull the user-facing text out of a response-tool payload
fn extract_response_text(content: Option<&str>) -> String {
    let Some(content) = content else {
        return String::new();
    };

    match serde_json::from_str::<Value>(content) {
        Ok(value) => value
            .get("response")
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .unwrap_or_else(|| content.to_string()),
        Err(_) => content.to_string(),
    }
}
