//! HTTP client for the agent backend's REST surface.
//!
//! [`ApiClient`] wraps a reusable `reqwest::Client` with the backend's
//! endpoints: health, agent inspection, model listing, the chat-history
//! suite, and the two streaming endpoints (chat completions and agent
//! clarification).
//!
//! Non-streaming calls carry a per-request timeout and go through the
//! conditional retry policy in [`crate::retry`]. Streaming calls are not
//! time-bounded (a research turn can legitimately run for minutes) and
//! deliver progress as **cumulative** response text: after every network
//! chunk the sink is handed the whole body observed so far, and the
//! consumer slices off the fresh suffix itself. That keeps the transport
//! dumb and pushes all sequencing decisions into the stream assembler.

use crate::config::endpoints;
use crate::retry::{RetryConfig, retry_with_backoff_conditional};
use crate::types::ClientOptions;
use crate::{Error, Result};
use futures::StreamExt;
use futures::stream::Stream;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;
use std::time::Duration;

/// A pinned, boxed stream of cumulative response-text snapshots.
///
/// Each item carries the whole body text observed so far for one streaming
/// request; consumers track their last-seen length and slice off the fresh
/// suffix.
pub type ProgressStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Health probe response
#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

/// One agent in the backend's listing
#[derive(Debug, Clone, Deserialize)]
pub struct AgentListItem {
    pub agent_id: String,
    pub task: String,
    pub state: String,
    pub creation_time: String,
}

/// Response of `GET /agents`
#[derive(Debug, Clone, Deserialize)]
pub struct AgentListResponse {
    pub agents: Vec<AgentListItem>,
    pub total: u64,
}

/// Response of `GET /agents/{id}/state`
#[derive(Debug, Clone, Deserialize)]
pub struct AgentStateResponse {
    pub agent_id: String,
    pub task: String,
    pub state: String,
    #[serde(default)]
    pub iteration: u32,
    #[serde(default)]
    pub searches_used: u32,
    #[serde(default)]
    pub clarifications_used: u32,
    #[serde(default)]
    pub sources_count: u32,
    #[serde(default)]
    pub current_step_reasoning: Option<Value>,
}

/// One model in `GET /v1/models`
#[derive(Debug, Clone, Deserialize)]
pub struct AvailableModel {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

/// Response of `GET /v1/models`
#[derive(Debug, Clone, Deserialize)]
pub struct AvailableModelsResponse {
    pub data: Vec<AvailableModel>,
}

/// One message of a completion request
#[derive(Debug, Clone, Serialize)]
pub struct CompletionMessage {
    pub role: String,
    pub content: String,
}

/// Request body for `POST /v1/chat/completions`.
///
/// `model` doubles as the agent id when continuing an existing
/// conversation; `None` asks the backend to spin up a fresh agent.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: Option<String>,
    pub messages: Vec<CompletionMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub user_id: Option<String>,
}

impl ChatCompletionRequest {
    /// Streaming request carrying a single user message
    pub fn user(model: Option<String>, content: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            model,
            messages: vec![CompletionMessage {
                role: "user".to_string(),
                content: content.into(),
            }],
            stream: true,
            max_tokens: None,
            temperature: None,
            user_id,
        }
    }
}

/// Request body for the clarification endpoint
#[derive(Debug, Clone, Serialize)]
struct ClarificationRequest {
    clarifications: String,
}

/// One chat in the backend's history listing
#[derive(Debug, Clone, Deserialize)]
pub struct ChatListItem {
    pub id: String,
    pub agent_id: String,
    pub agent_type: String,
    pub initial_task: String,
    pub state: String,
    pub created_at: String,
    #[serde(default)]
    pub last_message_at: Option<String>,
    #[serde(default)]
    pub total_messages: u64,
    #[serde(default)]
    pub total_iterations: u64,
    #[serde(default)]
    pub searches_used: u64,
}

/// Response of `GET /v1/chats`
#[derive(Debug, Clone, Deserialize)]
pub struct ChatListResponse {
    pub chats: Vec<ChatListItem>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

/// Response of `GET /v1/chats/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct ChatDetailResponse {
    pub id: String,
    pub agent_id: String,
    pub agent_type: String,
    pub initial_task: String,
    pub state: String,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<String>,
    #[serde(default)]
    pub total_messages: u64,
    #[serde(default)]
    pub total_iterations: u64,
    #[serde(default)]
    pub searches_used: u64,
    #[serde(default)]
    pub is_archived: bool,
}

/// Response of `DELETE /v1/chats/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteChatResponse {
    pub success: bool,
    pub message: String,
    pub agent_id: String,
}

/// Typed HTTP client for the agent backend
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    retry: RetryConfig,
}

impl ApiClient {
    pub fn new(options: &ClientOptions) -> Result<Self> {
        // No client-wide timeout: it would also bound streaming bodies.
        // Non-streaming requests get a per-request deadline instead.
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            api_key: options.api_key.clone(),
            timeout: Duration::from_secs(options.timeout),
            retry: RetryConfig::default()
                .with_max_attempts(options.retry_attempts.max(1))
                .with_initial_delay(Duration::from_millis(options.retry_delay_ms)),
        })
    }

    /// Check backend health
    pub async fn health(&self) -> Result<HealthResponse> {
        self.get_json(endpoints::HEALTH, &[]).await
    }

    /// List all agents
    pub async fn list_agents(&self) -> Result<AgentListResponse> {
        self.get_json(endpoints::AGENTS, &[]).await
    }

    /// Fetch one agent's current state
    pub async fn agent_state(&self, agent_id: &str) -> Result<AgentStateResponse> {
        self.get_json(&endpoints::agent_state(agent_id), &[]).await
    }

    /// List available models
    pub async fn list_models(&self) -> Result<AvailableModelsResponse> {
        self.get_json(endpoints::MODELS, &[]).await
    }

    /// List chats with pagination
    pub async fn list_chats(&self, page: u32, page_size: u32) -> Result<ChatListResponse> {
        self.get_json(
            endpoints::CHATS,
            &[("page", page.to_string()), ("page_size", page_size.to_string())],
        )
        .await
    }

    /// Fetch one chat's details
    pub async fn chat_detail(&self, agent_id: &str) -> Result<ChatDetailResponse> {
        self.get_json(&endpoints::chat_detail(agent_id), &[]).await
    }

    /// Fetch one chat's structured message history
    pub async fn chat_history(
        &self,
        agent_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<crate::history::ChatHistoryResponse> {
        self.get_json(
            &endpoints::chat_history(agent_id),
            &[("page", page.to_string()), ("page_size", page_size.to_string())],
        )
        .await
    }

    /// Delete a chat and its associated data
    pub async fn delete_chat(&self, agent_id: &str) -> Result<DeleteChatResponse> {
        let url = self.url(&endpoints::chat_detail(agent_id));
        retry_with_backoff_conditional(self.retry.clone(), || {
            let url = url.clone();
            async move {
                let response = self
                    .request(Method::DELETE, &url)
                    .timeout(self.timeout)
                    .send()
                    .await
                    .map_err(Error::Http)?;
                let response = Self::error_for_status(response).await?;
                response.json().await.map_err(Error::Http)
            }
        })
        .await
    }

    /// Start a streaming chat completion.
    ///
    /// Returns a stream yielding the cumulative response text after every
    /// network chunk.
    pub async fn streaming_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ProgressStream> {
        let response = self
            .request(Method::POST, &self.url(endpoints::CHAT_COMPLETIONS))
            .header("Accept", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .json(request)
            .send()
            .await
            .map_err(Error::Http)?;
        let response = Self::error_for_status(response).await?;

        Ok(Self::progress_stream(response))
    }

    /// Provide a clarification to a waiting agent, streaming the response.
    pub async fn streaming_clarification(
        &self,
        agent_id: &str,
        clarification: &str,
    ) -> Result<ProgressStream> {
        let body = ClarificationRequest {
            clarifications: clarification.to_string(),
        };
        let response = self
            .request(Method::POST, &self.url(&endpoints::agent_clarification(agent_id)))
            .header("Accept", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .json(&body)
            .send()
            .await
            .map_err(Error::Http)?;
        let response = Self::error_for_status(response).await?;

        Ok(Self::progress_stream(response))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut builder = self.http.request(method, url);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self.url(path);
        retry_with_backoff_conditional(self.retry.clone(), || {
            let url = url.clone();
            async move {
                let response = self
                    .request(Method::GET, &url)
                    .query(query)
                    .timeout(self.timeout)
                    .send()
                    .await
                    .map_err(Error::Http)?;
                let response = Self::error_for_status(response).await?;
                response.json::<T>().await.map_err(Error::Http)
            }
        })
        .await
    }

    /// Map non-success statuses to typed errors before touching the body
    async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::rate_limited(rate_limit_message(&body)));
        }
        Err(Error::api(format!("{status}: {body}")))
    }

    /// Turn a streaming body into cumulative text snapshots.
    fn progress_stream(response: reqwest::Response) -> ProgressStream {
        let state = ProgressDecoder {
            bytes: response
                .bytes_stream()
                .map(|result| result.map(|chunk| chunk.to_vec()))
                .boxed(),
            buffer: String::new(),
            partial: Vec::new(),
            done: false,
        };

        Box::pin(futures::stream::unfold(state, |mut decoder| async move {
            if decoder.done {
                return None;
            }

            match decoder.bytes.next().await {
                Some(Ok(chunk)) => {
                    decoder.absorb(&chunk);
                    Some((Ok(decoder.buffer.clone()), decoder))
                }
                Some(Err(err)) => {
                    decoder.done = true;
                    Some((Err(Error::Http(err)), decoder))
                }
                None => {
                    decoder.done = true;
                    if decoder.flush_tail() {
                        Some((Ok(decoder.buffer.clone()), decoder))
                    } else {
                        None
                    }
                }
            }
        }))
    }
}

/// Incremental UTF-8 decode state for one streaming body.
///
/// Network chunks can split UTF-8 code points; trailing incomplete bytes
/// are held back until the next chunk completes them so delivered text
/// never contains replacement characters for data merely still in flight.
struct ProgressDecoder {
    bytes: Pin<Box<dyn Stream<Item = reqwest::Result<Vec<u8>>> + Send>>,
    buffer: String,
    partial: Vec<u8>,
    done: bool,
}

impl ProgressDecoder {
    fn absorb(&mut self, chunk: &[u8]) {
        self.partial.extend_from_slice(chunk);

        match std::str::from_utf8(&self.partial) {
            Ok(text) => {
                self.buffer.push_str(text);
                self.partial.clear();
            }
            Err(err) if err.error_len().is_none() => {
                // Incomplete code point at the tail; keep it for later
                let valid = err.valid_up_to();
                self.buffer
                    .push_str(&String::from_utf8_lossy(&self.partial[..valid]));
                self.partial.drain(..valid);
            }
            Err(_) => {
                // Genuinely invalid bytes mid-stream
                self.buffer
                    .push_str(&String::from_utf8_lossy(&self.partial));
                self.partial.clear();
            }
        }
    }

    /// Flush held-back bytes when the body ends mid code point
    fn flush_tail(&mut self) -> bool {
        if self.partial.is_empty() {
            return false;
        }
        let tail = std::mem::take(&mut self.partial);
        self.buffer.push_str(&String::from_utf8_lossy(&tail));
        true
    }
}

/// Pull a human-readable message out of a 429 body.
///
/// The backend answers limit violations with a structured payload
/// (`message`, `limit_type`, `used`, ...); fall back to the raw body or a
/// generic message when the shape is unexpected.
fn rate_limit_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value.get("message").and_then(Value::as_str) {
            return message.to_string();
        }
        if let Some(message) = value
            .get("detail")
            .and_then(|d| d.get("message"))
            .and_then(Value::as_str)
        {
            return message.to_string();
        }
    }
    if body.trim().is_empty() {
        "Rate limit exceeded".to_string()
    } else {
        body.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_request_serialization() {
        let request = ChatCompletionRequest::user(None, "find rust benchmarks", None);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], serde_json::Value::Null);
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "find rust benchmarks");
        // Unset generation knobs are omitted entirely
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_completion_request_with_agent_id_as_model() {
        let request =
            ChatCompletionRequest::user(Some("agent-7".to_string()), "continue", None);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "agent-7");
    }

    #[test]
    fn test_agent_state_deserialization() {
        let json = r#"{
            "agent_id": "agent-7",
            "task": "research rust async runtimes",
            "state": "waiting_for_clarification",
            "iteration": 3,
            "searches_used": 2,
            "clarifications_used": 1,
            "sources_count": 14,
            "current_step_reasoning": {"plan_status": "active"}
        }"#;

        let state: AgentStateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(state.agent_id, "agent-7");
        assert_eq!(state.state, "waiting_for_clarification");
        assert_eq!(state.iteration, 3);
        assert!(state.current_step_reasoning.is_some());
    }

    #[test]
    fn test_agent_state_defaults_for_missing_counters() {
        let json = r#"{"agent_id": "a", "task": "t", "state": "inited"}"#;
        let state: AgentStateResponse = serde_json::from_str(json).unwrap();
        assert_eq!(state.iteration, 0);
        assert_eq!(state.sources_count, 0);
    }

    #[test]
    fn test_chat_list_deserialization() {
        let json = r#"{
            "chats": [{
                "id": "c1",
                "agent_id": "agent-7",
                "agent_type": "research",
                "initial_task": "compare databases",
                "state": "completed",
                "created_at": "2025-06-01T10:00:00Z",
                "last_message_at": null,
                "total_messages": 12,
                "total_iterations": 4,
                "searches_used": 3
            }],
            "total": 1,
            "page": 1,
            "page_size": 20
        }"#;

        let list: ChatListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(list.chats.len(), 1);
        assert_eq!(list.chats[0].initial_task, "compare databases");
        assert_eq!(list.total, 1);
    }

    #[test]
    fn test_rate_limit_message_structured() {
        let body = r#"{"error":"limit","limit_type":"searches","limit":10,"used":10,"reset_at":"2025-06-02T00:00:00Z","message":"daily search quota used"}"#;
        assert_eq!(rate_limit_message(body), "daily search quota used");
    }

    #[test]
    fn test_rate_limit_message_fallbacks() {
        assert_eq!(rate_limit_message(""), "Rate limit exceeded");
        assert_eq!(rate_limit_message("slow down"), "slow down");
    }

    #[test]
    fn test_progress_decoder_holds_back_split_code_point() {
        let mut decoder = ProgressDecoder {
            bytes: futures::stream::empty::<reqwest::Result<Vec<u8>>>().boxed(),
            buffer: String::new(),
            partial: Vec::new(),
            done: false,
        };

        // "é" split across two network chunks
        decoder.absorb(&[b'c', b'a', b'f', 0xC3]);
        assert_eq!(decoder.buffer, "caf");

        decoder.absorb(&[0xA9]);
        assert_eq!(decoder.buffer, "café");
        assert!(decoder.partial.is_empty());
    }

    #[test]
    fn test_progress_decoder_flushes_truncated_tail() {
        let mut decoder = ProgressDecoder {
            bytes: futures::stream::empty::<reqwest::Result<Vec<u8>>>().boxed(),
            buffer: String::new(),
            partial: Vec::new(),
            done: false,
        };

        decoder.absorb(&[b'x', 0xC3]);
        assert!(decoder.flush_tail());
        assert_eq!(decoder.buffer, "x\u{FFFD}");
        assert!(!decoder.flush_tail());
    }

    #[test]
    fn test_client_construction_normalizes_base_url() {
        let options = ClientOptions::builder()
            .base_url("http://localhost:8010/")
            .build()
            .unwrap();
        let client = ApiClient::new(&options).unwrap();
        assert_eq!(client.url("/health"), "http://localhost:8010/health");
    }
}
