//! Core configuration and shared types for the research agent SDK

use crate::config;
use serde::{Deserialize, Serialize};

/// Options for configuring a [`crate::SessionClient`]
#[derive(Clone)]
pub struct ClientOptions {
    /// Base URL of the agent backend (e.g. "http://localhost:8010")
    pub base_url: String,

    /// API key, if the backend requires one
    pub api_key: Option<String>,

    /// Opaque user identifier forwarded with completion requests
    pub user_id: Option<String>,

    /// Request timeout in seconds for non-streaming calls.
    /// Streaming requests are not bounded by this (a research turn can
    /// legitimately run for minutes).
    pub timeout: u64,

    /// Total attempts for non-streaming calls (1 = no retry)
    pub retry_attempts: u32,

    /// Initial delay between retries in milliseconds
    pub retry_delay_ms: u64,
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("user_id", &self.user_id)
            .field("timeout", &self.timeout)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .finish()
    }
}

impl ClientOptions {
    /// Create a new builder for ClientOptions
    pub fn builder() -> ClientOptionsBuilder {
        ClientOptionsBuilder::default()
    }
}

/// Builder for ClientOptions
#[derive(Debug, Default)]
pub struct ClientOptionsBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    user_id: Option<String>,
    timeout: Option<u64>,
    retry_attempts: Option<u32>,
    retry_delay_ms: Option<u64>,
}

impl ClientOptionsBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn user_id(mut self, id: impl Into<String>) -> Self {
        self.user_id = Some(id.into());
        self
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(secs);
        self
    }

    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }

    pub fn retry_delay_ms(mut self, millis: u64) -> Self {
        self.retry_delay_ms = Some(millis);
        self
    }

    pub fn build(self) -> crate::Result<ClientOptions> {
        let base_url = self
            .base_url
            .ok_or_else(|| crate::Error::config("base_url is required"))?;

        Ok(ClientOptions {
            base_url,
            api_key: self.api_key,
            user_id: self.user_id,
            timeout: self.timeout.unwrap_or(config::DEFAULT_TIMEOUT_SECS),
            retry_attempts: self
                .retry_attempts
                .unwrap_or(config::DEFAULT_RETRY_ATTEMPTS),
            retry_delay_ms: self
                .retry_delay_ms
                .unwrap_or(config::DEFAULT_RETRY_DELAY_MS),
        })
    }
}

/// Message role in the conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

/// Streaming lifecycle state for one session.
///
/// One turn is active at a time; `is_streaming` doubles as the
/// re-entrancy guard for new sends.
#[derive(Debug, Clone, Default)]
pub struct StreamingState {
    pub is_streaming: bool,
    pub current_message_id: Option<String>,
    pub error: Option<String>,
    pub is_retrying: bool,
}

impl StreamingState {
    /// Reset to the idle state
    pub fn clear(&mut self) {
        *self = StreamingState::default();
    }
}

/// Generate a unique message id
pub(crate) fn generate_message_id() -> String {
    format!("msg_{:08x}{:08x}", rand::random::<u32>(), rand::random::<u32>())
}

/// Generate a unique session id
pub(crate) fn generate_session_id() -> String {
    format!("chat_{:08x}{:08x}", rand::random::<u32>(), rand::random::<u32>())
}
