//! # Research Agent SDK
//!
//! A streaming-first Rust SDK for OpenAI-compatible deep-research agent
//! backends.
//!
//! ## Overview
//!
//! The backend exposes a chat-completions endpoint that streams a research
//! agent's work as Server-Sent Events: free text, reasoning payloads, and
//! tool calls whose JSON arguments arrive fragmented across many chunks.
//! This SDK reconstructs that stream into a coherent, mutable conversation
//! transcript a UI can render live: streaming placeholders appear while a
//! tool call is in flight and are spliced out for the finalized record the
//! moment it completes.
//!
//! ## Key Features
//!
//! - **Incremental transcript reconstruction**: text deltas merge, tool
//!   calls accumulate per slot and finalize in place
//! - **Robust stream handling**: malformed lines, slot reuse, truncated
//!   tool-call JSON and duplicate finish signals all degrade gracefully
//! - **At-most-once turn completion**: one completion signal per turn, no
//!   matter how the stream ends
//! - **Session management**: multi-turn conversations, agent clarification
//!   round-trips, history loading, chat administration
//! - **Retry logic**: exponential backoff with jitter for transient
//!   backend failures
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use research_agent::{ClientOptions, SessionClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = SessionClient::new(
//!         ClientOptions::builder()
//!             .base_url("http://localhost:8010")
//!             .build()?,
//!     )?;
//!
//!     client.send_message("Compare Rust async runtimes").await?;
//!
//!     for message in client.messages() {
//!         println!("{:?}: {} content item(s)", message.role, message.content.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Answering a clarification request
//!
//! Research agents can pause and ask the user to narrow the task. The
//! session surfaces that through the agent state; the answer goes through
//! [`SessionClient::provide_clarification`]:
//!
//! ```rust,no_run
//! # use research_agent::{ClientOptions, SessionClient};
//! # async fn example(client: &mut SessionClient) -> Result<(), Box<dyn std::error::Error>> {
//! if client.session().and_then(|s| s.state.as_deref()) == Some("waiting_for_clarification") {
//!     let agent_id = client
//!         .session()
//!         .and_then(|s| s.agent_id.clone())
//!         .expect("agent known once streaming started");
//!     client
//!         .provide_clarification(&agent_id, "Focus on embedded targets")
//!         .await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **session**: multi-turn session client driving turns end to end
//! - **assembler**: stream reassembly engine (chunk queue, tool-call
//!   accumulator, turn-finish coordination)
//! - **transcript**: transcript data model and splicing operations
//! - **wire**: SSE line decoding and the chunk wire model
//! - **api**: typed HTTP client for the backend's REST surface
//! - **history**: stored-history to transcript reconstruction
//! - **types**: configuration and shared types
//! - **error**: error types and conversions
//! - **retry**: exponential backoff retry logic

/// Typed HTTP client for the agent backend's REST and streaming surface.
mod api;

/// Stream reassembly engine: chunk queuing, tool-call accumulation and
/// turn-finish coordination.
mod assembler;

/// Environment/config helpers and backend endpoint paths.
mod config;

/// Error types and conversions used across all public APIs.
mod error;

/// Reconstruction of transcripts from the backend's stored chat history.
mod history;

/// Stateful session client for multi-turn streaming conversations.
mod session;

/// Transcript data model (sessions, messages, content items) and splicing.
mod transcript;

/// Configuration options and shared types.
mod types;

/// SSE line decoding and the chat-completions chunk wire model.
mod wire;

/// Retry utilities with exponential backoff and jitter.
/// Public as a module so users can reuse the retry machinery for their
/// own operations.
pub mod retry;

// --- Session API ---

pub use session::SessionClient;

// --- Backend API surface ---

pub use api::{
    AgentListItem, AgentListResponse, AgentStateResponse, ApiClient, AvailableModel,
    AvailableModelsResponse, ChatCompletionRequest, ChatDetailResponse, ChatListItem,
    ChatListResponse, CompletionMessage, DeleteChatResponse, HealthResponse, ProgressStream,
};

// --- Stream assembly ---

pub use assembler::StreamAssembler;
pub use wire::{
    ChunkDelta, DONE_SENTINEL, FunctionDelta, SseEvent, StreamChoice, StreamChunk, ToolCallDelta,
    is_terminal_finish_reason, parse_chunk, scan_data_lines,
};

// --- Transcript model ---

pub use transcript::{
    ChatSession, ContentItem, Message, PendingToolItem, ToolHistoryEntry, ToolRecordItem,
};

// --- History reconstruction ---

pub use history::{
    ChatHistoryResponse, ChatIteration, ChatTurn, HistoryMessage, HistoryToolCall,
    HistoryToolFunction, messages_from_history,
};

// --- Configuration ---

pub use config::{get_api_key, get_base_url};
pub use types::{ClientOptions, ClientOptionsBuilder, MessageRole, StreamingState};

// --- Error handling ---

pub use error::{Error, Result};

/// Convenience module containing the most commonly used types.
/// Import with `use research_agent::prelude::*;`.
pub mod prelude {
    pub use crate::{
        ChatSession, ClientOptions, ClientOptionsBuilder, ContentItem, Error, Message,
        MessageRole, Result, SessionClient, StreamAssembler, ToolRecordItem,
    };
}
