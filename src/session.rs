//! Stateful session client for streaming conversations.
//!
//! [`SessionClient`] owns one conversation ([`ChatSession`]) and the
//! stream-assembly machinery behind it. A turn runs end to end inside one
//! call: the user message and an empty streaming assistant placeholder are
//! appended, the completion (or clarification) request is issued, and every
//! progress snapshot from the transport is sliced into its fresh suffix
//! and fed through the [`StreamAssembler`] into the transcript. When the
//! stream signals the end of the turn the transcript is settled, transient
//! state is reset, and the agent's state is refreshed from the backend.
//!
//! # Re-entrancy
//!
//! One turn at a time: starting a send while a previous turn is still
//! streaming (or retrying) is rejected as a logged no-op, not an error.
//! The in-flight turn is never pre-empted; abandoning it is done by
//! clearing the session.
//!
//! # Error surface
//!
//! Transport-level failures (connection errors, non-success statuses,
//! rate limits) are recorded on the in-flight message and returned to the
//! caller. Everything that goes wrong *inside* the stream (malformed
//! lines, truncated tool-call JSON) degrades silently into a best-effort
//! transcript and is never surfaced as an error. After any failure the
//! client remains usable for new turns.

use crate::api::{ApiClient, ChatCompletionRequest, ProgressStream};
use crate::assembler::StreamAssembler;
use crate::history;
use crate::transcript::{ChatSession, Message};
use crate::types::{ClientOptions, StreamingState};
use crate::{Error, Result};
use futures::StreamExt;

/// Client for multi-turn streaming conversations with a research agent.
pub struct SessionClient {
    options: ClientOptions,
    api: ApiClient,
    session: Option<ChatSession>,
    streaming: StreamingState,
    assembler: StreamAssembler,
}

impl SessionClient {
    /// Creates a new client with the specified configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(options: ClientOptions) -> Result<Self> {
        let api = ApiClient::new(&options)?;
        Ok(Self {
            options,
            api,
            session: None,
            streaming: StreamingState::default(),
            assembler: StreamAssembler::new(),
        })
    }

    /// Typed access to the backend's REST surface (health, agents, models,
    /// chat listings)
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// The current conversation, if any
    pub fn session(&self) -> Option<&ChatSession> {
        self.session.as_ref()
    }

    /// Messages of the current conversation
    pub fn messages(&self) -> &[Message] {
        self.session
            .as_ref()
            .map(|s| s.messages.as_slice())
            .unwrap_or_default()
    }

    /// Whether a turn is currently streaming
    pub fn is_streaming(&self) -> bool {
        self.streaming.is_streaming
    }

    /// Error recorded for the last turn, if it failed at transport level
    pub fn streaming_error(&self) -> Option<&str> {
        self.streaming.error.as_deref()
    }

    /// Start a fresh conversation, replacing any current one
    pub fn start_session(&mut self) -> &ChatSession {
        self.assembler.reset();
        self.streaming.clear();
        self.session.insert(ChatSession::new("New Chat"))
    }

    /// Drop the current conversation and all transient turn state
    pub fn clear_session(&mut self) {
        self.session = None;
        self.assembler.reset();
        self.streaming.clear();
    }

    /// Append a user message without starting a turn
    pub fn add_user_message(&mut self, content: &str) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Err(Error::invalid_input("no active session"));
        };
        session.messages.push(Message::user(content.trim()));
        Ok(())
    }

    /// Send a user message and stream the agent's response into the
    /// transcript.
    ///
    /// Creates a session on first use. The request's model field carries
    /// the session's agent id when one is known; otherwise the backend
    /// spins up a fresh agent and its id is learned from the stream.
    ///
    /// A call while a turn is already active is a logged no-op.
    pub async fn send_message(&mut self, content: &str) -> Result<()> {
        let content = content.trim().to_string();
        if content.is_empty() {
            return Ok(());
        }
        if self.turn_active() {
            log::warn!("streaming already in progress, ignoring send");
            return Ok(());
        }

        if self.session.is_none() {
            self.session = Some(ChatSession::new("New Chat"));
        }
        let model = self.session.as_ref().and_then(|s| s.agent_id.clone());

        self.begin_turn(&content, true)?;

        let request =
            ChatCompletionRequest::user(model, content, self.options.user_id.clone());
        match self.api.streaming_completion(&request).await {
            Ok(stream) => self.run_turn(stream).await,
            Err(err) => {
                self.record_turn_error(&err);
                Err(err)
            }
        }
    }

    /// Continue a conversation with a known agent.
    ///
    /// Same turn flow as [`send_message`](Self::send_message), addressed
    /// at an existing agent by passing its id as the request model.
    pub async fn continue_conversation(&mut self, agent_id: &str, content: &str) -> Result<()> {
        let content = content.trim().to_string();
        if content.is_empty() {
            return Ok(());
        }
        if self.turn_active() {
            log::warn!("streaming already in progress, ignoring send");
            return Ok(());
        }

        if self.session.is_none() {
            self.session = Some(ChatSession::with_agent("New Chat", agent_id));
        }

        self.begin_turn(&content, true)?;

        let request = ChatCompletionRequest::user(
            Some(agent_id.to_string()),
            content,
            self.options.user_id.clone(),
        );
        match self.api.streaming_completion(&request).await {
            Ok(stream) => self.run_turn(stream).await,
            Err(err) => {
                self.record_turn_error(&err);
                Err(err)
            }
        }
    }

    /// Answer an agent's clarification request and stream its follow-up.
    ///
    /// Unlike a normal send, the user's answer goes to the dedicated
    /// clarification endpoint and only an assistant placeholder is added
    /// to the transcript.
    pub async fn provide_clarification(
        &mut self,
        agent_id: &str,
        clarification: &str,
    ) -> Result<()> {
        let clarification = clarification.trim().to_string();
        if clarification.is_empty() {
            return Ok(());
        }
        if self.turn_active() {
            log::warn!("streaming already in progress, ignoring clarification");
            return Ok(());
        }
        if self.session.is_none() {
            return Err(Error::invalid_input(
                "no active session to clarify; load or start one first",
            ));
        }

        // The previous assistant message stopped at the clarification
        // question; it is settled now.
        if let Some(session) = self.session.as_mut() {
            session.agent_id.get_or_insert_with(|| agent_id.to_string());
            if let Some(last) = session.last_message_mut() {
                if last.is_streaming {
                    last.is_streaming = false;
                }
            }
        }

        self.begin_turn(&clarification, false)?;

        match self.api.streaming_clarification(agent_id, &clarification).await {
            Ok(stream) => self.run_turn(stream).await,
            Err(err) => {
                self.record_turn_error(&err);
                Err(err)
            }
        }
    }

    /// Load an existing chat (details + message history) into the session
    pub async fn load_chat(&mut self, agent_id: &str) -> Result<()> {
        let detail = self.api.chat_detail(agent_id).await?;
        let history_response = self.api.chat_history(agent_id, 1, 50).await?;

        let mut session = ChatSession::with_agent(detail.initial_task, agent_id);
        session.state = Some(detail.state);
        session.messages = history::messages_from_history(&history_response);

        self.assembler.reset();
        self.streaming.clear();
        self.session = Some(session);
        Ok(())
    }

    /// Delete a chat on the backend; clears the session if it was loaded
    pub async fn delete_chat(&mut self, agent_id: &str) -> Result<bool> {
        let response = self.api.delete_chat(agent_id).await?;
        if response.success
            && self
                .session
                .as_ref()
                .is_some_and(|s| s.agent_id.as_deref() == Some(agent_id))
        {
            self.clear_session();
        }
        Ok(response.success)
    }

    fn turn_active(&self) -> bool {
        self.streaming.is_streaming || self.streaming.is_retrying
    }

    /// Push the turn's messages and arm the streaming state.
    ///
    /// `with_user_message` is false for clarification turns, where the
    /// user's text travels out of band.
    fn begin_turn(&mut self, content: &str, with_user_message: bool) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Err(Error::other("internal: turn started without a session"));
        };

        if with_user_message {
            session.messages.push(Message::user(content));
        }
        let placeholder = Message::assistant_placeholder();
        let placeholder_id = placeholder.id.clone();
        session.messages.push(placeholder);

        self.streaming = StreamingState {
            is_streaming: true,
            current_message_id: Some(placeholder_id),
            error: None,
            is_retrying: false,
        };
        self.assembler.reset();
        Ok(())
    }

    /// Drive one turn's progress stream to completion.
    ///
    /// Each snapshot carries the cumulative response text; the fresh
    /// suffix since the last snapshot is what gets ingested. Ordering is
    /// the transport's arrival order, applied strictly FIFO by the
    /// assembler.
    async fn run_turn(&mut self, mut stream: ProgressStream) -> Result<()> {
        let mut received_len = 0usize;

        while let Some(event) = stream.next().await {
            let text = match event {
                Ok(text) => text,
                Err(err) => {
                    self.record_turn_error(&err);
                    return Err(err);
                }
            };

            let fresh = text.get(received_len..).unwrap_or_default().to_string();
            received_len = text.len();
            if fresh.is_empty() {
                continue;
            }

            let Self {
                assembler,
                session,
                streaming,
                ..
            } = &mut *self;
            if let Some(session) = session.as_mut() {
                assembler
                    .ingest(session, fresh, || {
                        streaming.is_streaming = false;
                        log::debug!("turn finished, streaming flag cleared");
                        async {}
                    })
                    .await;
            }
        }

        self.finish_turn().await;
        Ok(())
    }

    /// Close out a turn after the transport stream ends.
    async fn finish_turn(&mut self) {
        if !self.assembler.is_finished() {
            // The connection closed without [DONE] or a finish reason.
            // Close the turn anyway so the session doesn't stay wedged.
            log::warn!("stream ended without a terminal condition, settling turn");
            if let Some(message) = self.session.as_mut().and_then(|s| s.last_message_mut()) {
                message.clear_pending();
                message.is_streaming = false;
            }
        }

        self.streaming.clear();
        self.assembler.reset();

        let agent_id = self.session.as_ref().and_then(|s| s.agent_id.clone());
        let Some(agent_id) = agent_id else {
            log::warn!("cannot refresh agent state: agent id unknown");
            return;
        };

        match self.api.agent_state(&agent_id).await {
            Ok(state) => {
                log::debug!("agent {agent_id} state: {}", state.state);
                if let Some(session) = self.session.as_mut() {
                    session.state = Some(state.state);
                }
            }
            Err(err) => log::error!("failed to refresh agent state: {err}"),
        }
    }

    /// Record a transport failure on the in-flight message and reset.
    fn record_turn_error(&mut self, err: &Error) {
        let description = match err {
            Error::RateLimited(message) => message.clone(),
            other => other.to_string(),
        };
        log::error!("streaming turn failed: {description}");

        self.streaming.error = Some(description.clone());
        self.streaming.is_streaming = false;
        self.streaming.is_retrying = false;

        if let Some(message) = self.session.as_mut().and_then(|s| s.last_message_mut()) {
            message.error = Some(description);
            message.is_streaming = false;
        }

        self.assembler.reset();
    }
}
