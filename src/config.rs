//! Configuration helpers for the research agent SDK

use std::env;

/// Default request timeout in seconds for non-streaming API calls
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default number of attempts for non-streaming API calls (1 = no retry)
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 2;

/// Default initial delay between retries in milliseconds
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Get the backend base URL from environment variable or fallback
///
/// Priority:
/// 1. RESEARCH_AGENT_BASE_URL environment variable
/// 2. fallback parameter
/// 3. local development default
///
/// # Examples
///
/// ```rust,no_run
/// use research_agent::get_base_url;
///
/// // Read from environment
/// let url = get_base_url(None);
///
/// // With fallback
/// let url = get_base_url(Some("http://localhost:8010"));
/// ```
pub fn get_base_url(fallback: Option<&str>) -> String {
    if let Ok(url) = env::var("RESEARCH_AGENT_BASE_URL") {
        return url;
    }

    fallback.unwrap_or("http://localhost:8010").to_string()
}

/// Get the API key from environment variable or fallback
///
/// Most self-hosted backends don't require one.
pub fn get_api_key(fallback: Option<&str>) -> Option<String> {
    if let Ok(key) = env::var("RESEARCH_AGENT_API_KEY") {
        return Some(key);
    }

    fallback.map(|s| s.to_string())
}

/// Endpoint path builders for the agent backend's REST surface.
pub(crate) mod endpoints {
    pub const HEALTH: &str = "/health";
    pub const AGENTS: &str = "/agents";
    pub const MODELS: &str = "/v1/models";
    pub const CHAT_COMPLETIONS: &str = "/v1/chat/completions";
    pub const CHATS: &str = "/v1/chats";

    pub fn agent_state(agent_id: &str) -> String {
        format!("/agents/{agent_id}/state")
    }

    pub fn agent_clarification(agent_id: &str) -> String {
        format!("/agents/{agent_id}/provide_clarification")
    }

    pub fn chat_detail(agent_id: &str) -> String {
        format!("/v1/chats/{agent_id}")
    }

    pub fn chat_history(agent_id: &str) -> String {
        format!("/v1/chats/{agent_id}/history")
    }
}
