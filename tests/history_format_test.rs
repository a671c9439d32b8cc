//! Stored-history reconstruction tests against full backend payloads.

use research_agent::{ChatHistoryResponse, MessageRole, messages_from_history};

fn multi_turn_history() -> ChatHistoryResponse {
    serde_json::from_str(
        r#"{
        "chat_id": "c2",
        "agent_id": "agent-3",
        "turns": [
            {
                "user_message": {"id": "u1", "content": "what is io_uring?", "created_at": "2025-05-01T09:00:00Z"},
                "iterations": [
                    {
                        "iteration": 1,
                        "reasoning_message": {"id": "r1m", "content": null, "created_at": "2025-05-01T09:00:01Z"},
                        "reasoning_result": {
                            "id": "r1",
                            "content": "{\"reasoning_steps\":[\"define io_uring\",\"find kernel docs\"]}",
                            "tool_call_id": "tc_r1",
                            "created_at": "2025-05-01T09:00:02Z"
                        },
                        "action_message": {"id": "a1m", "content": null, "created_at": "2025-05-01T09:00:03Z"},
                        "action_result": {
                            "id": "a1",
                            "content": "{\"urls\":[\"https://kernel.org\"]}",
                            "tool_name": "websearchtool",
                            "tool_call_id": "tc_a1",
                            "created_at": "2025-05-01T09:00:04Z"
                        }
                    },
                    {
                        "iteration": 2,
                        "action_result": {
                            "id": "a2",
                            "content": "{\"response\": \"io_uring is a Linux async I/O interface.\"}",
                            "tool_name": "responsetool",
                            "created_at": "2025-05-01T09:00:05Z"
                        }
                    }
                ]
            },
            {
                "user_message": {"id": "u2", "content": "how does it compare to epoll?", "created_at": "2025-05-01T09:01:00Z"},
                "iterations": []
            }
        ],
        "total_turns": 2,
        "total_iterations": 2,
        "page": 1,
        "page_size": 50
    }"#,
    )
    .unwrap()
}

#[test]
fn multi_turn_history_reconstructs_in_order() {
    let messages = messages_from_history(&multi_turn_history());

    // Turn 1 contributes user + assistant; turn 2 (still running) only user
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[0].id, "u1");
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert_eq!(messages[1].id, "a2");
    assert_eq!(messages[2].role, MessageRole::User);
    assert_eq!(messages[2].id, "u2");
}

#[test]
fn assistant_message_carries_intermediate_steps() {
    let messages = messages_from_history(&multi_turn_history());
    let assistant = &messages[1];

    assert_eq!(assistant.tool_history.len(), 2);

    let reasoning = &assistant.tool_history[0];
    assert_eq!(reasoning.tool_name.as_deref(), Some("reasoningtool"));
    assert_eq!(reasoning.role, MessageRole::Assistant);
    assert_eq!(
        reasoning.content.as_deref(),
        Some("• define io_uring\n• find kernel docs")
    );
    assert_eq!(reasoning.iteration, Some(1));

    let action = &assistant.tool_history[1];
    assert_eq!(action.tool_name.as_deref(), Some("websearchtool"));
    assert_eq!(action.role, MessageRole::Tool);
    assert_eq!(action.tool_call_id.as_deref(), Some("tc_a1"));
}

#[test]
fn final_answer_extracted_from_response_payload() {
    let messages = messages_from_history(&multi_turn_history());
    let assistant = &messages[1];

    let text = match &assistant.content[0] {
        research_agent::ContentItem::Text(text) => text.as_str(),
        other => panic!("expected text content, got {other:?}"),
    };
    assert_eq!(text, "io_uring is a Linux async I/O interface.");
}

#[test]
fn loaded_messages_are_settled() {
    let messages = messages_from_history(&multi_turn_history());
    for message in &messages {
        assert!(!message.is_streaming);
        assert!(message.error.is_none());
    }
}
