//! Simple research chat demo
//!
//! Sends one task to the agent backend and prints the reconstructed
//! transcript, including any tool calls the agent made along the way.

use research_agent::{ClientOptions, ContentItem, SessionClient, get_base_url};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let options = ClientOptions::builder()
        .base_url(get_base_url(None))
        .timeout(15)
        .build()?;

    let mut client = SessionClient::new(options)?;

    println!("Sending task to the research agent...\n");
    client
        .send_message("Compare the tokio and async-std runtimes. Be brief.")
        .await?;

    for message in client.messages() {
        println!("--- {:?} ---", message.role);
        for item in &message.content {
            match item {
                ContentItem::Text(text) => println!("{text}"),
                ContentItem::ToolRecord(record) => {
                    println!(
                        "[tool {} ({})] {}",
                        record.tool_name,
                        record.call_id,
                        serde_json::Value::Object(record.arguments.clone())
                    );
                }
                ContentItem::PendingTool(pending) => {
                    // Only present while a turn is still streaming
                    println!("[streaming {}...] {}", pending.tool_name, pending.partial_arguments);
                }
            }
        }
    }

    if let Some(session) = client.session() {
        println!("\nAgent: {:?}, state: {:?}", session.agent_id, session.state);
    }

    Ok(())
}
