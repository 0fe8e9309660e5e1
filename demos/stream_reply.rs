use std::io::{self, Write};
use std::sync::Arc;

use async_trait::async_trait;
use chatrelay::{
    BridgeConfig, ChatSurface, CompletionBridge, ConversationContext, Message, OpenAiClient,
    OpenAiConfig, ReplyWriter, SurfaceError,
};
use dotenv::dotenv;
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

/// Prints the reply the way a chat thread would show it.
struct TerminalSurface;

#[async_trait]
impl ChatSurface for TerminalSurface {
    async fn update(&self, text: &str) -> Result<(), SurfaceError> {
        println!("\n--- reply ---\n{text}");
        Ok(())
    }

    async fn post(&self, text: &str) -> Result<(), SurfaceError> {
        println!("\n--- follow-up ---\n{text}");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chatrelay=info")),
        )
        .with_writer(io::stderr)
        .init();

    let prompt = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Explain how a hash map handles collisions.".to_string());

    let client = OpenAiClient::new(OpenAiConfig::from_env()?)?;
    let config = BridgeConfig::from_env()?;
    let deadline = config.deadline();
    let bridge = Arc::new(CompletionBridge::new(client, config)?);

    println!("Mode: {}", bridge.probe_capability());

    let context = ConversationContext::new(vec![
        Message::system("You are a helpful assistant. Answer concisely."),
        Message::user(prompt),
    ]);

    // Stream deltas straight to stdout while the bridge runs in the background
    let (mut deltas, handle) = bridge.spawn(context, deadline, 16);
    while let Some(delta) = deltas.next().await {
        print!("{}", delta.text);
        io::stdout().flush()?;
    }
    let result = handle.await?;

    match &result {
        Ok(completion) => {
            println!("\n\nFinished in {} mode (fallback: {})", completion.mode, completion.fallback_used);
            if let Some(usage) = completion.usage {
                println!("  Prompt tokens: {}", usage.prompt_tokens);
                println!("  Completion tokens: {}", usage.completion_tokens);
                println!("  Total tokens: {}", usage.total_tokens);
            }
        }
        Err(failure) => println!("\n\nFailed: {failure}"),
    }

    // Render the terminal state as a chat reply, notices and overflow included
    let mut writer = ReplyWriter::new(TerminalSurface);
    writer.finish(&result).await?;

    Ok(())
}
