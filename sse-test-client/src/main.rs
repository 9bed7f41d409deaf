use anyhow::Result;
use clap::Parser;
use colored::*;

mod sse_client;

use sse_client::Connection;

#[derive(Parser)]
#[command(name = "sse-test-client")]
#[command(about = "Event-stream smoke-testing tool")]
struct Cli {
    /// Base URL of the server (e.g., http://localhost:4000)
    #[arg(long, default_value = "http://localhost:4000")]
    base_url: String,

    /// Last-Event-ID to present on connect
    #[arg(long)]
    last_event_id: Option<String>,

    /// Instead of listening, push this message to every connected client
    /// via the broadcast endpoint and exit
    #[arg(long)]
    broadcast: Option<String>,

    /// Optional event type for --broadcast
    #[arg(long)]
    event: Option<String>,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }

    if let Some(message) = cli.broadcast {
        return broadcast(&cli.base_url, message, cli.event).await;
    }

    println!(
        "{} Connecting to {}/events ...",
        "→".blue(),
        cli.base_url
    );
    let mut connection = Connection::establish(&cli.base_url, cli.last_event_id.as_deref()).await?;
    println!("{} Connected; waiting for events (Ctrl-C to quit)", "✓".green());

    while let Some(event) = connection.next_event().await {
        let label = if event.event_type.is_empty() {
            "message".to_string()
        } else {
            event.event_type.clone()
        };
        println!("{} [{}] {}", "•".cyan(), label.bright_white().bold(), event.data);
    }

    println!("{} Stream ended by server", "✗".red());
    Ok(())
}

async fn broadcast(base_url: &str, message: String, event: Option<String>) -> Result<()> {
    let mut body = serde_json::json!({ "data": message });
    if let Some(event) = event {
        body["event"] = serde_json::Value::String(event);
    }

    let response = reqwest::Client::new()
        .post(format!("{}/broadcast", base_url))
        .json(&body)
        .send()
        .await?
        .error_for_status()?;
    let outcome: serde_json::Value = response.json().await?;

    println!(
        "{} Broadcast queued on {} connection(s)",
        "✓".green(),
        outcome["delivered_to"]
    );
    Ok(())
}
