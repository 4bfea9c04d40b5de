use std::io::{stdout, Write};
use std::time::Duration;

use anyhow::Result;
use chatstream::client::{ChannelEvent, SessionController};
use chatstream::protocol::{ServerEnvelope, STREAM_DONE};
use clap::Parser;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(author, version, about = "Terminal client for the chatstream relay", long_about = None)]
struct Cli {
    /// Base URL of the chat server
    #[arg(long, default_value = "http://127.0.0.1:8000", env = "CHATSTREAM_SERVER")]
    server: String,
}

fn print_colored(text: &str, color: Color) -> Result<()> {
    let mut stdout = StandardStream::stdout(ColorChoice::Always);
    stdout.set_color(ColorSpec::new().set_fg(Some(color)))?;
    write!(stdout, "{}", text)?;
    stdout.reset()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let mut controller = SessionController::new(cli.server);

    controller.start().await?;
    wait_for_replay(&mut controller).await;

    if let Some(session_id) = controller.session_id() {
        print_colored(&format!("Session: {}\n", session_id), Color::Blue)?;
    }
    if let Ok(path) = controller.history_path().await {
        print_colored(&format!("History: {}\n", path), Color::Blue)?;
    }
    println!("Commands: /save  /new  /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print_colored("> ", Color::Cyan)?;
        stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/save" => match controller.save_chat().await {
                Ok(filename) => print_colored(&format!("Saved: {}\n", filename), Color::Green)?,
                Err(e) => print_colored(&format!("{}\n", e), Color::Red)?,
            },
            "/new" => {
                controller.reset().await?;
                wait_for_replay(&mut controller).await;
                if let Some(session_id) = controller.session_id() {
                    print_colored(&format!("New session: {}\n", session_id), Color::Blue)?;
                }
            }
            text => match controller.send_message(text).await {
                Ok(true) => stream_response(&mut controller).await?,
                Ok(false) => {}
                Err(e) => print_colored(&format!("{}\n", e), Color::Red)?,
            },
        }
    }

    controller.teardown().await;
    Ok(())
}

/// Consume channel events until the response stream completes, printing
/// fragments as they arrive.
async fn stream_response(controller: &mut SessionController) -> Result<()> {
    loop {
        let Some(event) = controller.next_event().await else {
            print_colored("Connection lost.\n", Color::Red)?;
            return Ok(());
        };
        controller.apply_event(&event);

        match &event {
            ChannelEvent::Envelope(ServerEnvelope::Stream {
                content: Some(content),
            }) => {
                if content == STREAM_DONE {
                    println!();
                } else {
                    print!("{}", content);
                    stdout().flush()?;
                }
            }
            ChannelEvent::Envelope(ServerEnvelope::Error { detail }) => {
                let detail = detail.as_deref().unwrap_or("An unknown error occurred.");
                print_colored(&format!("Server error: {}\n", detail), Color::Red)?;
            }
            ChannelEvent::Envelope(ServerEnvelope::FullMessage { role, content }) => {
                println!("[{}] {}", role, content);
            }
            ChannelEvent::ParseError(_) => {
                print_colored("Received a malformed message from the server.\n", Color::Red)?;
            }
            ChannelEvent::StreamStalled => {
                print_colored("The response stream stalled. You can try again.\n", Color::Red)?;
            }
            ChannelEvent::Reconnecting { attempt, delay } => {
                print_colored(
                    &format!("Reconnecting (attempt {}) in {:?}...\n", attempt, delay),
                    Color::Yellow,
                )?;
            }
            ChannelEvent::Failed => {
                print_colored(
                    "Connection failed after repeated attempts. Restart with /new.\n",
                    Color::Red,
                )?;
                return Ok(());
            }
            _ => {}
        }

        if controller.chat().input_enabled {
            return Ok(());
        }
    }
}

/// Wait briefly for the channel to open and the server's history replay to
/// land, echoing any replayed messages.
async fn wait_for_replay(controller: &mut SessionController) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let event = tokio::select! {
            event = controller.next_event() => event,
            _ = tokio::time::sleep_until(deadline) => return,
        };
        let Some(event) = event else { return };
        controller.apply_event(&event);

        if let ChannelEvent::Envelope(ServerEnvelope::History { messages }) = &event {
            for message in messages {
                let _ = print_colored(&format!("[{}] ", message.role), Color::Blue);
                println!("{}", message.content);
            }
            return;
        }
        if matches!(event, ChannelEvent::Failed | ChannelEvent::Disconnected) {
            return;
        }
    }
}
