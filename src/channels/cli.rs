//! CLI channel: stdin/stdout REPL for walking through the form locally.
//!
//! `/contact <phone>` stands in for Telegram's "share contact" button.

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{
    Channel, InboundEvent, IncomingMessage, Keyboard, MessageStream, OutgoingMessage,
};
use crate::error::ChannelError;

const LOCAL_USER: &str = "local-user";

/// A simple CLI channel that reads from stdin and writes to stdout.
pub struct CliChannel;

impl CliChannel {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Interpret one line of REPL input.
fn parse_line(line: &str) -> InboundEvent {
    match line.strip_prefix("/contact") {
        Some(rest) if rest.is_empty() || rest.starts_with(' ') => {
            InboundEvent::contact(rest.trim())
        }
        _ => InboundEvent::from_text(line),
    }
}

/// Render a keyboard as bracketed buttons, one line per row.
fn render_keyboard(keyboard: &Keyboard) -> String {
    keyboard
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| {
                    if b.request_contact {
                        format!("[{} → /contact <phone>]", b.label)
                    } else {
                        format!("[{}]", b.label)
                    }
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprintln!("Type /start to begin, /cancel to abort.");
            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let msg = IncomingMessage::new("cli", LOCAL_USER, LOCAL_USER, parse_line(&line));
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send(&self, _chat_id: &str, message: OutgoingMessage) -> Result<(), ChannelError> {
        println!("\n{}", message.text);
        if let Some(keyboard) = message.keyboard() {
            println!("{}", render_keyboard(keyboard));
        }
        eprint!("> ");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
