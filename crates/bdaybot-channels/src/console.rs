//! Console channel for local runs without Telegram.
//!
//! Every stdin line becomes a message in one fixed chat. A line starting
//! with `!` presses a button: `!show_birthdays` sends that action token.

use async_trait::async_trait;
use bdaybot_core::error::Result;
use bdaybot_core::traits::Channel;
use bdaybot_core::types::{CallbackQuery, Choice, IncomingEvent, IncomingMessage, MessageRef, OutgoingMessage};
use futures::stream::Stream;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::UnboundedReceiverStream;

const CONSOLE_USER_ID: i64 = 1;
const INPUT_ID_BASE: i64 = 1_000_000;

pub struct ConsoleChannel {
    chat_id: i64,
    next_message_id: AtomicI64,
    connected: bool,
}

impl ConsoleChannel {
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            next_message_id: AtomicI64::new(1),
            connected: false,
        }
    }

    fn next_id(&self) -> i64 {
        self.next_message_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Turn one input line into an event.
    pub fn parse_line(&self, line: &str, message_id: i64) -> Option<IncomingEvent> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if let Some(action) = line.strip_prefix('!') {
            return Some(IncomingEvent::Callback(CallbackQuery {
                id: format!("console-{message_id}"),
                chat_id: self.chat_id,
                chat_title: "console".into(),
                sender_id: CONSOLE_USER_ID,
                message_id,
                data: action.trim().to_string(),
            }));
        }
        Some(IncomingEvent::Message(IncomingMessage {
            channel: "console".into(),
            chat_id: self.chat_id,
            chat_title: "console".into(),
            sender_id: CONSOLE_USER_ID,
            sender_name: Some("console".into()),
            message_id,
            text: line.to_string(),
            mentions_bot: line.contains("@bdaybot"),
            reply_to: None,
            timestamp: chrono::Utc::now(),
        }))
    }
}

/// Text rendering of a message with its buttons.
pub fn render(text: &str, choices: &[Vec<Choice>]) -> String {
    let mut out = text.to_string();
    for row in choices {
        let buttons: Vec<String> = row
            .iter()
            .map(|c| format!("[{}] !{}", c.label, c.action))
            .collect();
        out.push('\n');
        out.push_str(&buttons.join("  "));
    }
    out
}

#[async_trait]
impl Channel for ConsoleChannel {
    fn name(&self) -> &str { "console" }

    async fn connect(&mut self) -> Result<()> {
        self.connected = true;
        tracing::info!("Console channel ready (chat {})", self.chat_id);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool { self.connected }

    fn bot_username(&self) -> Option<String> {
        Some("bdaybot".into())
    }

    async fn send(&self, message: OutgoingMessage) -> Result<MessageRef> {
        let message_id = self.next_id();
        println!("\n🤖 [{}#{message_id}] {}\n", message.chat_id, render(&message.text, &message.choices));
        Ok(MessageRef { chat_id: message.chat_id, message_id })
    }

    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        choices: &[Vec<Choice>],
    ) -> Result<()> {
        println!("\n🤖 [{chat_id}#{message_id} edited] {}\n", render(text, choices));
        Ok(())
    }

    async fn listen(&self) -> Result<Box<dyn Stream<Item = IncomingEvent> + Send + Unpin>> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        // Input ids live in their own range so they never collide with sent ones.
        let reader = ConsoleChannel {
            chat_id: self.chat_id,
            next_message_id: AtomicI64::new(INPUT_ID_BASE),
            connected: true,
        };

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let Some(event) = reader.parse_line(&line, reader.next_id()) else {
                            continue;
                        };
                        if tx.send(event).is_err() {
                            return;
                        }
                    }
                    Ok(None) => {
                        tracing::info!("Console input closed");
                        return;
                    }
                    Err(e) => {
                        tracing::error!("Console read error: {e}");
                        return;
                    }
                }
            }
        });

        Ok(Box::new(UnboundedReceiverStream::new(rx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lines() {
        let console = ConsoleChannel::new(-5);
        assert!(console.parse_line("   ", 1).is_none());

        match console.parse_line("/start", 2) {
            Some(IncomingEvent::Message(m)) => {
                assert_eq!(m.chat_id, -5);
                assert_eq!(m.text, "/start");
                assert!(!m.mentions_bot);
            }
            other => panic!("unexpected {other:?}"),
        }

        match console.parse_line("!delete_birthday", 3) {
            Some(IncomingEvent::Callback(c)) => {
                assert_eq!(c.data, "delete_birthday");
                assert_eq!(c.message_id, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_render_buttons() {
        let out = render(
            "Выберите действие:",
            &[vec![Choice::new("Show", "show_birthdays")], vec![Choice::new("Add", "add_birthday")]],
        );
        assert_eq!(out, "Выберите действие:\n[Show] !show_birthdays\n[Add] !add_birthday");
    }

    #[tokio::test]
    async fn test_send_assigns_increasing_ids() {
        let console = ConsoleChannel::new(-5);
        let a = console.send_text(-5, "one").await.unwrap();
        let b = console.send_text(-5, "two").await.unwrap();
        assert!(b.message_id > a.message_id);
    }
}
