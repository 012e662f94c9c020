//! Channel trait: the chat transport.

use async_trait::async_trait;
use futures::stream::Stream;

use crate::error::Result;
use crate::types::{Choice, IncomingEvent, MessageRef, OutgoingMessage};

#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    async fn connect(&mut self) -> Result<()>;

    async fn disconnect(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Username the bot is addressed by, known after `connect`.
    fn bot_username(&self) -> Option<String> {
        None
    }

    async fn send(&self, message: OutgoingMessage) -> Result<MessageRef>;

    /// Replace the text and keyboard of a message sent earlier.
    async fn edit_message(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        choices: &[Vec<Choice>],
    ) -> Result<()>;

    /// Acknowledge a button press so the client stops its spinner.
    async fn answer_callback(&self, _callback_id: &str) -> Result<()> {
        Ok(())
    }

    /// Stream of inbound events. Ends when the channel shuts down.
    async fn listen(&self) -> Result<Box<dyn Stream<Item = IncomingEvent> + Send + Unpin>>;

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<MessageRef> {
        self.send(OutgoingMessage::text(chat_id, text)).await
    }

    async fn send_with_choices(
        &self,
        chat_id: i64,
        text: &str,
        choices: Vec<Vec<Choice>>,
    ) -> Result<MessageRef> {
        self.send(OutgoingMessage::with_choices(chat_id, text, choices)).await
    }
}
