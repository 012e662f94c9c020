//! Chat transport message types.

use serde::{Deserialize, Serialize};

/// A chat event delivered by a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IncomingEvent {
    Message(IncomingMessage),
    Callback(CallbackQuery),
}

impl IncomingEvent {
    pub fn chat_id(&self) -> i64 {
        match self {
            IncomingEvent::Message(m) => m.chat_id,
            IncomingEvent::Callback(c) => c.chat_id,
        }
    }
}

/// Incoming text message from a chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub channel: String,
    pub chat_id: i64,
    #[serde(default)]
    pub chat_title: String,
    pub sender_id: i64,
    pub sender_name: Option<String>,
    pub message_id: i64,
    pub text: String,
    /// Set by the channel when the text @-mentions the bot.
    #[serde(default)]
    pub mentions_bot: bool,
    pub reply_to: Option<i64>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Inline button press.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub chat_id: i64,
    #[serde(default)]
    pub chat_title: String,
    pub sender_id: i64,
    /// Message that carried the keyboard.
    pub message_id: i64,
    pub data: String,
}

/// Inline button: label shown to the user, token sent back on press.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub label: String,
    pub action: String,
}

impl Choice {
    pub fn new(label: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: action.into(),
        }
    }
}

/// Outgoing message to a chat. `choices` are rows of inline buttons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub chat_id: i64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Vec<Choice>>,
}

impl OutgoingMessage {
    pub fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            choices: vec![],
        }
    }

    pub fn with_choices(chat_id: i64, text: impl Into<String>, choices: Vec<Vec<Choice>>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            choices,
        }
    }
}

/// Identifies a message the channel has sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outgoing_constructors() {
        let plain = OutgoingMessage::text(-42, "hi");
        assert_eq!(plain.chat_id, -42);
        assert!(plain.choices.is_empty());

        let menu = OutgoingMessage::with_choices(
            -42,
            "pick",
            vec![vec![Choice::new("Show", "show_birthdays")]],
        );
        assert_eq!(menu.choices[0][0].action, "show_birthdays");
    }

    #[test]
    fn test_event_json_tagging() {
        let event = IncomingEvent::Callback(CallbackQuery {
            id: "cb1".into(),
            chat_id: -7,
            chat_title: String::new(),
            sender_id: 5,
            message_id: 11,
            data: "add_birthday".into(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "callback");
        assert_eq!(event.chat_id(), -7);
    }
}
