//! # bdaybot channels
//! Chat transports: Telegram Bot API (long polling) and a local console.

pub mod console;
pub mod telegram;

pub use console::ConsoleChannel;
pub use telegram::TelegramChannel;
