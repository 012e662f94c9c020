//! Domain and transport types.

pub mod birthday;
pub mod message;

pub use birthday::{BirthdayRecord, Group, NewBirthday, NotifyTime, MAX_AGE_YEARS, MAX_NAME_CHARS};
pub use message::{
    CallbackQuery, Choice, IncomingEvent, IncomingMessage, MessageRef, OutgoingMessage,
};
