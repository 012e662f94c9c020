//! # bdaybot core
//! Domain types, recurrence math, message formatting, configuration and the
//! traits the store and chat transport implement.

pub mod calendar;
pub mod clock;
pub mod config;
pub mod error;
pub mod format;
pub mod traits;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::BotConfig;
pub use error::{BdayError, Result};
