//! # bdaybot scheduler
//!
//! Sends each group one reminder a day at its configured notify time,
//! listing the birthdays of the coming week.
//!
//! ```text
//! SchedulerEngine (tokio interval, every tick_secs)
//!   └── per group: notify time due? → already sent today? → list_upcoming
//!                    → format → Channel::send → mark_notified
//! ```

pub mod due;
pub mod engine;

pub use due::{is_due_within, is_notification_due};
pub use engine::{SchedulerEngine, TickReport};
