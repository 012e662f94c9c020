//! Whether a group's daily reminder is due at a given instant.

use bdaybot_core::types::NotifyTime;
use chrono::{Duration, NaiveDateTime};

/// Default tolerance around the notify time.
pub const DEFAULT_DUE_WINDOW_SECS: i64 = 60;

/// True when `now` is within `window` of today's notify time, on either side.
pub fn is_due_within(notify_time: NotifyTime, now: NaiveDateTime, window: Duration) -> bool {
    let target = now.date().and_time(notify_time.as_time());
    (now - target).num_milliseconds().abs() <= window.num_milliseconds()
}

pub fn is_notification_due(notify_time: NotifyTime, now: NaiveDateTime) -> bool {
    is_due_within(notify_time, now, Duration::seconds(DEFAULT_DUE_WINDOW_SECS))
}
