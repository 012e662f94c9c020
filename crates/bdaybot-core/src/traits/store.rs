//! Birthday store trait: persists birthdays, groups and notify settings.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::types::{BirthdayRecord, Group, NewBirthday, NotifyTime};

/// Default cap on records per group.
pub const DEFAULT_MAX_RECORDS_PER_GROUP: usize = 100;

#[async_trait]
pub trait BirthdayStore: Send + Sync {
    /// Backend name.
    fn name(&self) -> &str;

    /// Validate and insert a record. Creates the group if it does not exist.
    /// Fails with `Limit` when the group is full.
    async fn add_birthday(&self, birthday: NewBirthday, today: NaiveDate) -> Result<BirthdayRecord>;

    /// All records of a group, ordered by month-day starting from `today`.
    async fn list_birthdays(&self, group_id: i64, today: NaiveDate) -> Result<Vec<BirthdayRecord>>;

    /// Delete by `(group_id, id)`. Fails with `NotFound` when nothing matched.
    async fn delete_birthday(&self, group_id: i64, id: i64) -> Result<()>;

    /// Records whose anniversary falls within `[today, today + within_days]`,
    /// ordered by next occurrence.
    async fn list_upcoming(
        &self,
        group_id: i64,
        today: NaiveDate,
        within_days: u32,
    ) -> Result<Vec<BirthdayRecord>>;

    /// Insert the group if unknown; refresh its title when a non-empty one is given.
    async fn ensure_group(&self, id: i64, title: &str) -> Result<()>;

    async fn get_group(&self, id: i64) -> Result<Option<Group>>;

    async fn list_all_groups(&self) -> Result<Vec<Group>>;

    /// Notify time of a group, `09:00` when unset.
    async fn get_notify_time(&self, group_id: i64) -> Result<NotifyTime>;

    async fn set_notify_time(&self, group_id: i64, time: NotifyTime) -> Result<()>;

    /// Date of the last daily notification sent to the group.
    async fn last_notified(&self, group_id: i64) -> Result<Option<NaiveDate>>;

    async fn mark_notified(&self, group_id: i64, date: NaiveDate) -> Result<()>;
}
