//! In-memory birthday store. Nothing survives a restart.

use async_trait::async_trait;
use bdaybot_core::calendar::{days_until, month_day_key, sort_by_next_occurrence};
use bdaybot_core::error::{BdayError, Result};
use bdaybot_core::traits::store::{BirthdayStore, DEFAULT_MAX_RECORDS_PER_GROUP};
use bdaybot_core::types::{BirthdayRecord, Group, NewBirthday, NotifyTime};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct GroupState {
    title: String,
    notify_time: Option<NotifyTime>,
    last_notified: Option<NaiveDate>,
}

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    groups: BTreeMap<i64, GroupState>,
    birthdays: Vec<BirthdayRecord>,
}

pub struct InMemoryStore {
    state: Mutex<State>,
    max_records: usize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            max_records: DEFAULT_MAX_RECORDS_PER_GROUP,
        }
    }

    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| BdayError::storage(format!("Store lock poisoned: {e}")))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BirthdayStore for InMemoryStore {
    fn name(&self) -> &str { "memory" }

    async fn add_birthday(&self, birthday: NewBirthday, today: NaiveDate) -> Result<BirthdayRecord> {
        birthday.validate(today)?;
        let mut state = self.lock()?;
        state.groups.entry(birthday.group_id).or_default();

        let count = state.birthdays.iter().filter(|b| b.group_id == birthday.group_id).count();
        if count >= self.max_records {
            return Err(BdayError::limit(format!(
                "Превышен лимит дней рождения в группе ({})",
                self.max_records
            )));
        }

        state.next_id += 1;
        let record = birthday.into_record(state.next_id);
        state.birthdays.push(record.clone());
        Ok(record)
    }

    async fn list_birthdays(&self, group_id: i64, today: NaiveDate) -> Result<Vec<BirthdayRecord>> {
        let state = self.lock()?;
        let mut records: Vec<BirthdayRecord> = state
            .birthdays
            .iter()
            .filter(|b| b.group_id == group_id)
            .cloned()
            .collect();
        let from = month_day_key(today);
        records.sort_by_key(|r| {
            let key = month_day_key(r.birth_date);
            (key < from, key, r.id)
        });
        Ok(records)
    }

    async fn delete_birthday(&self, group_id: i64, id: i64) -> Result<()> {
        let mut state = self.lock()?;
        let before = state.birthdays.len();
        state.birthdays.retain(|b| !(b.id == id && b.group_id == group_id));
        if state.birthdays.len() == before {
            return Err(BdayError::not_found("День рождения не найден"));
        }
        Ok(())
    }

    async fn list_upcoming(
        &self,
        group_id: i64,
        today: NaiveDate,
        within_days: u32,
    ) -> Result<Vec<BirthdayRecord>> {
        let state = self.lock()?;
        let mut records: Vec<BirthdayRecord> = state
            .birthdays
            .iter()
            .filter(|b| b.group_id == group_id)
            .filter(|b| days_until(b.birth_date, today) <= i64::from(within_days))
            .cloned()
            .collect();
        sort_by_next_occurrence(&mut records, today);
        Ok(records)
    }

    async fn ensure_group(&self, id: i64, title: &str) -> Result<()> {
        let mut state = self.lock()?;
        let group = state.groups.entry(id).or_default();
        if !title.is_empty() {
            group.title = title.to_string();
        }
        Ok(())
    }

    async fn get_group(&self, id: i64) -> Result<Option<Group>> {
        let state = self.lock()?;
        Ok(state.groups.get(&id).map(|g| Group::new(id, g.title.clone())))
    }

    async fn list_all_groups(&self) -> Result<Vec<Group>> {
        let state = self.lock()?;
        Ok(state
            .groups
            .iter()
            .map(|(id, g)| Group::new(*id, g.title.clone()))
            .collect())
    }

    async fn get_notify_time(&self, group_id: i64) -> Result<NotifyTime> {
        let state = self.lock()?;
        Ok(state
            .groups
            .get(&group_id)
            .and_then(|g| g.notify_time)
            .unwrap_or_default())
    }

    async fn set_notify_time(&self, group_id: i64, time: NotifyTime) -> Result<()> {
        let mut state = self.lock()?;
        state.groups.entry(group_id).or_default().notify_time = Some(time);
        Ok(())
    }

    async fn last_notified(&self, group_id: i64) -> Result<Option<NaiveDate>> {
        let state = self.lock()?;
        Ok(state.groups.get(&group_id).and_then(|g| g.last_notified))
    }

    async fn mark_notified(&self, group_id: i64, date: NaiveDate) -> Result<()> {
        let mut state = self.lock()?;
        state.groups.entry(group_id).or_default().last_notified = Some(date);
        Ok(())
    }
}
