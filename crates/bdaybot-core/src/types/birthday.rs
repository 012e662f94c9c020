//! Birthday, group and notification-setting records.

use chrono::{Months, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{BdayError, Result};

/// Oldest plausible birth date, counted back from today.
pub const MAX_AGE_YEARS: u32 = 150;

/// Longest display name accepted on add.
pub const MAX_NAME_CHARS: usize = 100;

/// A stored birthday. Immutable once created: there is no update,
/// only delete and re-add.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BirthdayRecord {
    pub id: i64,
    pub name: String,
    pub birth_date: NaiveDate,
    pub group_id: i64,
}

/// Add request, validated before it reaches a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBirthday {
    pub name: String,
    pub birth_date: NaiveDate,
    pub group_id: i64,
}

impl NewBirthday {
    pub fn new(name: impl Into<String>, birth_date: NaiveDate, group_id: i64) -> Self {
        Self {
            name: name.into().trim().to_string(),
            birth_date,
            group_id,
        }
    }

    /// Check the name and the plausibility of the birth date against `today`.
    pub fn validate(&self, today: NaiveDate) -> Result<()> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(BdayError::validation("Имя не может быть пустым"));
        }
        if name.chars().count() > MAX_NAME_CHARS {
            return Err(BdayError::validation(format!(
                "Имя слишком длинное (максимум {MAX_NAME_CHARS} символов)"
            )));
        }
        if self.birth_date > today {
            return Err(BdayError::validation("Дата рождения не может быть в будущем"));
        }
        if let Some(oldest) = today.checked_sub_months(Months::new(MAX_AGE_YEARS * 12)) {
            if self.birth_date < oldest {
                return Err(BdayError::validation("Дата рождения слишком старая"));
            }
        }
        Ok(())
    }

    pub fn into_record(self, id: i64) -> BirthdayRecord {
        BirthdayRecord {
            id,
            name: self.name,
            birth_date: self.birth_date,
            group_id: self.group_id,
        }
    }
}

/// A chat the bot has seen. Title may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    #[serde(default)]
    pub title: String,
}

impl Group {
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Self { id, title: title.into() }
    }
}

/// Per-group time of day for the daily reminder (local wall clock).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NotifyTime(NaiveTime);

impl NotifyTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    pub fn as_time(&self) -> NaiveTime {
        self.0
    }
}

impl Default for NotifyTime {
    fn default() -> Self {
        Self(NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default())
    }
}

impl std::fmt::Display for NotifyTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl std::str::FromStr for NotifyTime {
    type Err = BdayError;

    fn from_str(s: &str) -> Result<Self> {
        let (h, m) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| BdayError::validation("Неверный формат времени. Используйте: ЧЧ:ММ"))?;
        let hour: u32 = h
            .parse()
            .map_err(|_| BdayError::validation("Неверный формат времени. Используйте: ЧЧ:ММ"))?;
        let minute: u32 = m
            .parse()
            .map_err(|_| BdayError::validation("Неверный формат времени. Используйте: ЧЧ:ММ"))?;
        if m.len() != 2 {
            return Err(BdayError::validation("Неверный формат времени. Используйте: ЧЧ:ММ"));
        }
        Self::new(hour, minute)
            .ok_or_else(|| BdayError::validation("Время должно быть от 00:00 до 23:59"))
    }
}
