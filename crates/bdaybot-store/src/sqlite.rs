//! SQLite birthday store.

use async_trait::async_trait;
use bdaybot_core::calendar::{days_until, month_day_key, sort_by_next_occurrence, MonthDayWindow};
use bdaybot_core::error::{BdayError, Result};
use bdaybot_core::traits::store::{BirthdayStore, DEFAULT_MAX_RECORDS_PER_GROUP};
use bdaybot_core::types::{BirthdayRecord, Group, NewBirthday, NotifyTime};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS groups (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL DEFAULT '',
        last_notified TEXT
    );

    CREATE TABLE IF NOT EXISTS birthdays (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        birth_date TEXT NOT NULL,
        group_id INTEGER NOT NULL REFERENCES groups(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_birthdays_group ON birthdays(group_id);

    CREATE TABLE IF NOT EXISTS settings (
        group_id INTEGER PRIMARY KEY REFERENCES groups(id) ON DELETE CASCADE,
        notify_time TEXT NOT NULL
    );
";

/// Dates are stored as ISO `YYYY-MM-DD` text so `strftime` works on them.
const DB_DATE: &str = "%Y-%m-%d";

pub struct SqliteStore {
    conn: Mutex<Connection>,
    max_records: usize,
}

fn db_err(e: rusqlite::Error) -> BdayError {
    BdayError::storage(e.to_string())
}

fn parse_db_date(idx: usize, raw: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&raw, DB_DATE).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<BirthdayRecord> {
    Ok(BirthdayRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        birth_date: parse_db_date(2, row.get(2)?)?,
        group_id: row.get(3)?,
    })
}

impl SqliteStore {
    /// Open or create a database file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(db_err)?;
        let store = Self::init(conn)?;
        tracing::debug!("Birthday store opened: {}", path.display());
        Ok(store)
    }

    /// Private in-memory database, mostly for tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().map_err(db_err)?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| BdayError::storage(format!("Schema error: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
            max_records: DEFAULT_MAX_RECORDS_PER_GROUP,
        })
    }

    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| BdayError::storage(format!("Store lock poisoned: {e}")))
    }

    fn query_records(
        conn: &Connection,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<BirthdayRecord>> {
        let mut stmt = conn.prepare(sql).map_err(db_err)?;
        let rows = stmt.query_map(params, row_to_record).map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }
}

#[async_trait]
impl BirthdayStore for SqliteStore {
    fn name(&self) -> &str { "sqlite" }

    async fn add_birthday(&self, birthday: NewBirthday, today: NaiveDate) -> Result<BirthdayRecord> {
        birthday.validate(today)?;

        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;

        tx.execute(
            "INSERT OR IGNORE INTO groups (id, title) VALUES (?1, '')",
            params![birthday.group_id],
        ).map_err(db_err)?;

        let count: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM birthdays WHERE group_id = ?1",
                params![birthday.group_id],
                |r| r.get(0),
            )
            .map_err(db_err)?;
        if count as usize >= self.max_records {
            return Err(BdayError::limit(format!(
                "Превышен лимит дней рождения в группе ({})",
                self.max_records
            )));
        }

        tx.execute(
            "INSERT INTO birthdays (name, birth_date, group_id) VALUES (?1, ?2, ?3)",
            params![
                birthday.name,
                birthday.birth_date.format(DB_DATE).to_string(),
                birthday.group_id,
            ],
        ).map_err(db_err)?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(db_err)?;

        tracing::debug!("Added birthday #{id} to group {}", birthday.group_id);
        Ok(birthday.into_record(id))
    }

    async fn list_birthdays(&self, group_id: i64, today: NaiveDate) -> Result<Vec<BirthdayRecord>> {
        let conn = self.lock()?;
        Self::query_records(
            &conn,
            "SELECT id, name, birth_date, group_id FROM birthdays
             WHERE group_id = ?1
             ORDER BY CASE WHEN strftime('%m-%d', birth_date) >= ?2 THEN 0 ELSE 1 END,
                      strftime('%m-%d', birth_date), id",
            &[&group_id, &month_day_key(today)],
        )
    }

    async fn delete_birthday(&self, group_id: i64, id: i64) -> Result<()> {
        let conn = self.lock()?;
        let affected = conn
            .execute(
                "DELETE FROM birthdays WHERE id = ?1 AND group_id = ?2",
                params![id, group_id],
            )
            .map_err(db_err)?;
        if affected == 0 {
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
        let window = MonthDayWindow::starting(today, within_days);
        let select = "SELECT id, name, birth_date, group_id FROM birthdays WHERE group_id = ?1";

        let mut records = {
            let conn = self.lock()?;
            if window.all {
                Self::query_records(&conn, select, &[&group_id])?
            } else {
                let filter = if window.wraps() {
                    "(strftime('%m-%d', birth_date) >= ?2 OR strftime('%m-%d', birth_date) <= ?3)"
                } else {
                    "strftime('%m-%d', birth_date) BETWEEN ?2 AND ?3"
                };
                let sql = format!("{select} AND {filter}");
                Self::query_records(&conn, &sql, &[&group_id, &window.start, &window.end])?
            }
        };
        records.retain(|r| days_until(r.birth_date, today) <= i64::from(within_days));
        sort_by_next_occurrence(&mut records, today);
        Ok(records)
    }

    async fn ensure_group(&self, id: i64, title: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO groups (id, title) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET title = excluded.title
             WHERE excluded.title <> '' AND excluded.title <> groups.title",
            params![id, title],
        ).map_err(db_err)?;
        Ok(())
    }

    async fn get_group(&self, id: i64) -> Result<Option<Group>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, title FROM groups WHERE id = ?1",
            params![id],
            |r| Ok(Group { id: r.get(0)?, title: r.get(1)? }),
        )
        .optional()
        .map_err(db_err)
    }

    async fn list_all_groups(&self) -> Result<Vec<Group>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, title FROM groups ORDER BY id")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |r| Ok(Group { id: r.get(0)?, title: r.get(1)? }))
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    async fn get_notify_time(&self, group_id: i64) -> Result<NotifyTime> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT notify_time FROM settings WHERE group_id = ?1",
                params![group_id],
                |r| r.get(0),
            )
            .optional()
            .map_err(db_err)?;
        match raw {
            Some(raw) => raw.parse().map_err(|_| {
                BdayError::storage(format!("Corrupt notify_time '{raw}' for group {group_id}"))
            }),
            None => Ok(NotifyTime::default()),
        }
    }

    async fn set_notify_time(&self, group_id: i64, time: NotifyTime) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute(
            "INSERT OR IGNORE INTO groups (id, title) VALUES (?1, '')",
            params![group_id],
        ).map_err(db_err)?;
        tx.execute(
            "INSERT INTO settings (group_id, notify_time) VALUES (?1, ?2)
             ON CONFLICT(group_id) DO UPDATE SET notify_time = excluded.notify_time",
            params![group_id, time.to_string()],
        ).map_err(db_err)?;
        tx.commit().map_err(db_err)
    }

    async fn last_notified(&self, group_id: i64) -> Result<Option<NaiveDate>> {
        let conn = self.lock()?;
        let raw: Option<Option<String>> = conn
            .query_row(
                "SELECT last_notified FROM groups WHERE id = ?1",
                params![group_id],
                |r| r.get(0),
            )
            .optional()
            .map_err(db_err)?;
        raw.flatten()
            .map(|s| parse_db_date(0, s).map_err(db_err))
            .transpose()
    }

    async fn mark_notified(&self, group_id: i64, date: NaiveDate) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO groups (id, title, last_notified) VALUES (?1, '', ?2)
             ON CONFLICT(id) DO UPDATE SET last_notified = excluded.last_notified",
            params![group_id, date.format(DB_DATE).to_string()],
        ).map_err(db_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const GROUP: i64 = -1001;

    #[tokio::test]
    async fn test_add_list_delete_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let today = date(2026, 10, 17);

        let added = store
            .add_birthday(NewBirthday::new("Ann Lee", date(1990, 3, 15), GROUP), today)
            .await
            .unwrap();

        let listed = store.list_birthdays(GROUP, today).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Ann Lee");
        assert_eq!(listed[0].birth_date, date(1990, 3, 15));
        assert_eq!(listed[0], added);

        store.delete_birthday(GROUP, added.id).await.unwrap();
        assert!(store.list_birthdays(GROUP, today).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_and_foreign_group() {
        let store = SqliteStore::open_in_memory().unwrap();
        let today = date(2026, 10, 17);
        let rec = store
            .add_birthday(NewBirthday::new("Ann", date(1990, 3, 15), GROUP), today)
            .await
            .unwrap();

        assert!(matches!(store.delete_birthday(GROUP, 999).await, Err(BdayError::NotFound(_))));
        // Same id, other group: must not touch it
        assert!(matches!(store.delete_birthday(42, rec.id).await, Err(BdayError::NotFound(_))));
        assert_eq!(store.list_birthdays(GROUP, today).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_limit_per_group() {
        let store = SqliteStore::open_in_memory().unwrap();
        let today = date(2026, 10, 17);
        for i in 0..100 {
            store
                .add_birthday(NewBirthday::new(format!("P{i}"), date(1990, 1, 1), GROUP), today)
                .await
                .unwrap();
        }
        let err = store
            .add_birthday(NewBirthday::new("P100", date(1990, 1, 1), GROUP), today)
            .await
            .unwrap_err();
        assert!(matches!(err, BdayError::Limit(_)));
        assert_eq!(store.list_birthdays(GROUP, today).await.unwrap().len(), 100);

        // Other groups are unaffected
        assert!(store
            .add_birthday(NewBirthday::new("Other", date(1990, 1, 1), 7), today)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_validation_before_insert() {
        let store = SqliteStore::open_in_memory().unwrap();
        let today = date(2026, 10, 17);
        let err = store
            .add_birthday(NewBirthday::new("", date(1990, 1, 1), GROUP), today)
            .await
            .unwrap_err();
        assert!(matches!(err, BdayError::Validation(_)));
        assert!(store.list_all_groups().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_ordered_from_today() {
        let store = SqliteStore::open_in_memory().unwrap();
        let today = date(2026, 6, 1);
        for (name, d) in [
            ("Jan", date(1990, 1, 5)),
            ("Jun", date(1991, 6, 20)),
            ("May", date(1992, 5, 31)),
            ("Today", date(1993, 6, 1)),
        ] {
            store.add_birthday(NewBirthday::new(name, d, GROUP), today).await.unwrap();
        }
        let names: Vec<String> = store
            .list_birthdays(GROUP, today)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["Today", "Jun", "Jan", "May"]);
    }

    #[tokio::test]
    async fn test_upcoming_window_and_wraparound() {
        let store = SqliteStore::open_in_memory().unwrap();
        let add_today = date(2026, 12, 28);
        for (name, d) in [
            ("NewYear", date(1990, 1, 1)),
            ("Dec30", date(1991, 12, 30)),
            ("Jan10", date(1992, 1, 10)),
            ("Dec27", date(1993, 12, 27)),
        ] {
            store.add_birthday(NewBirthday::new(name, d, GROUP), add_today).await.unwrap();
        }
        let upcoming = store.list_upcoming(GROUP, date(2026, 12, 28), 7).await.unwrap();
        let names: Vec<&str> = upcoming.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Dec30", "NewYear"]);

        let all = store.list_upcoming(GROUP, date(2026, 12, 28), 365).await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[3].name, "Dec27");
    }

    #[tokio::test]
    async fn test_upcoming_leap_day_observed_feb_28() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .add_birthday(NewBirthday::new("Leap", date(2000, 2, 29), GROUP), date(2026, 1, 1))
            .await
            .unwrap();
        let hits = store.list_upcoming(GROUP, date(2026, 2, 21), 7).await.unwrap();
        assert_eq!(hits.len(), 1);
        let misses = store.list_upcoming(GROUP, date(2028, 2, 21), 7).await.unwrap();
        assert!(misses.is_empty());
    }

    #[tokio::test]
    async fn test_groups_and_titles() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.ensure_group(5, "").await.unwrap();
        store.ensure_group(5, "Family").await.unwrap();
        store.ensure_group(5, "").await.unwrap();
        store.ensure_group(3, "Work").await.unwrap();

        assert_eq!(store.get_group(5).await.unwrap().unwrap().title, "Family");
        assert!(store.get_group(99).await.unwrap().is_none());
        let ids: Vec<i64> = store.list_all_groups().await.unwrap().iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![3, 5]);
    }

    #[tokio::test]
    async fn test_notify_time_default_and_set() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get_notify_time(GROUP).await.unwrap(), NotifyTime::default());

        store.set_notify_time(GROUP, NotifyTime::new(18, 30).unwrap()).await.unwrap();
        store.set_notify_time(GROUP, NotifyTime::new(7, 15).unwrap()).await.unwrap();
        assert_eq!(store.get_notify_time(GROUP).await.unwrap().to_string(), "07:15");
        assert_eq!(store.list_all_groups().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_last_notified_marker() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.ensure_group(GROUP, "g").await.unwrap();
        assert_eq!(store.last_notified(GROUP).await.unwrap(), None);
        store.mark_notified(GROUP, date(2026, 10, 17)).await.unwrap();
        assert_eq!(store.last_notified(GROUP).await.unwrap(), Some(date(2026, 10, 17)));
        assert_eq!(store.get_group(GROUP).await.unwrap().unwrap().title, "g");
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("birthdays.db");
        let today = date(2026, 10, 17);
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .add_birthday(NewBirthday::new("Ann Lee", date(1990, 3, 15), GROUP), today)
                .await
                .unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.list_birthdays(GROUP, today).await.unwrap()[0].name, "Ann Lee");
    }
}
