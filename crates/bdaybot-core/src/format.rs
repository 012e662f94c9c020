//! Message formatting: pluralized day counts, dates, summaries.

use chrono::{Datelike, NaiveDate};

use crate::calendar::{days_until, next_occurrence};
use crate::error::{BdayError, Result};
use crate::types::BirthdayRecord;

/// Date literal layout used in chat input and output.
pub const DATE_FORMAT: &str = "%d.%m.%Y";

/// Russian plural category of a count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plural {
    /// 1, 21, 31, ... (not 11)
    One,
    /// 2-4, 22-24, ... (not 12-14)
    Few,
    /// 0, 5-20, 25-30, ...
    Many,
}

pub fn plural_category(n: u64) -> Plural {
    let (last, last_two) = (n % 10, n % 100);
    if last == 1 && last_two != 11 {
        Plural::One
    } else if (2..=4).contains(&last) && !(12..=14).contains(&last_two) {
        Plural::Few
    } else {
        Plural::Many
    }
}

/// "день" / "дня" / "дней" for a day count.
pub fn days_word(n: u64) -> &'static str {
    match plural_category(n) {
        Plural::One => "день",
        Plural::Few => "дня",
        Plural::Many => "дней",
    }
}

/// "7 дней", "21 день".
pub fn format_days(n: u64) -> String {
    format!("{n} {}", days_word(n))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), DATE_FORMAT)
        .map_err(|_| BdayError::validation("Неверный формат даты. Используйте: ДД.ММ.ГГГГ"))
}

const MONTHS_GENITIVE: [&str; 12] = [
    "января", "февраля", "марта", "апреля", "мая", "июня",
    "июля", "августа", "сентября", "октября", "ноября", "декабря",
];

/// "15 марта".
pub fn format_month_day(date: NaiveDate) -> String {
    format!("{} {}", date.day(), MONTHS_GENITIVE[date.month0() as usize])
}

/// One line of a notification.
pub fn upcoming_line(name: &str, days: i64) -> String {
    if days <= 0 {
        format!("🎉 Сегодня день рождения у {name}!")
    } else {
        let days = days as u64;
        format!("📅 Через {} день рождения у {name}", format_days(days))
    }
}

/// Aggregated notification for a group, one line per record.
pub fn format_upcoming(records: &[BirthdayRecord], today: NaiveDate) -> String {
    let mut text = String::from("🎂 Предстоящие дни рождения:\n\n");
    for r in records {
        text.push_str(&upcoming_line(&r.name, days_until(r.birth_date, today)));
        text.push('\n');
    }
    text
}

/// The list view shown by `/remind` and the "show" button.
/// Expects records already ordered by next occurrence.
pub fn format_birthday_list(records: &[BirthdayRecord], today: NaiveDate) -> String {
    if records.is_empty() {
        return "📭 В этой группе пока нет дней рождения.".into();
    }
    let mut text = String::from("📅 Дни рождения в группе:\n\n");
    for r in records {
        let days = days_until(r.birth_date, today);
        if days == 0 {
            text.push_str(&format!("🎉 {} - СЕГОДНЯ! ({})\n", r.name, format_date(r.birth_date)));
        } else {
            text.push_str(&format!(
                "🎂 {} - {} - через {} ({})\n",
                r.name,
                format_month_day(next_occurrence(r.birth_date, today)),
                format_days(days as u64),
                format_date(r.birth_date)
            ));
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(id: i64, name: &str, birth: NaiveDate) -> BirthdayRecord {
        BirthdayRecord { id, name: name.into(), birth_date: birth, group_id: 1 }
    }

    #[test]
    fn test_plural_forms() {
        assert_eq!(days_word(1), "день");
        assert_eq!(days_word(2), "дня");
        assert_eq!(days_word(4), "дня");
        assert_eq!(days_word(5), "дней");
        assert_eq!(days_word(11), "дней");
        assert_eq!(days_word(12), "дней");
        assert_eq!(days_word(14), "дней");
        assert_eq!(days_word(21), "день");
        assert_eq!(days_word(22), "дня");
        assert_eq!(days_word(111), "дней");
        assert_eq!(days_word(0), "дней");
    }

    #[test]
    fn test_plural_category() {
        assert_eq!(plural_category(101), Plural::One);
        assert_eq!(plural_category(113), Plural::Many);
        assert_eq!(plural_category(364), Plural::Few);
    }

    #[test]
    fn test_date_roundtrip_layout() {
        assert_eq!(format_date(date(1990, 3, 5)), "05.03.1990");
        assert_eq!(parse_date("15.03.1990").unwrap(), date(1990, 3, 15));
        assert_eq!(parse_date(" 5.3.1990 ").unwrap(), date(1990, 3, 5));
        assert!(parse_date("1990-03-15").is_err());
        assert!(parse_date("31.02.1990").is_err());
    }

    #[test]
    fn test_month_day() {
        assert_eq!(format_month_day(date(1990, 3, 15)), "15 марта");
        assert_eq!(format_month_day(date(1990, 12, 1)), "1 декабря");
    }

    #[test]
    fn test_upcoming_lines() {
        assert_eq!(upcoming_line("Ann", 0), "🎉 Сегодня день рождения у Ann!");
        assert_eq!(upcoming_line("Ann", 1), "📅 Через 1 день день рождения у Ann");
        assert_eq!(upcoming_line("Ann", 3), "📅 Через 3 дня день рождения у Ann");
        assert_eq!(upcoming_line("Ann", 7), "📅 Через 7 дней день рождения у Ann");
    }

    #[test]
    fn test_format_upcoming_one_line_per_record() {
        let today = date(2026, 3, 10);
        let text = format_upcoming(
            &[record(1, "Ann Lee", date(1990, 3, 10)), record(2, "Bob", date(1985, 3, 12))],
            today,
        );
        assert!(text.starts_with("🎂 Предстоящие дни рождения:"));
        assert!(text.contains("Сегодня день рождения у Ann Lee"));
        assert!(text.contains("Через 2 дня день рождения у Bob"));
        assert_eq!(text.lines().filter(|l| !l.is_empty()).count(), 3);
    }

    #[test]
    fn test_format_birthday_list() {
        let today = date(2026, 3, 10);
        assert!(format_birthday_list(&[], today).contains("пока нет"));

        let text = format_birthday_list(
            &[record(1, "Ann Lee", date(1990, 3, 10)), record(2, "Bob", date(1985, 3, 31))],
            today,
        );
        assert!(text.contains("Ann Lee - СЕГОДНЯ! (10.03.1990)"));
        assert!(text.contains("Bob - 31 марта - через 21 день (31.03.1985)"));
    }

    #[test]
    fn test_leap_day_listed_on_observed_date() {
        let text = format_birthday_list(&[record(1, "Leap", date(2000, 2, 29))], date(2027, 2, 20));
        assert!(text.contains("Leap - 28 февраля - через 8 дней (29.02.2000)"));

        let text = format_birthday_list(&[record(1, "Leap", date(2000, 2, 29))], date(2028, 2, 20));
        assert!(text.contains("Leap - 29 февраля - через 9 дней (29.02.2000)"));
    }
}
