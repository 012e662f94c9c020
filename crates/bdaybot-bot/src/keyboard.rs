//! Inline keyboards.

use bdaybot_core::format::format_date;
use bdaybot_core::types::{BirthdayRecord, Choice};

use crate::command::Action;

/// One button per row: show, add, delete.
pub fn main_menu() -> Vec<Vec<Choice>> {
    vec![
        vec![Choice::new("📅 Показать дни рождения", Action::ShowBirthdays.token())],
        vec![Choice::new("➕ Добавить день рождения", Action::AddBirthday.token())],
        vec![Choice::new("❌ Удалить день рождения", Action::DeleteBirthday.token())],
    ]
}

/// One delete button per record.
pub fn delete_keyboard(records: &[BirthdayRecord]) -> Vec<Vec<Choice>> {
    records
        .iter()
        .map(|r| {
            vec![Choice::new(
                format!("❌ {} ({})", r.name, format_date(r.birth_date)),
                Action::delete_for(&r.name, r.id).token(),
            )]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_main_menu_tokens() {
        let tokens: Vec<String> = main_menu().into_iter().flatten().map(|c| c.action).collect();
        assert_eq!(tokens, vec!["show_birthdays", "add_birthday", "delete_birthday"]);
    }

    #[test]
    fn test_delete_keyboard() {
        let records = vec![
            BirthdayRecord {
                id: 1,
                name: "Ann Lee".into(),
                birth_date: NaiveDate::from_ymd_opt(1990, 3, 15).unwrap(),
                group_id: -1,
            },
            BirthdayRecord {
                id: 2,
                name: "Ж".repeat(40),
                birth_date: NaiveDate::from_ymd_opt(1991, 1, 2).unwrap(),
                group_id: -1,
            },
        ];
        let keyboard = delete_keyboard(&records);
        assert_eq!(keyboard.len(), 2);
        assert_eq!(keyboard[0][0].label, "❌ Ann Lee (15.03.1990)");
        assert_eq!(keyboard[0][0].action, "delete_name_Ann Lee");
        assert_eq!(keyboard[1][0].action, "delete_id_2");
    }
}
