//! Slash commands, button action tokens and the add-input format.

use bdaybot_core::error::{BdayError, Result};
use bdaybot_core::format::parse_date;
use chrono::NaiveDate;

/// Telegram limits `callback_data` to 64 bytes.
pub const MAX_CALLBACK_DATA_BYTES: usize = 64;

const DELETE_NAME_PREFIX: &str = "delete_name_";
const DELETE_ID_PREFIX: &str = "delete_id_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Remind,
    /// `/settime HH:MM`; the raw argument, possibly empty.
    SetTime(String),
    Time,
    Cancel,
}

impl Command {
    /// Parse `/cmd args` or `/cmd@botname args`. Commands addressed to another
    /// bot and unknown commands yield `None`.
    pub fn parse(text: &str, bot_username: Option<&str>) -> Option<Self> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;
        let (head, args) = match rest.split_once(char::is_whitespace) {
            Some((head, args)) => (head, args.trim()),
            None => (rest, ""),
        };
        let (name, target) = match head.split_once('@') {
            Some((name, target)) => (name, Some(target)),
            None => (head, None),
        };
        if let (Some(target), Some(me)) = (target, bot_username) {
            if !target.eq_ignore_ascii_case(me) {
                return None;
            }
        }

        match name.to_ascii_lowercase().as_str() {
            "start" => Some(Self::Start),
            "help" => Some(Self::Help),
            "remind" => Some(Self::Remind),
            "settime" => Some(Self::SetTime(args.to_string())),
            "time" => Some(Self::Time),
            "cancel" => Some(Self::Cancel),
            _ => None,
        }
    }
}

/// Inline button action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ShowBirthdays,
    AddBirthday,
    DeleteBirthday,
    DeleteByName(String),
    /// Used when the name does not fit into callback data.
    DeleteById(i64),
}

impl Action {
    pub fn parse(data: &str) -> Option<Self> {
        if let Some(name) = data.strip_prefix(DELETE_NAME_PREFIX) {
            return Some(Self::DeleteByName(name.to_string()));
        }
        if let Some(id) = data.strip_prefix(DELETE_ID_PREFIX) {
            return id.parse().ok().map(Self::DeleteById);
        }
        match data {
            "show_birthdays" => Some(Self::ShowBirthdays),
            "add_birthday" => Some(Self::AddBirthday),
            "delete_birthday" => Some(Self::DeleteBirthday),
            _ => None,
        }
    }

    pub fn token(&self) -> String {
        match self {
            Self::ShowBirthdays => "show_birthdays".into(),
            Self::AddBirthday => "add_birthday".into(),
            Self::DeleteBirthday => "delete_birthday".into(),
            Self::DeleteByName(name) => format!("{DELETE_NAME_PREFIX}{name}"),
            Self::DeleteById(id) => format!("{DELETE_ID_PREFIX}{id}"),
        }
    }

    /// Delete token for a record: by name when it fits, by id otherwise.
    pub fn delete_for(name: &str, id: i64) -> Self {
        if DELETE_NAME_PREFIX.len() + name.len() <= MAX_CALLBACK_DATA_BYTES {
            Self::DeleteByName(name.to_string())
        } else {
            Self::DeleteById(id)
        }
    }
}

/// Split `Имя Фамилия ДД.ММ.ГГГГ`: the last token is the date, the rest is
/// the name.
pub fn parse_add_input(text: &str) -> Result<(String, NaiveDate)> {
    let parts: Vec<&str> = text.split_whitespace().collect();
    let Some((date, name)) = parts.split_last() else {
        return Err(BdayError::validation(
            "Неверный формат. Используйте: Имя Фамилия ДД.ММ.ГГГГ",
        ));
    };
    if name.is_empty() {
        return Err(BdayError::validation(
            "Неверный формат. Используйте: Имя Фамилия ДД.ММ.ГГГГ",
        ));
    }
    let date = parse_date(date)?;
    Ok((name.join(" "), date))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/start", None), Some(Command::Start));
        assert_eq!(Command::parse("/help", Some("bdaybot")), Some(Command::Help));
        assert_eq!(Command::parse("  /remind  ", None), Some(Command::Remind));
        assert_eq!(Command::parse("/time", None), Some(Command::Time));
        assert_eq!(Command::parse("/cancel", None), Some(Command::Cancel));
        assert_eq!(
            Command::parse("/settime 18:30", None),
            Some(Command::SetTime("18:30".into()))
        );
        assert_eq!(Command::parse("/settime", None), Some(Command::SetTime(String::new())));
        assert_eq!(Command::parse("/unknown", None), None);
        assert_eq!(Command::parse("start", None), None);
    }

    #[test]
    fn test_parse_addressed_commands() {
        assert_eq!(Command::parse("/start@BdayBot", Some("bdaybot")), Some(Command::Start));
        assert_eq!(Command::parse("/start@other_bot", Some("bdaybot")), None);
        assert_eq!(Command::parse("/remind@anything", None), Some(Command::Remind));
    }

    #[test]
    fn test_action_tokens() {
        assert_eq!(Action::parse("show_birthdays"), Some(Action::ShowBirthdays));
        assert_eq!(Action::parse("add_birthday"), Some(Action::AddBirthday));
        assert_eq!(Action::parse("delete_birthday"), Some(Action::DeleteBirthday));
        assert_eq!(
            Action::parse("delete_name_Ann Lee"),
            Some(Action::DeleteByName("Ann Lee".into()))
        );
        assert_eq!(Action::parse("delete_id_42"), Some(Action::DeleteById(42)));
        assert_eq!(Action::parse("delete_id_x"), None);
        assert_eq!(Action::parse("bogus"), None);

        let action = Action::DeleteByName("Анна Ли".into());
        assert_eq!(Action::parse(&action.token()), Some(action));
    }

    #[test]
    fn test_delete_token_falls_back_to_id() {
        assert_eq!(Action::delete_for("Ann Lee", 3), Action::DeleteByName("Ann Lee".into()));

        // 26 Cyrillic letters are 52 bytes; with the 12-byte prefix exactly 64.
        let at_limit = "Ж".repeat(26);
        let action = Action::delete_for(&at_limit, 9);
        assert_eq!(action, Action::DeleteByName(at_limit.clone()));
        assert_eq!(action.token().len(), MAX_CALLBACK_DATA_BYTES);

        let long = "Ж".repeat(27);
        let action = Action::delete_for(&long, 9);
        assert_eq!(action, Action::DeleteById(9));
        assert!(action.token().len() <= MAX_CALLBACK_DATA_BYTES);
    }

    #[test]
    fn test_parse_add_input() {
        let (name, date) = parse_add_input("Ann Lee 15.03.1990").unwrap();
        assert_eq!(name, "Ann Lee");
        assert_eq!(date, NaiveDate::from_ymd_opt(1990, 3, 15).unwrap());

        let (name, _) = parse_add_input("  Мария   Анна  Иванова 1.2.2001 ").unwrap();
        assert_eq!(name, "Мария Анна Иванова");
    }

    #[test]
    fn test_parse_add_input_errors() {
        assert!(matches!(parse_add_input(""), Err(BdayError::Validation(_))));
        assert!(matches!(parse_add_input("15.03.1990"), Err(BdayError::Validation(_))));
        assert!(matches!(parse_add_input("Ann Lee 1990-03-15"), Err(BdayError::Validation(_))));
        assert!(matches!(parse_add_input("Ann Lee 31.02.1990"), Err(BdayError::Validation(_))));
    }
}
