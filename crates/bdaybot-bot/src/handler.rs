//! Maps inbound chat events to store operations and outbound directives.
//!
//! The handler never talks to the transport itself: it returns the messages
//! to send, edit or acknowledge and the dispatcher performs them.

use std::sync::Arc;

use bdaybot_core::calendar::sort_by_next_occurrence;
use bdaybot_core::error::{BdayError, Result};
use bdaybot_core::format::format_birthday_list;
use bdaybot_core::traits::BirthdayStore;
use bdaybot_core::types::{
    BirthdayRecord, CallbackQuery, Choice, IncomingEvent, IncomingMessage, NewBirthday,
    NotifyTime, OutgoingMessage,
};
use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::command::{parse_add_input, Action, Command};
use crate::keyboard::{delete_keyboard, main_menu};
use crate::session::{PendingAction, SessionStore};

pub const MENU_PROMPT: &str = "Выберите действие:";
pub const ADD_PROMPT: &str = "Введите имя, фамилию и дату рождения в формате:\nИмя Фамилия ДД.ММ.ГГГГ";
pub const DELETE_PROMPT: &str =
    "🗑 Выберите день рождения для удаления из списка или введите имя и фамилию:";
pub const EMPTY_GROUP: &str = "📭 В этой группе пока нет дней рождения.";
pub const GENERIC_FAILURE: &str = "❌ Произошла ошибка. Попробуйте позже.";

pub const HELP_TEXT: &str = "Доступные команды:
/start - Показать главное меню
/help - Показать это сообщение
/remind - Показать дни рождения группы
/settime ЧЧ:ММ - Время ежедневного напоминания
/time - Текущее время напоминания
/cancel - Отменить ввод

Также вы можете упомянуть бота (@username) для вызова меню.";

/// Something for the dispatcher to do on the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Send(OutgoingMessage),
    Edit {
        chat_id: i64,
        message_id: i64,
        text: String,
        choices: Vec<Vec<Choice>>,
    },
    AnswerCallback(String),
}

impl Directive {
    fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Self::Send(OutgoingMessage::text(chat_id, text))
    }
}

pub struct Handler {
    store: Arc<dyn BirthdayStore>,
    sessions: SessionStore,
    bot_username: Option<String>,
}

impl Handler {
    pub fn new(store: Arc<dyn BirthdayStore>, session_ttl: Duration) -> Self {
        Self {
            store,
            sessions: SessionStore::new(session_ttl),
            bot_username: None,
        }
    }

    /// Only `/cmd@<username>` forms naming this bot are accepted once set.
    pub fn with_bot_username(mut self, username: Option<String>) -> Self {
        self.bot_username = username;
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Handle one event. Store and input errors become chat replies, and a
    /// callback is always answered first.
    pub async fn handle(&self, event: IncomingEvent, now: NaiveDateTime) -> Result<Vec<Directive>> {
        self.sessions.purge_expired(now);
        match event {
            IncomingEvent::Message(msg) => {
                let chat_id = msg.chat_id;
                Ok(self.on_message(msg, now).await.unwrap_or_else(|e| reply_error(chat_id, &e)))
            }
            IncomingEvent::Callback(query) => {
                let mut directives = vec![Directive::AnswerCallback(query.id.clone())];
                let chat_id = query.chat_id;
                match self.on_callback(query, now).await {
                    Ok(more) => directives.extend(more),
                    Err(e) => directives.extend(reply_error(chat_id, &e)),
                }
                Ok(directives)
            }
        }
    }

    async fn on_message(&self, msg: IncomingMessage, now: NaiveDateTime) -> Result<Vec<Directive>> {
        let chat_id = msg.chat_id;
        self.store.ensure_group(chat_id, &msg.chat_title).await?;

        if let Some(command) = Command::parse(&msg.text, self.bot_username.as_deref()) {
            tracing::debug!("Command {command:?} in chat {chat_id}");
            return self.on_command(command, &msg, now).await;
        }

        if msg.mentions_bot {
            return Ok(vec![menu(chat_id)]);
        }

        match self.sessions.take(chat_id, msg.sender_id, now) {
            Some(PendingAction::AddBirthday) => self.add_confirmed(&msg, now).await,
            Some(PendingAction::DeleteByName) => {
                self.delete_by_typed_name(chat_id, &msg.text, now.date()).await
            }
            None => Ok(vec![]),
        }
    }

    async fn on_command(
        &self,
        command: Command,
        msg: &IncomingMessage,
        now: NaiveDateTime,
    ) -> Result<Vec<Directive>> {
        let chat_id = msg.chat_id;
        match command {
            Command::Start => Ok(vec![menu(chat_id)]),
            Command::Help => Ok(vec![Directive::text(chat_id, HELP_TEXT)]),
            Command::Remind => self.show_list(chat_id, now.date()).await,
            Command::SetTime(arg) => {
                if arg.is_empty() {
                    return Ok(vec![Directive::text(chat_id, "Использование: /settime ЧЧ:ММ")]);
                }
                let time: NotifyTime = arg.parse()?;
                self.store.set_notify_time(chat_id, time).await?;
                tracing::info!("Group {chat_id} notify time set to {time}");
                Ok(vec![Directive::text(
                    chat_id,
                    format!("✅ Время уведомлений установлено: {time}"),
                )])
            }
            Command::Time => {
                let time = self.store.get_notify_time(chat_id).await?;
                Ok(vec![Directive::text(chat_id, format!("⏰ Время уведомлений: {time}"))])
            }
            Command::Cancel => {
                let text = if self.sessions.cancel(chat_id, msg.sender_id, now) {
                    "Действие отменено."
                } else {
                    "Нечего отменять."
                };
                Ok(vec![Directive::text(chat_id, text)])
            }
        }
    }

    async fn on_callback(&self, query: CallbackQuery, now: NaiveDateTime) -> Result<Vec<Directive>> {
        let chat_id = query.chat_id;
        self.store.ensure_group(chat_id, &query.chat_title).await?;
        let Some(action) = Action::parse(&query.data) else {
            tracing::debug!("Unknown callback '{}' in chat {chat_id}", query.data);
            return Ok(vec![]);
        };

        match action {
            Action::ShowBirthdays => self.show_list(chat_id, now.date()).await,
            Action::AddBirthday => {
                self.sessions.begin(chat_id, query.sender_id, PendingAction::AddBirthday, now);
                Ok(vec![Directive::text(chat_id, ADD_PROMPT)])
            }
            Action::DeleteBirthday => {
                let records = self.sorted_records(chat_id, now.date()).await?;
                if records.is_empty() {
                    return Ok(vec![Directive::text(chat_id, EMPTY_GROUP)]);
                }
                self.sessions.begin(chat_id, query.sender_id, PendingAction::DeleteByName, now);
                Ok(vec![Directive::Send(OutgoingMessage::with_choices(
                    chat_id,
                    DELETE_PROMPT,
                    delete_keyboard(&records),
                ))])
            }
            Action::DeleteByName(name) => {
                let records = self.store.list_birthdays(chat_id, now.date()).await?;
                // Buttons carry the stored name verbatim.
                let target = records.into_iter().find(|r| r.name == name);
                self.delete_pressed(&query, target, now).await
            }
            Action::DeleteById(id) => {
                let records = self.store.list_birthdays(chat_id, now.date()).await?;
                let target = records.into_iter().find(|r| r.id == id);
                self.delete_pressed(&query, target, now).await
            }
        }
    }

    /// Delete button: the keyboard message is replaced by the outcome.
    async fn delete_pressed(
        &self,
        query: &CallbackQuery,
        target: Option<BirthdayRecord>,
        now: NaiveDateTime,
    ) -> Result<Vec<Directive>> {
        // The button answers the pending delete prompt.
        self.sessions.cancel(query.chat_id, query.sender_id, now);

        let text = match target {
            Some(record) => {
                self.store.delete_birthday(query.chat_id, record.id).await?;
                tracing::info!("Deleted birthday #{} from group {}", record.id, query.chat_id);
                format!("✅ День рождения {} успешно удален!", record.name)
            }
            None => "❌ День рождения не найден".to_string(),
        };
        Ok(vec![Directive::Edit {
            chat_id: query.chat_id,
            message_id: query.message_id,
            text,
            choices: vec![],
        }])
    }

    async fn add_confirmed(&self, msg: &IncomingMessage, now: NaiveDateTime) -> Result<Vec<Directive>> {
        let chat_id = msg.chat_id;
        let parsed = parse_add_input(&msg.text).and_then(|(name, date)| {
            let birthday = NewBirthday::new(name, date, chat_id);
            birthday.validate(now.date()).map(|_| birthday)
        });

        let birthday = match parsed {
            Ok(birthday) => birthday,
            Err(e) => {
                // Let the user correct the input without pressing the button again.
                self.sessions.begin(chat_id, msg.sender_id, PendingAction::AddBirthday, now);
                return Ok(vec![Directive::text(
                    chat_id,
                    format!("❌ {e}\nПопробуйте ещё раз или отправьте /cancel"),
                )]);
            }
        };

        let record = self.store.add_birthday(birthday, now.date()).await?;
        tracing::info!("Added birthday #{} to group {chat_id}", record.id);
        Ok(vec![Directive::text(
            chat_id,
            format!("✅ День рождения {} успешно добавлен!", record.name),
        )])
    }

    async fn delete_by_typed_name(
        &self,
        chat_id: i64,
        input: &str,
        today: NaiveDate,
    ) -> Result<Vec<Directive>> {
        let records = self.store.list_birthdays(chat_id, today).await?;
        let Some(record) = find_by_typed_name(&records, input) else {
            return Ok(vec![Directive::text(
                chat_id,
                "❌ День рождения не найден. Проверьте правильность имени и фамилии.",
            )]);
        };
        self.store.delete_birthday(chat_id, record.id).await?;
        tracing::info!("Deleted birthday #{} from group {chat_id}", record.id);
        Ok(vec![Directive::text(
            chat_id,
            format!("✅ День рождения {} успешно удален!", record.name),
        )])
    }

    async fn show_list(&self, chat_id: i64, today: NaiveDate) -> Result<Vec<Directive>> {
        let records = self.sorted_records(chat_id, today).await?;
        Ok(vec![Directive::text(chat_id, format_birthday_list(&records, today))])
    }

    async fn sorted_records(&self, chat_id: i64, today: NaiveDate) -> Result<Vec<BirthdayRecord>> {
        let mut records = self.store.list_birthdays(chat_id, today).await?;
        sort_by_next_occurrence(&mut records, today);
        Ok(records)
    }
}

fn menu(chat_id: i64) -> Directive {
    Directive::Send(OutgoingMessage::with_choices(chat_id, MENU_PROMPT, main_menu()))
}

/// Case-insensitive exact match on the full name.
fn find_by_typed_name<'a>(records: &'a [BirthdayRecord], name: &str) -> Option<&'a BirthdayRecord> {
    let wanted = name.trim().to_lowercase();
    records.iter().find(|r| r.name.to_lowercase() == wanted)
}

fn reply_error(chat_id: i64, error: &BdayError) -> Vec<Directive> {
    if error.is_user_facing() {
        vec![Directive::text(chat_id, format!("❌ {error}"))]
    } else {
        tracing::error!("Chat {chat_id}: {error}");
        vec![Directive::text(chat_id, GENERIC_FAILURE)]
    }
}
