//! Pending replies: after an add/delete prompt, the next plain message from
//! the same user in the same chat is the answer.

use chrono::{Duration, NaiveDateTime};
use std::collections::HashMap;
use std::sync::Mutex;

/// What the user's next message will be interpreted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    /// `Имя Фамилия ДД.ММ.ГГГГ`
    AddBirthday,
    /// A full name to delete.
    DeleteByName,
}

#[derive(Debug, Clone)]
struct Session {
    action: PendingAction,
    expires_at: NaiveDateTime,
}

/// Sessions keyed by `(chat_id, user_id)`, each expiring after `ttl`.
pub struct SessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<(i64, i64), Session>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Start (or replace) a session for the user.
    pub fn begin(&self, chat_id: i64, user_id: i64, action: PendingAction, now: NaiveDateTime) {
        let session = Session { action, expires_at: now + self.ttl };
        match self.sessions.lock() {
            Ok(mut sessions) => {
                sessions.insert((chat_id, user_id), session);
            }
            Err(_) => tracing::warn!(
                "Session lock poisoned, dropping {action:?} for user {user_id} in chat {chat_id}"
            ),
        }
    }

    /// Remove and return the user's live session.
    pub fn take(&self, chat_id: i64, user_id: i64, now: NaiveDateTime) -> Option<PendingAction> {
        let mut sessions = self.sessions.lock().ok()?;
        let session = sessions.remove(&(chat_id, user_id))?;
        (now <= session.expires_at).then_some(session.action)
    }

    /// Drop the user's session. Returns whether a live one existed.
    pub fn cancel(&self, chat_id: i64, user_id: i64, now: NaiveDateTime) -> bool {
        self.take(chat_id, user_id, now).is_some()
    }

    /// Forget expired sessions.
    pub fn purge_expired(&self, now: NaiveDateTime) -> usize {
        let Ok(mut sessions) = self.sessions.lock() else {
            return 0;
        };
        let before = sessions.len();
        sessions.retain(|_, s| now <= s.expires_at);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
