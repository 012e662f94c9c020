//! Reads events from the channel, runs the handler and performs its directives.

use std::sync::Arc;
use std::time::Duration;

use bdaybot_core::clock::Clock;
use bdaybot_core::error::{BdayError, Result};
use bdaybot_core::traits::Channel;
use bdaybot_core::types::IncomingEvent;
use futures::StreamExt;
use tokio::sync::watch;

use crate::handler::{Directive, Handler};

/// Deadline for handling one inbound event end to end.
pub const DEFAULT_EVENT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Dispatcher {
    handler: Handler,
    channel: Arc<dyn Channel>,
    clock: Arc<dyn Clock>,
    event_timeout: Duration,
}

impl Dispatcher {
    pub fn new(handler: Handler, channel: Arc<dyn Channel>, clock: Arc<dyn Clock>) -> Self {
        Self {
            handler,
            channel,
            clock,
            event_timeout: DEFAULT_EVENT_TIMEOUT,
        }
    }

    pub fn with_event_timeout(mut self, timeout: Duration) -> Self {
        self.event_timeout = timeout;
        self
    }

    /// Process events until the stream ends or `shutdown` turns true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut events = self.channel.listen().await?;
        tracing::info!("Listening for {} events", self.channel.name());

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                event = events.next() => match event {
                    Some(event) => self.dispatch(event).await,
                    None => {
                        tracing::info!("{} event stream ended", self.channel.name());
                        break;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Dispatcher stopped");
        Ok(())
    }

    /// Handle one event within the deadline. Failures are logged only.
    pub async fn dispatch(&self, event: IncomingEvent) {
        let chat_id = event.chat_id();
        match tokio::time::timeout(self.event_timeout, self.process(event)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Chat {chat_id}: {e}"),
            Err(_) => tracing::warn!(
                "Chat {chat_id}: handling timed out after {}s",
                self.event_timeout.as_secs()
            ),
        }
    }

    async fn process(&self, event: IncomingEvent) -> Result<()> {
        let directives = self.handler.handle(event, self.clock.now()).await?;
        let mut failed: Option<BdayError> = None;
        for directive in directives {
            if let Err(e) = self.perform(directive).await {
                tracing::warn!("Directive failed: {e}");
                failed = Some(e);
            }
        }
        failed.map_or(Ok(()), Err)
    }

    pub async fn perform(&self, directive: Directive) -> Result<()> {
        match directive {
            Directive::Send(message) => self.channel.send(message).await.map(|_| ()),
            Directive::Edit { chat_id, message_id, text, choices } => {
                self.channel.edit_message(chat_id, message_id, &text, &choices).await
            }
            Directive::AnswerCallback(id) => self.channel.answer_callback(&id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bdaybot_core::clock::FixedClock;
    use bdaybot_core::traits::BirthdayStore;
    use bdaybot_core::types::{CallbackQuery, Choice, IncomingMessage, MessageRef, OutgoingMessage};
    use bdaybot_store::InMemoryStore;
    use chrono::NaiveDate;
    use futures::stream::Stream;
    use std::sync::Mutex;

    /// Replays scripted events and records everything performed.
    #[derive(Default)]
    struct ScriptedChannel {
        script: Mutex<Vec<IncomingEvent>>,
        log: Mutex<Vec<String>>,
    }

    impl ScriptedChannel {
        fn with_script(events: Vec<IncomingEvent>) -> Self {
            Self { script: Mutex::new(events), log: Mutex::default() }
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Channel for ScriptedChannel {
        fn name(&self) -> &str { "scripted" }
        async fn connect(&mut self) -> Result<()> { Ok(()) }
        async fn disconnect(&mut self) -> Result<()> { Ok(()) }
        fn is_connected(&self) -> bool { true }

        async fn send(&self, message: OutgoingMessage) -> Result<MessageRef> {
            let mut log = self.log.lock().unwrap();
            log.push(format!("send:{}", message.text));
            Ok(MessageRef { chat_id: message.chat_id, message_id: log.len() as i64 })
        }

        async fn edit_message(&self, _: i64, message_id: i64, text: &str, _: &[Vec<Choice>]) -> Result<()> {
            self.log.lock().unwrap().push(format!("edit:{message_id}:{text}"));
            Ok(())
        }

        async fn answer_callback(&self, id: &str) -> Result<()> {
            self.log.lock().unwrap().push(format!("answer:{id}"));
            Ok(())
        }

        async fn listen(&self) -> Result<Box<dyn Stream<Item = IncomingEvent> + Send + Unpin>> {
            let events = std::mem::take(&mut *self.script.lock().unwrap());
            Ok(Box::new(futures::stream::iter(events)))
        }
    }

    fn message(text: &str) -> IncomingEvent {
        IncomingEvent::Message(IncomingMessage {
            channel: "test".into(),
            chat_id: -1,
            chat_title: "G".into(),
            sender_id: 7,
            sender_name: None,
            message_id: 1,
            text: text.into(),
            mentions_bot: false,
            reply_to: None,
            timestamp: chrono::Utc::now(),
        })
    }

    fn press(data: &str) -> IncomingEvent {
        IncomingEvent::Callback(CallbackQuery {
            id: "q1".into(),
            chat_id: -1,
            chat_title: "G".into(),
            sender_id: 7,
            message_id: 40,
            data: data.into(),
        })
    }

    fn dispatcher(channel: Arc<ScriptedChannel>) -> (Dispatcher, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let now = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap().and_hms_opt(10, 0, 0).unwrap();
        let handler = Handler::new(store.clone(), chrono::Duration::seconds(300));
        (Dispatcher::new(handler, channel, Arc::new(FixedClock::new(now))), store)
    }

    #[tokio::test]
    async fn test_runs_script_until_stream_ends() {
        let channel = Arc::new(ScriptedChannel::with_script(vec![
            press("add_birthday"),
            message("Ann Lee 15.03.1990"),
            message("/remind"),
        ]));
        let (dispatcher, store) = dispatcher(channel.clone());
        let (_tx, rx) = watch::channel(false);

        dispatcher.run(rx).await.unwrap();

        let log = channel.log();
        assert_eq!(log[0], "answer:q1");
        assert!(log[1].starts_with("send:Введите имя"));
        assert_eq!(log[2], "send:✅ День рождения Ann Lee успешно добавлен!");
        assert!(log[3].contains("Ann Lee - 15 марта - через 7 дней (15.03.1990)"));
        assert_eq!(store.list_birthdays(-1, NaiveDate::from_ymd_opt(2026, 3, 8).unwrap()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_edit_directive_reaches_channel() {
        let channel = Arc::new(ScriptedChannel::default());
        let (dispatcher, store) = dispatcher(channel.clone());
        store
            .add_birthday(
                bdaybot_core::types::NewBirthday::new("Ann", NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(), -1),
                NaiveDate::from_ymd_opt(2026, 3, 8).unwrap(),
            )
            .await
            .unwrap();

        dispatcher.dispatch(press("delete_name_Ann")).await;
        assert_eq!(channel.log(), vec!["answer:q1", "edit:40:✅ День рождения Ann успешно удален!"]);
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        // A channel whose stream never yields.
        struct Silent;

        #[async_trait]
        impl Channel for Silent {
            fn name(&self) -> &str { "silent" }
            async fn connect(&mut self) -> Result<()> { Ok(()) }
            async fn disconnect(&mut self) -> Result<()> { Ok(()) }
            fn is_connected(&self) -> bool { true }
            async fn send(&self, m: OutgoingMessage) -> Result<MessageRef> {
                Ok(MessageRef { chat_id: m.chat_id, message_id: 0 })
            }
            async fn edit_message(&self, _: i64, _: i64, _: &str, _: &[Vec<Choice>]) -> Result<()> {
                Ok(())
            }
            async fn listen(&self) -> Result<Box<dyn Stream<Item = IncomingEvent> + Send + Unpin>> {
                Ok(Box::new(futures::stream::pending()))
            }
        }

        let store = Arc::new(InMemoryStore::new());
        let handler = Handler::new(store, chrono::Duration::seconds(300));
        let clock = Arc::new(FixedClock::new(
            NaiveDate::from_ymd_opt(2026, 3, 8).unwrap().and_hms_opt(10, 0, 0).unwrap(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(handler, Arc::new(Silent), clock));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.run(rx).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
