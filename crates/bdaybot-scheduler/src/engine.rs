//! Scheduler engine: ticks on a tokio interval and sends daily reminders.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bdaybot_core::clock::Clock;
use bdaybot_core::config::SchedulerConfig;
use bdaybot_core::error::{BdayError, Result};
use bdaybot_core::format::format_upcoming;
use bdaybot_core::traits::{BirthdayStore, Channel};
use chrono::NaiveDateTime;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::due::is_due_within;

/// Outcome of one pass over all groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub groups_checked: usize,
    pub notified: usize,
    pub failures: usize,
}

pub struct SchedulerEngine {
    store: Arc<dyn BirthdayStore>,
    channel: Arc<dyn Channel>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
}

impl SchedulerEngine {
    pub fn new(
        store: Arc<dyn BirthdayStore>,
        channel: Arc<dyn Channel>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self { store, channel, clock, config }
    }

    /// Tick until `shutdown` turns true. A tick in progress is allowed to finish.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if !self.config.enabled {
            tracing::info!("Scheduler disabled");
            return;
        }

        let period = Duration::from_secs(self.config.tick_secs.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            "Scheduler started: tick every {}s, lookahead {} days",
            period.as_secs(),
            self.config.lookahead_days
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.tick(self.clock.now()).await;
                    if report.notified > 0 || report.failures > 0 {
                        tracing::info!(
                            "Scheduler tick: {} groups, {} notified, {} failed",
                            report.groups_checked, report.notified, report.failures
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Scheduler stopped");
    }

    /// One pass over every known group at `now`.
    pub async fn tick(&self, now: NaiveDateTime) -> TickReport {
        let mut report = TickReport::default();

        let groups = match self.guarded("list groups", self.store.list_all_groups()).await {
            Ok(groups) => groups,
            Err(e) => {
                tracing::error!("Scheduler: {e}");
                report.failures += 1;
                return report;
            }
        };

        for group in groups {
            report.groups_checked += 1;
            match self.check_group(group.id, now).await {
                Ok(true) => report.notified += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Scheduler: group {}: {e}", group.id);
                    report.failures += 1;
                }
            }
        }
        report
    }

    /// Returns whether a reminder was sent.
    async fn check_group(&self, group_id: i64, now: NaiveDateTime) -> Result<bool> {
        let notify_time = self
            .guarded("get notify time", self.store.get_notify_time(group_id))
            .await?;
        let window = chrono::Duration::seconds(self.config.due_window_secs.min(86_400) as i64);
        if !is_due_within(notify_time, now, window) {
            return Ok(false);
        }

        let today = now.date();
        if self.config.dedup_daily {
            let last = self
                .guarded("read last notified", self.store.last_notified(group_id))
                .await?;
            if last == Some(today) {
                tracing::debug!("Group {group_id} already notified on {today}");
                return Ok(false);
            }
        }

        let upcoming = self
            .guarded(
                "list upcoming",
                self.store.list_upcoming(group_id, today, self.config.lookahead_days),
            )
            .await?;
        if upcoming.is_empty() {
            tracing::debug!("Group {group_id}: no birthdays in the next {} days", self.config.lookahead_days);
            return Ok(false);
        }

        let text = format_upcoming(&upcoming, today);
        self.guarded("send reminder", self.channel.send_text(group_id, &text))
            .await?;
        tracing::info!("Reminder sent to group {group_id} ({} upcoming)", upcoming.len());

        if self.config.dedup_daily {
            if let Err(e) = self
                .guarded("mark notified", self.store.mark_notified(group_id, today))
                .await
            {
                tracing::warn!("Group {group_id}: reminder sent but not recorded: {e}");
            }
        }
        Ok(true)
    }

    async fn guarded<T>(&self, what: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        let limit = Duration::from_secs(self.config.call_timeout_secs.max(1));
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(BdayError::timeout(format!("{what} exceeded {}s", limit.as_secs()))),
        }
    }
}
