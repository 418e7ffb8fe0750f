use std::sync::Arc;

use chrono::{Duration, Utc};
use chrono_tz::Tz;
use tracing::{debug, error, info, warn};

use crate::chat::{ChatGateway, ChatMessage, DeliveryError};
use crate::db::{DatabaseError, NewReminder, Reminder, ReminderStore, UserStore};
use crate::parsers::reminders::{
    MAX_RECURRENCE_SECONDS, MIN_RECURRENCE_SECONDS, Preposition, parse_absolute_time,
    parse_relative_time, parse_reminder_command,
};
use crate::scheduler::Scheduler;

/// How a parsed reminder request was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderAck {
    Created,
    InvalidTime,
    InvalidInterval,
    IntervalTooShort,
    IntervalTooLong,
    TooManyReminders,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetTimezoneOutcome {
    Set,
    NotRegistered,
    InvalidTimezone,
}

/// Creates, fires, and reschedules reminders. All pending rows are reloaded
/// into the scheduler on startup; one-shot reminders are deleted after
/// delivery, recurring ones advance their fire time and reschedule
/// themselves.
pub struct ReminderService {
    users: Arc<dyn UserStore>,
    store: Arc<dyn ReminderStore>,
    gateway: Arc<dyn ChatGateway>,
    scheduler: Scheduler,
    max_per_owner: i64,
}

impl ReminderService {
    pub fn new(
        users: Arc<dyn UserStore>,
        store: Arc<dyn ReminderStore>,
        gateway: Arc<dyn ChatGateway>,
        max_per_owner: i64,
    ) -> Self {
        Self {
            users,
            store,
            gateway,
            scheduler: Scheduler::new("Reminders"),
            max_per_owner,
        }
    }

    fn task_id(reminder_id: i64) -> String {
        format!("reminder_{reminder_id}")
    }

    /// Reconstructs scheduler state from storage. In-flight timers never
    /// survive a restart, so every pending row is re-registered.
    pub async fn load_pending(self: Arc<Self>) -> Result<(), DatabaseError> {
        info!("loading pending reminders and rescheduling them");

        let pending = self.store.pending_reminders().await?;
        let count = pending.len();
        for reminder in pending {
            Arc::clone(&self).schedule_delivery(reminder);
        }

        info!("scheduled {} reminders", count);
        Ok(())
    }

    pub fn schedule_delivery(self: Arc<Self>, reminder: Reminder) {
        let task_id = Self::task_id(reminder.id);
        let run_at = reminder.remind_at;
        let service = Arc::clone(&self);
        self.scheduler.schedule(run_at, task_id, async move {
            service.deliver(reminder).await;
        });
    }

    async fn deliver(self: Arc<Self>, reminder: Reminder) {
        info!("attempting to send reminder (id={})", reminder.id);

        let text = format!("Here's your reminder: {}", reminder.reminder_text);
        match self
            .gateway
            .reply_to(&reminder.channel_id, &reminder.original_message_id, &text)
            .await
        {
            Ok(()) => {}
            Err(DeliveryError::Unresolvable(reason)) => {
                warn!(
                    "failed to send reminder (id={}), destination unresolvable: {}",
                    reminder.id, reason
                );
                if let Err(err) = self.store.mark_failed(reminder.id).await {
                    error!("failed to mark reminder (id={}) as failed: {}", reminder.id, err);
                }
                return;
            }
            Err(DeliveryError::Transient(reason)) => {
                // left pending; the row is picked up again on restart
                error!(
                    "failed to send reminder (id={}) after retries: {}",
                    reminder.id, reason
                );
                return;
            }
        }

        info!("reminder sent (id={})", reminder.id);

        if reminder.is_recurring {
            let Some(interval) = reminder.recurrence_interval else {
                error!(
                    "recurring reminder (id={}) has no interval, leaving it alone",
                    reminder.id
                );
                return;
            };

            let next_remind_at = reminder.remind_at + Duration::seconds(interval);
            match self.store.advance_remind_at(reminder.id, next_remind_at).await {
                Ok(Some(updated)) => {
                    info!("rescheduling recurring reminder (id={})", updated.id);
                    Arc::clone(&self).schedule_delivery(updated);
                }
                Ok(None) => {
                    warn!(
                        "recurring reminder (id={}) disappeared before rescheduling",
                        reminder.id
                    );
                }
                Err(err) => {
                    error!("failed to advance reminder (id={}): {}", reminder.id, err);
                }
            }
        } else {
            debug!("deleting reminder with id={}", reminder.id);
            if let Err(err) = self.store.delete_reminder(reminder.id, None).await {
                error!("failed to delete reminder (id={}): {}", reminder.id, err);
            }
        }
    }

    /// Parses a "remind me" phrase out of a message and, when valid, persists
    /// and schedules the reminder. Returns None when the message contains no
    /// reminder request at all.
    pub async fn handle_message(
        self: Arc<Self>,
        message: &ChatMessage,
    ) -> Result<Option<ReminderAck>, DatabaseError> {
        let Some(command) = parse_reminder_command(&message.content) else {
            return Ok(None);
        };

        let remind_at = match command.preposition {
            Preposition::In => parse_relative_time(&command.time).map(|d| Utc::now() + d),
            Preposition::At | Preposition::On => {
                let user = self.users.get_by_snowflake(&message.author_id).await?;
                let tz = match user.and_then(|u| u.timezone) {
                    Some(tz_name) => match tz_name.parse::<Tz>() {
                        Ok(tz) => tz,
                        Err(_) => {
                            warn!(
                                "user '{}' has invalid timezone '{}' stored",
                                message.author_id, tz_name
                            );
                            return Ok(Some(ReminderAck::InvalidTime));
                        }
                    },
                    None => chrono_tz::UTC,
                };
                parse_absolute_time(&command.time, tz)
            }
        };

        let Some(remind_at) = remind_at else {
            info!(
                "'{}' gave invalid time format: '{}'",
                message.author_id, command.time
            );
            return Ok(Some(ReminderAck::InvalidTime));
        };

        let recurrence_interval = match &command.interval {
            Some(interval_text) => {
                let Some(interval) = parse_relative_time(interval_text) else {
                    info!(
                        "'{}' gave invalid interval format: '{}'",
                        message.author_id, interval_text
                    );
                    return Ok(Some(ReminderAck::InvalidInterval));
                };

                let seconds = interval.num_seconds();
                if seconds < MIN_RECURRENCE_SECONDS {
                    info!(
                        "'{}' gave an interval that's too short: '{}'",
                        message.author_id, interval_text
                    );
                    return Ok(Some(ReminderAck::IntervalTooShort));
                }
                if seconds > MAX_RECURRENCE_SECONDS {
                    info!(
                        "'{}' gave an interval that's too long: '{}'",
                        message.author_id, interval_text
                    );
                    return Ok(Some(ReminderAck::IntervalTooLong));
                }
                Some(seconds)
            }
            None => None,
        };

        let pending = self.store.count_pending_for_owner(&message.author_id).await?;
        if pending >= self.max_per_owner {
            info!(
                "'{}' tried creating a reminder but it would exceed the max allowed ({})",
                message.author_id, self.max_per_owner
            );
            return Ok(Some(ReminderAck::TooManyReminders));
        }

        let reminder = self
            .store
            .create_reminder(&NewReminder {
                owner: message.author_id.clone(),
                channel_id: message.channel_id.clone(),
                original_message_id: message.message_id.clone(),
                reminder_text: command.body.clone(),
                remind_at,
                is_recurring: recurrence_interval.is_some(),
                recurrence_interval,
            })
            .await?;

        info!(
            "'{}' created a reminder (id={}): '{}'",
            message.author_id, reminder.id, reminder.reminder_text
        );
        Arc::clone(&self).schedule_delivery(reminder);

        Ok(Some(ReminderAck::Created))
    }

    pub async fn list(&self, owner: Option<&str>) -> Result<Vec<Reminder>, DatabaseError> {
        self.store.list_reminders(owner).await
    }

    /// Deletes a reminder and cancels its timer. Non-admin requesters may
    /// only delete their own.
    pub async fn delete(
        &self,
        reminder_id: i64,
        requester: &str,
        is_admin: bool,
    ) -> Result<bool, DatabaseError> {
        let owner = if is_admin { None } else { Some(requester) };
        let deleted = self.store.delete_reminder(reminder_id, owner).await?;

        if deleted {
            self.scheduler.cancel(&Self::task_id(reminder_id));
            info!("deleted reminder with id={}", reminder_id);
        } else {
            info!(
                "reminder (id={}) didn't exist or '{}' lacked permission to delete it",
                reminder_id, requester
            );
        }

        Ok(deleted)
    }

    pub async fn set_timezone(
        &self,
        snowflake: &str,
        timezone: &str,
    ) -> Result<SetTimezoneOutcome, DatabaseError> {
        if timezone.parse::<Tz>().is_err() {
            return Ok(SetTimezoneOutcome::InvalidTimezone);
        }

        let updated = self.users.set_timezone(snowflake, timezone).await?;
        if updated == 0 {
            info!("failed to set timezone, '{}' not in user table", snowflake);
            Ok(SetTimezoneOutcome::NotRegistered)
        } else {
            Ok(SetTimezoneOutcome::Set)
        }
    }

    pub fn shutdown(&self) {
        self.scheduler.cancel_all();
    }

    #[cfg(test)]
    pub(crate) fn scheduled_count(&self) -> usize {
        self.scheduler.task_count()
    }
}
