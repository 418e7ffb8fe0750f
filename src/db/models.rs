use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub discord_snowflake: Option<String>,
    pub timezone: Option<String>,
    pub is_active: bool,
    pub point_giver: bool,
    pub created_at: DateTime<Utc>,
}

/// One immutable point transfer. Rows are only ever inserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub bestower: String,
    pub recipient: String,
    pub points: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedTotal {
    pub name: String,
    pub points: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderStatus {
    Pending,
    Failed,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStatus::Pending => "pending",
            ReminderStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ReminderStatus::Pending),
            "failed" => Some(ReminderStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: i64,
    pub owner: String,
    pub channel_id: String,
    pub original_message_id: String,
    pub reminder_text: String,
    pub remind_at: DateTime<Utc>,
    pub is_recurring: bool,
    pub recurrence_interval: Option<i64>,
    pub status: ReminderStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReminder {
    pub owner: String,
    pub channel_id: String,
    pub original_message_id: String,
    pub reminder_text: String,
    pub remind_at: DateTime<Utc>,
    pub is_recurring: bool,
    pub recurrence_interval: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerDelivery {
    Channel,
    Reply,
    React,
}

impl TriggerDelivery {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerDelivery::Channel => "channel",
            TriggerDelivery::Reply => "reply",
            TriggerDelivery::React => "react",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "channel" => Some(TriggerDelivery::Channel),
            "reply" => Some(TriggerDelivery::Reply),
            "react" => Some(TriggerDelivery::React),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerGroup {
    pub id: i64,
    pub owner: String,
    pub is_active: bool,
    pub delivery: TriggerDelivery,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A group's full pattern/response bundle as consumed by the in-memory cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRule {
    pub group_id: i64,
    pub patterns: Vec<String>,
    pub responses: Vec<String>,
    pub is_regex: bool,
    pub delivery: TriggerDelivery,
}
