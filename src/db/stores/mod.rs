use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::DatabaseError;
use super::models::{
    NewReminder, RankedTotal, Reminder, TriggerDelivery, TriggerGroup, TriggerRule, User,
};

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_snowflake(&self, snowflake: &str) -> Result<Option<User>, DatabaseError>;
    async fn get_by_name(&self, name: &str) -> Result<Option<User>, DatabaseError>;
    async fn list_users(&self) -> Result<Vec<User>, DatabaseError>;
    async fn create_user(
        &self,
        name: &str,
        snowflake: Option<&str>,
        point_giver: bool,
    ) -> Result<User, DatabaseError>;
    async fn reactivate_user(
        &self,
        name: &str,
        snowflake: Option<&str>,
        point_giver: bool,
    ) -> Result<(), DatabaseError>;
    async fn deactivate_user(&self, name: &str) -> Result<(), DatabaseError>;
    async fn rename_user(&self, id: &str, new_name: &str) -> Result<(), DatabaseError>;
    async fn set_point_giver(&self, id: &str, point_giver: bool) -> Result<(), DatabaseError>;
    /// Returns the number of rows updated; zero means the snowflake is not
    /// registered.
    async fn set_timezone(&self, snowflake: &str, timezone: &str) -> Result<usize, DatabaseError>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert_transfer(
        &self,
        bestower_id: &str,
        recipient_id: &str,
        points: i64,
    ) -> Result<(), DatabaseError>;
    /// Fans one transfer out to every active, point-eligible, snowflake-linked
    /// user except the bestower, as a single INSERT..SELECT. Returns the
    /// number of ledger rows written.
    async fn insert_broadcast_transfer(
        &self,
        bestower_id: &str,
        points: i64,
    ) -> Result<usize, DatabaseError>;
    /// Per-recipient point sums over active users, optionally restricted to
    /// entries created after `since`. Unordered; callers rank.
    async fn ranked_totals(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RankedTotal>, DatabaseError>;
}

#[async_trait]
pub trait ReminderStore: Send + Sync {
    async fn create_reminder(&self, new: &NewReminder) -> Result<Reminder, DatabaseError>;
    async fn pending_reminders(&self) -> Result<Vec<Reminder>, DatabaseError>;
    async fn count_pending_for_owner(&self, owner: &str) -> Result<i64, DatabaseError>;
    async fn list_reminders(&self, owner: Option<&str>) -> Result<Vec<Reminder>, DatabaseError>;
    /// Moves a recurring reminder's fire time forward, returning the updated
    /// row (None when the reminder no longer exists).
    async fn advance_remind_at(
        &self,
        id: i64,
        new_remind_at: DateTime<Utc>,
    ) -> Result<Option<Reminder>, DatabaseError>;
    async fn mark_failed(&self, id: i64) -> Result<(), DatabaseError>;
    /// Deletes a reminder, optionally constrained to an owner. Returns whether
    /// a row was removed.
    async fn delete_reminder(&self, id: i64, owner: Option<&str>) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait TriggerStore: Send + Sync {
    async fn load_active_rules(&self) -> Result<Vec<TriggerRule>, DatabaseError>;
    async fn count_groups_for_owner(
        &self,
        owner: &str,
        is_regex: bool,
    ) -> Result<i64, DatabaseError>;
    /// Inserts a group together with its patterns and responses in one
    /// transaction. Returns the new group id.
    async fn create_group(
        &self,
        owner: &str,
        is_regex: bool,
        delivery: TriggerDelivery,
        patterns: &[String],
        responses: &[String],
    ) -> Result<i64, DatabaseError>;
    async fn get_group(&self, group_id: i64) -> Result<Option<TriggerGroup>, DatabaseError>;
    async fn get_rule(&self, group_id: i64) -> Result<Option<TriggerRule>, DatabaseError>;
    /// Replaces a group's patterns and responses in one transaction. Returns
    /// whether the group existed.
    async fn replace_group_contents(
        &self,
        group_id: i64,
        is_regex: bool,
        patterns: &[String],
        responses: &[String],
    ) -> Result<bool, DatabaseError>;
    async fn set_group_active(&self, group_id: i64, active: bool) -> Result<bool, DatabaseError>;
    async fn delete_group(&self, group_id: i64) -> Result<bool, DatabaseError>;
    async fn list_groups(&self, owner: Option<&str>) -> Result<Vec<TriggerGroup>, DatabaseError>;
}
