use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;
use uuid::Uuid;

use crate::db::schema::{ledger, reminders, trigger_groups, trigger_patterns, trigger_responses, users};

use super::{
    DatabaseError,
    models::{
        NewReminder, RankedTotal, Reminder, ReminderStatus, TriggerDelivery, TriggerGroup,
        TriggerRule, User,
    },
};

// Timestamps are stored as fixed-width RFC 3339 text so that string
// comparison in SQL orders them chronologically.
fn datetime_to_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn string_to_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Query(format!("invalid datetime format: {}", e)))
}

fn establish_connection(path: &str) -> Result<SqliteConnection, DatabaseError> {
    let mut conn =
        SqliteConnection::establish(path).map_err(|e| DatabaseError::Connection(e.to_string()))?;
    diesel::sql_query("PRAGMA foreign_keys = ON")
        .execute(&mut conn)
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;
    Ok(conn)
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
struct DbUser {
    id: String,
    name: String,
    discord_snowflake: Option<String>,
    timezone: Option<String>,
    is_active: bool,
    point_giver: bool,
    created_at: String,
}

impl DbUser {
    fn to_user(&self) -> Result<User, DatabaseError> {
        Ok(User {
            id: self.id.clone(),
            name: self.name.clone(),
            discord_snowflake: self.discord_snowflake.clone(),
            timezone: self.timezone.clone(),
            is_active: self.is_active,
            point_giver: self.point_giver,
            created_at: string_to_datetime(&self.created_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = users)]
struct NewDbUser<'a> {
    id: String,
    name: &'a str,
    discord_snowflake: Option<&'a str>,
    is_active: bool,
    point_giver: bool,
    created_at: String,
}

#[derive(Insertable)]
#[diesel(table_name = ledger)]
struct NewDbLedgerEntry<'a> {
    id: String,
    bestower: &'a str,
    recipient: &'a str,
    points: i64,
    created_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = reminders)]
struct DbReminder {
    id: i64,
    owner: String,
    channel_id: String,
    original_message_id: String,
    reminder_text: String,
    remind_at: String,
    is_recurring: bool,
    recurrence_interval: Option<i64>,
    status: String,
    created_at: String,
}

impl DbReminder {
    fn to_reminder(&self) -> Result<Reminder, DatabaseError> {
        let status = ReminderStatus::parse(&self.status).ok_or_else(|| {
            DatabaseError::Query(format!("unknown reminder status '{}'", self.status))
        })?;
        Ok(Reminder {
            id: self.id,
            owner: self.owner.clone(),
            channel_id: self.channel_id.clone(),
            original_message_id: self.original_message_id.clone(),
            reminder_text: self.reminder_text.clone(),
            remind_at: string_to_datetime(&self.remind_at)?,
            is_recurring: self.is_recurring,
            recurrence_interval: self.recurrence_interval,
            status,
            created_at: string_to_datetime(&self.created_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = reminders)]
struct NewDbReminder<'a> {
    owner: &'a str,
    channel_id: &'a str,
    original_message_id: &'a str,
    reminder_text: &'a str,
    remind_at: String,
    is_recurring: bool,
    recurrence_interval: Option<i64>,
    status: &'a str,
    created_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = trigger_groups)]
struct DbTriggerGroup {
    id: i64,
    owner: String,
    is_active: bool,
    delivery: String,
    created_at: String,
    updated_at: String,
}

impl DbTriggerGroup {
    fn to_group(&self) -> Result<TriggerGroup, DatabaseError> {
        let delivery = TriggerDelivery::parse(&self.delivery).ok_or_else(|| {
            DatabaseError::Query(format!("unknown trigger delivery '{}'", self.delivery))
        })?;
        Ok(TriggerGroup {
            id: self.id,
            owner: self.owner.clone(),
            is_active: self.is_active,
            delivery,
            created_at: string_to_datetime(&self.created_at)?,
            updated_at: string_to_datetime(&self.updated_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = trigger_groups)]
struct NewDbTriggerGroup<'a> {
    owner: &'a str,
    is_active: bool,
    delivery: &'a str,
    created_at: String,
    updated_at: String,
}

#[derive(Insertable)]
#[diesel(table_name = trigger_patterns)]
struct NewDbTriggerPattern<'a> {
    group_id: i64,
    pattern: &'a str,
    is_regex: bool,
}

#[derive(Insertable)]
#[diesel(table_name = trigger_responses)]
struct NewDbTriggerResponse<'a> {
    group_id: i64,
    response: &'a str,
}

fn last_insert_rowid(conn: &mut SqliteConnection) -> QueryResult<i64> {
    diesel::select(diesel::dsl::sql::<diesel::sql_types::BigInt>("last_insert_rowid()"))
        .get_result(conn)
}

pub struct SqliteUserStore {
    db_path: Arc<String>,
}

impl SqliteUserStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::UserStore for SqliteUserStore {
    async fn get_by_snowflake(&self, snowflake: &str) -> Result<Option<User>, DatabaseError> {
        let snowflake = snowflake.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema::users::dsl::*;
            users
                .filter(discord_snowflake.eq(snowflake))
                .select(DbUser::as_select())
                .first::<DbUser>(&mut conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(|u| u.to_user())
                .transpose()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn get_by_name(&self, name_param: &str) -> Result<Option<User>, DatabaseError> {
        let name_param = name_param.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema::users::dsl::*;
            users
                .filter(name.eq(name_param))
                .select(DbUser::as_select())
                .first::<DbUser>(&mut conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(|u| u.to_user())
                .transpose()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn list_users(&self) -> Result<Vec<User>, DatabaseError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema::users::dsl::*;
            let results = users
                .order(name.asc())
                .select(DbUser::as_select())
                .load::<DbUser>(&mut conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            results.into_iter().map(|u| u.to_user()).collect()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn create_user(
        &self,
        name: &str,
        snowflake: Option<&str>,
        point_giver: bool,
    ) -> Result<User, DatabaseError> {
        let name = name.to_string();
        let snowflake = snowflake.map(str::to_string);
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            let user_id = Uuid::new_v4().to_string();
            let now = Utc::now();

            {
                let new_user = NewDbUser {
                    id: user_id.clone(),
                    name: &name,
                    discord_snowflake: snowflake.as_deref(),
                    is_active: true,
                    point_giver,
                    created_at: datetime_to_string(&now),
                };

                diesel::insert_into(users::table)
                    .values(&new_user)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Query(e.to_string()))?;
            }

            Ok(User {
                id: user_id,
                name,
                discord_snowflake: snowflake,
                timezone: None,
                is_active: true,
                point_giver,
                created_at: now,
            })
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn reactivate_user(
        &self,
        name_param: &str,
        snowflake: Option<&str>,
        point_giver_param: bool,
    ) -> Result<(), DatabaseError> {
        let name_param = name_param.to_string();
        let snowflake = snowflake.map(str::to_string);
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema::users::dsl::*;
            diesel::update(users.filter(name.eq(name_param)))
                .set((
                    is_active.eq(true),
                    discord_snowflake.eq(snowflake),
                    point_giver.eq(point_giver_param),
                ))
                .execute(&mut conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn deactivate_user(&self, name_param: &str) -> Result<(), DatabaseError> {
        let name_param = name_param.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema::users::dsl::*;
            diesel::update(users.filter(name.eq(name_param)))
                .set(is_active.eq(false))
                .execute(&mut conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn rename_user(&self, id_param: &str, new_name: &str) -> Result<(), DatabaseError> {
        let id_param = id_param.to_string();
        let new_name = new_name.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema::users::dsl::*;
            diesel::update(users.filter(id.eq(id_param)))
                .set(name.eq(new_name))
                .execute(&mut conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn set_point_giver(
        &self,
        id_param: &str,
        point_giver_param: bool,
    ) -> Result<(), DatabaseError> {
        let id_param = id_param.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema::users::dsl::*;
            diesel::update(users.filter(id.eq(id_param)))
                .set(point_giver.eq(point_giver_param))
                .execute(&mut conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn set_timezone(
        &self,
        snowflake: &str,
        timezone_param: &str,
    ) -> Result<usize, DatabaseError> {
        let snowflake = snowflake.to_string();
        let timezone_param = timezone_param.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema::users::dsl::*;
            diesel::update(users.filter(discord_snowflake.eq(snowflake)))
                .set(timezone.eq(timezone_param))
                .execute(&mut conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }
}

pub struct SqliteLedgerStore {
    db_path: Arc<String>,
}

impl SqliteLedgerStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::LedgerStore for SqliteLedgerStore {
    async fn insert_transfer(
        &self,
        bestower_id: &str,
        recipient_id: &str,
        points: i64,
    ) -> Result<(), DatabaseError> {
        let bestower_id = bestower_id.to_string();
        let recipient_id = recipient_id.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            let entry = NewDbLedgerEntry {
                id: Uuid::new_v4().to_string(),
                bestower: &bestower_id,
                recipient: &recipient_id,
                points,
                created_at: datetime_to_string(&Utc::now()),
            };

            diesel::insert_into(ledger::table)
                .values(&entry)
                .execute(&mut conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn insert_broadcast_transfer(
        &self,
        bestower_id: &str,
        points: i64,
    ) -> Result<usize, DatabaseError> {
        let bestower_id = bestower_id.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            diesel::sql_query(
                "INSERT INTO ledger (id, bestower, recipient, points, created_at) \
                 SELECT lower(hex(randomblob(16))), ?, id, ?, ? FROM users \
                 WHERE is_active = 1 AND point_giver = 1 \
                 AND discord_snowflake IS NOT NULL AND id != ?",
            )
            .bind::<diesel::sql_types::Text, _>(&bestower_id)
            .bind::<diesel::sql_types::BigInt, _>(points)
            .bind::<diesel::sql_types::Text, _>(&datetime_to_string(&Utc::now()))
            .bind::<diesel::sql_types::Text, _>(&bestower_id)
            .execute(&mut conn)
            .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn ranked_totals(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<RankedTotal>, DatabaseError> {
        let since = since.map(|cutoff| datetime_to_string(&cutoff));
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use diesel::dsl::sql;
            use diesel::sql_types::{BigInt, Nullable};

            let rows: Vec<(String, Option<i64>)> = match since {
                Some(cutoff) => ledger::table
                    .inner_join(users::table.on(users::id.eq(ledger::recipient)))
                    .filter(users::is_active.eq(true))
                    .filter(ledger::created_at.gt(cutoff))
                    .group_by((users::id, users::name))
                    .select((users::name, sql::<Nullable<BigInt>>("SUM(ledger.points)")))
                    .load(&mut conn),
                None => ledger::table
                    .inner_join(users::table.on(users::id.eq(ledger::recipient)))
                    .filter(users::is_active.eq(true))
                    .group_by((users::id, users::name))
                    .select((users::name, sql::<Nullable<BigInt>>("SUM(ledger.points)")))
                    .load(&mut conn),
            }
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

            Ok(rows
                .into_iter()
                .map(|(name, total)| RankedTotal {
                    name,
                    points: total.unwrap_or_default(),
                })
                .collect())
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }
}

pub struct SqliteReminderStore {
    db_path: Arc<String>,
}

impl SqliteReminderStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::ReminderStore for SqliteReminderStore {
    async fn create_reminder(&self, new: &NewReminder) -> Result<Reminder, DatabaseError> {
        let new = new.clone();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            let row = conn
                .transaction::<DbReminder, diesel::result::Error, _>(|conn| {
                    let new_reminder = NewDbReminder {
                        owner: &new.owner,
                        channel_id: &new.channel_id,
                        original_message_id: &new.original_message_id,
                        reminder_text: &new.reminder_text,
                        remind_at: datetime_to_string(&new.remind_at),
                        is_recurring: new.is_recurring,
                        recurrence_interval: new.recurrence_interval,
                        status: ReminderStatus::Pending.as_str(),
                        created_at: datetime_to_string(&Utc::now()),
                    };

                    diesel::insert_into(reminders::table)
                        .values(&new_reminder)
                        .execute(conn)?;

                    let rowid = last_insert_rowid(conn)?;
                    reminders::table
                        .filter(reminders::id.eq(rowid))
                        .select(DbReminder::as_select())
                        .first(conn)
                })
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            row.to_reminder()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn pending_reminders(&self) -> Result<Vec<Reminder>, DatabaseError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema::reminders::dsl::*;
            let rows = reminders
                .filter(status.eq(ReminderStatus::Pending.as_str()))
                .order(remind_at.asc())
                .select(DbReminder::as_select())
                .load::<DbReminder>(&mut conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            rows.into_iter().map(|r| r.to_reminder()).collect()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn count_pending_for_owner(&self, owner_param: &str) -> Result<i64, DatabaseError> {
        let owner_param = owner_param.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema::reminders::dsl::*;
            reminders
                .filter(owner.eq(owner_param))
                .filter(status.eq(ReminderStatus::Pending.as_str()))
                .count()
                .get_result(&mut conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn list_reminders(
        &self,
        owner_param: Option<&str>,
    ) -> Result<Vec<Reminder>, DatabaseError> {
        let owner_param = owner_param.map(str::to_string);
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema::reminders::dsl::*;
            let rows = match owner_param {
                Some(owner_filter) => reminders
                    .filter(owner.eq(owner_filter))
                    .order(remind_at.asc())
                    .select(DbReminder::as_select())
                    .load::<DbReminder>(&mut conn),
                None => reminders
                    .order(remind_at.asc())
                    .select(DbReminder::as_select())
                    .load::<DbReminder>(&mut conn),
            }
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

            rows.into_iter().map(|r| r.to_reminder()).collect()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn advance_remind_at(
        &self,
        id_param: i64,
        new_remind_at: DateTime<Utc>,
    ) -> Result<Option<Reminder>, DatabaseError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            let row = conn
                .transaction::<Option<DbReminder>, diesel::result::Error, _>(|conn| {
                    use crate::db::schema::reminders::dsl::*;
                    diesel::update(reminders.filter(id.eq(id_param)))
                        .set(remind_at.eq(datetime_to_string(&new_remind_at)))
                        .execute(conn)?;

                    reminders
                        .filter(id.eq(id_param))
                        .select(DbReminder::as_select())
                        .first::<DbReminder>(conn)
                        .optional()
                })
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            row.map(|r| r.to_reminder()).transpose()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn mark_failed(&self, id_param: i64) -> Result<(), DatabaseError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema::reminders::dsl::*;
            diesel::update(reminders.filter(id.eq(id_param)))
                .set(status.eq(ReminderStatus::Failed.as_str()))
                .execute(&mut conn)
                .map(|_| ())
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn delete_reminder(
        &self,
        id_param: i64,
        owner_param: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        let owner_param = owner_param.map(str::to_string);
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema::reminders::dsl::*;
            let rows = match owner_param {
                Some(owner_filter) => diesel::delete(
                    reminders
                        .filter(id.eq(id_param))
                        .filter(owner.eq(owner_filter)),
                )
                .execute(&mut conn),
                None => diesel::delete(reminders.filter(id.eq(id_param))).execute(&mut conn),
            }
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

            Ok(rows > 0)
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }
}

pub struct SqliteTriggerStore {
    db_path: Arc<String>,
}

impl SqliteTriggerStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

fn load_rule_rows(
    conn: &mut SqliteConnection,
    group: &DbTriggerGroup,
) -> Result<TriggerRule, DatabaseError> {
    let pattern_rows: Vec<(String, bool)> = trigger_patterns::table
        .filter(trigger_patterns::group_id.eq(group.id))
        .select((trigger_patterns::pattern, trigger_patterns::is_regex))
        .load(conn)
        .map_err(|e| DatabaseError::Query(e.to_string()))?;

    let responses: Vec<String> = trigger_responses::table
        .filter(trigger_responses::group_id.eq(group.id))
        .select(trigger_responses::response)
        .load(conn)
        .map_err(|e| DatabaseError::Query(e.to_string()))?;

    // all patterns of a group share one is_regex flag
    let is_regex = pattern_rows.first().map(|(_, flag)| *flag).unwrap_or(false);
    let delivery = TriggerDelivery::parse(&group.delivery).ok_or_else(|| {
        DatabaseError::Query(format!("unknown trigger delivery '{}'", group.delivery))
    })?;

    Ok(TriggerRule {
        group_id: group.id,
        patterns: pattern_rows.into_iter().map(|(p, _)| p).collect(),
        responses,
        is_regex,
        delivery,
    })
}

#[async_trait]
impl super::TriggerStore for SqliteTriggerStore {
    async fn load_active_rules(&self) -> Result<Vec<TriggerRule>, DatabaseError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            let groups: Vec<DbTriggerGroup> = trigger_groups::table
                .filter(trigger_groups::is_active.eq(true))
                .select(DbTriggerGroup::as_select())
                .load(&mut conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            groups
                .iter()
                .map(|group| load_rule_rows(&mut conn, group))
                .collect()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn count_groups_for_owner(
        &self,
        owner_param: &str,
        is_regex_param: bool,
    ) -> Result<i64, DatabaseError> {
        let owner_param = owner_param.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use diesel::dsl::count_distinct;
            trigger_patterns::table
                .inner_join(trigger_groups::table)
                .filter(trigger_groups::owner.eq(owner_param))
                .filter(trigger_patterns::is_regex.eq(is_regex_param))
                .select(count_distinct(trigger_patterns::group_id))
                .get_result(&mut conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn create_group(
        &self,
        owner: &str,
        is_regex: bool,
        delivery: TriggerDelivery,
        patterns: &[String],
        responses: &[String],
    ) -> Result<i64, DatabaseError> {
        let owner = owner.to_string();
        let patterns = patterns.to_vec();
        let responses = responses.to_vec();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            conn.transaction::<i64, diesel::result::Error, _>(|conn| {
                let now = datetime_to_string(&Utc::now());
                let new_group = NewDbTriggerGroup {
                    owner: &owner,
                    is_active: true,
                    delivery: delivery.as_str(),
                    created_at: now.clone(),
                    updated_at: now,
                };

                diesel::insert_into(trigger_groups::table)
                    .values(&new_group)
                    .execute(conn)?;

                let group_id = last_insert_rowid(conn)?;

                let pattern_rows: Vec<NewDbTriggerPattern> = patterns
                    .iter()
                    .map(|pattern| NewDbTriggerPattern {
                        group_id,
                        pattern,
                        is_regex,
                    })
                    .collect();
                diesel::insert_into(trigger_patterns::table)
                    .values(&pattern_rows)
                    .execute(conn)?;

                let response_rows: Vec<NewDbTriggerResponse> = responses
                    .iter()
                    .map(|response| NewDbTriggerResponse { group_id, response })
                    .collect();
                diesel::insert_into(trigger_responses::table)
                    .values(&response_rows)
                    .execute(conn)?;

                Ok(group_id)
            })
            .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn get_group(&self, group_id_param: i64) -> Result<Option<TriggerGroup>, DatabaseError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            trigger_groups::table
                .filter(trigger_groups::id.eq(group_id_param))
                .select(DbTriggerGroup::as_select())
                .first::<DbTriggerGroup>(&mut conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?
                .map(|g| g.to_group())
                .transpose()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn get_rule(&self, group_id_param: i64) -> Result<Option<TriggerRule>, DatabaseError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            let group = trigger_groups::table
                .filter(trigger_groups::id.eq(group_id_param))
                .select(DbTriggerGroup::as_select())
                .first::<DbTriggerGroup>(&mut conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))?;

            group
                .map(|group| load_rule_rows(&mut conn, &group))
                .transpose()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn replace_group_contents(
        &self,
        group_id_param: i64,
        is_regex: bool,
        patterns: &[String],
        responses: &[String],
    ) -> Result<bool, DatabaseError> {
        let patterns = patterns.to_vec();
        let responses = responses.to_vec();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            conn.transaction::<bool, diesel::result::Error, _>(|conn| {
                let touched = diesel::update(
                    trigger_groups::table.filter(trigger_groups::id.eq(group_id_param)),
                )
                .set(trigger_groups::updated_at.eq(datetime_to_string(&Utc::now())))
                .execute(conn)?;

                if touched == 0 {
                    return Ok(false);
                }

                diesel::delete(
                    trigger_patterns::table.filter(trigger_patterns::group_id.eq(group_id_param)),
                )
                .execute(conn)?;
                diesel::delete(
                    trigger_responses::table.filter(trigger_responses::group_id.eq(group_id_param)),
                )
                .execute(conn)?;

                let pattern_rows: Vec<NewDbTriggerPattern> = patterns
                    .iter()
                    .map(|pattern| NewDbTriggerPattern {
                        group_id: group_id_param,
                        pattern,
                        is_regex,
                    })
                    .collect();
                diesel::insert_into(trigger_patterns::table)
                    .values(&pattern_rows)
                    .execute(conn)?;

                let response_rows: Vec<NewDbTriggerResponse> = responses
                    .iter()
                    .map(|response| NewDbTriggerResponse {
                        group_id: group_id_param,
                        response,
                    })
                    .collect();
                diesel::insert_into(trigger_responses::table)
                    .values(&response_rows)
                    .execute(conn)?;

                Ok(true)
            })
            .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn set_group_active(
        &self,
        group_id_param: i64,
        active: bool,
    ) -> Result<bool, DatabaseError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            let rows = diesel::update(
                trigger_groups::table.filter(trigger_groups::id.eq(group_id_param)),
            )
            .set((
                trigger_groups::is_active.eq(active),
                trigger_groups::updated_at.eq(datetime_to_string(&Utc::now())),
            ))
            .execute(&mut conn)
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

            Ok(rows > 0)
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn delete_group(&self, group_id_param: i64) -> Result<bool, DatabaseError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            conn.transaction::<bool, diesel::result::Error, _>(|conn| {
                diesel::delete(
                    trigger_patterns::table.filter(trigger_patterns::group_id.eq(group_id_param)),
                )
                .execute(conn)?;
                diesel::delete(
                    trigger_responses::table.filter(trigger_responses::group_id.eq(group_id_param)),
                )
                .execute(conn)?;
                let rows = diesel::delete(
                    trigger_groups::table.filter(trigger_groups::id.eq(group_id_param)),
                )
                .execute(conn)?;

                Ok(rows > 0)
            })
            .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }

    async fn list_groups(
        &self,
        owner_param: Option<&str>,
    ) -> Result<Vec<TriggerGroup>, DatabaseError> {
        let owner_param = owner_param.map(str::to_string);
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            let rows = match owner_param {
                Some(owner_filter) => trigger_groups::table
                    .filter(trigger_groups::owner.eq(owner_filter))
                    .order(trigger_groups::id.asc())
                    .select(DbTriggerGroup::as_select())
                    .load::<DbTriggerGroup>(&mut conn),
                None => trigger_groups::table
                    .order(trigger_groups::id.asc())
                    .select(DbTriggerGroup::as_select())
                    .load::<DbTriggerGroup>(&mut conn),
            }
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

            rows.into_iter().map(|g| g.to_group()).collect()
        })
        .await
        .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
    }
}
