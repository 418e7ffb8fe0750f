use std::sync::Arc;

use diesel::Connection;
use diesel::RunQueryDsl;
use diesel::sqlite::SqliteConnection;

use crate::config::DatabaseConfig;
use crate::db::sqlite::{
    SqliteLedgerStore, SqliteReminderStore, SqliteTriggerStore, SqliteUserStore,
};
use crate::db::{DatabaseError, LedgerStore, ReminderStore, TriggerStore, UserStore};

#[derive(Clone)]
pub struct DatabaseManager {
    sqlite_path: String,
    user_store: Arc<dyn UserStore>,
    ledger_store: Arc<dyn LedgerStore>,
    reminder_store: Arc<dyn ReminderStore>,
    trigger_store: Arc<dyn TriggerStore>,
}

impl DatabaseManager {
    pub fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let path = config
            .sqlite_path()
            .ok_or_else(|| DatabaseError::Connection("no sqlite database configured".to_string()))?;
        Ok(Self::from_path(path))
    }

    pub fn from_path(path: impl Into<String>) -> Self {
        let path = path.into();
        let path_arc = Arc::new(path.clone());

        Self {
            sqlite_path: path,
            user_store: Arc::new(SqliteUserStore::new(path_arc.clone())),
            ledger_store: Arc::new(SqliteLedgerStore::new(path_arc.clone())),
            reminder_store: Arc::new(SqliteReminderStore::new(path_arc.clone())),
            trigger_store: Arc::new(SqliteTriggerStore::new(path_arc)),
        }
    }

    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        let path = self.sqlite_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = SqliteConnection::establish(&path)
                .map_err(|e| DatabaseError::Connection(e.to_string()))?;

            let statements = [
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE,
                    discord_snowflake TEXT UNIQUE,
                    timezone TEXT,
                    is_active BOOLEAN NOT NULL DEFAULT 1,
                    point_giver BOOLEAN NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS ledger (
                    id TEXT PRIMARY KEY,
                    bestower TEXT NOT NULL REFERENCES users(id),
                    recipient TEXT NOT NULL REFERENCES users(id),
                    points BIGINT NOT NULL,
                    created_at TEXT NOT NULL
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS reminders (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    owner TEXT NOT NULL,
                    channel_id TEXT NOT NULL,
                    original_message_id TEXT NOT NULL,
                    reminder_text TEXT NOT NULL,
                    remind_at TEXT NOT NULL,
                    is_recurring BOOLEAN NOT NULL DEFAULT 0,
                    recurrence_interval BIGINT,
                    status TEXT NOT NULL DEFAULT 'pending',
                    created_at TEXT NOT NULL
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS trigger_groups (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    owner TEXT NOT NULL,
                    is_active BOOLEAN NOT NULL DEFAULT 1,
                    delivery TEXT NOT NULL DEFAULT 'channel',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS trigger_patterns (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    group_id INTEGER NOT NULL REFERENCES trigger_groups(id) ON DELETE CASCADE,
                    pattern TEXT NOT NULL,
                    is_regex BOOLEAN NOT NULL DEFAULT 0
                )
                "#,
                r#"
                CREATE TABLE IF NOT EXISTS trigger_responses (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    group_id INTEGER NOT NULL REFERENCES trigger_groups(id) ON DELETE CASCADE,
                    response TEXT NOT NULL
                )
                "#,
                "CREATE INDEX IF NOT EXISTS idx_users_name ON users(name)",
                "CREATE INDEX IF NOT EXISTS idx_users_snowflake ON users(discord_snowflake)",
                "CREATE INDEX IF NOT EXISTS idx_ledger_recipient ON ledger(recipient)",
                "CREATE INDEX IF NOT EXISTS idx_ledger_created_at ON ledger(created_at)",
                "CREATE INDEX IF NOT EXISTS idx_reminders_status ON reminders(status)",
                "CREATE INDEX IF NOT EXISTS idx_reminders_owner ON reminders(owner)",
                "CREATE INDEX IF NOT EXISTS idx_trigger_patterns_group ON trigger_patterns(group_id)",
                "CREATE INDEX IF NOT EXISTS idx_trigger_responses_group ON trigger_responses(group_id)",
            ];

            for statement in statements {
                diesel::sql_query(statement)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }

    pub fn user_store(&self) -> Arc<dyn UserStore> {
        self.user_store.clone()
    }

    pub fn ledger_store(&self) -> Arc<dyn LedgerStore> {
        self.ledger_store.clone()
    }

    pub fn reminder_store(&self) -> Arc<dyn ReminderStore> {
        self.reminder_store.clone()
    }

    pub fn trigger_store(&self) -> Arc<dyn TriggerStore> {
        self.trigger_store.clone()
    }
}
