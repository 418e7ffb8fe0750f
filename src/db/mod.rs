pub use self::error::DatabaseError;
pub use self::manager::DatabaseManager;
pub use self::models::{
    LedgerEntry, NewReminder, RankedTotal, Reminder, ReminderStatus, TriggerDelivery, TriggerGroup,
    TriggerRule, User,
};
pub use self::stores::{LedgerStore, ReminderStore, TriggerStore, UserStore};

pub mod error;
pub mod manager;
pub mod models;
pub mod schema;
pub mod sqlite;
pub mod stores;
