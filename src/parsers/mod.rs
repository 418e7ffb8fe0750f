pub mod points;
pub mod reminders;

pub use points::{PointCommand, RecipientRef, parse_point_command};
pub use reminders::{
    Preposition, ReminderCommand, parse_absolute_time, parse_reminder_command, parse_relative_time,
};
