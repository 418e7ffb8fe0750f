pub use self::parser::{BotConfig, Config, DatabaseConfig, LimitsConfig, LoggingConfig};
pub use self::validator::ConfigError;

mod parser;
mod validator;
