use std::path::Path;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bot: BotConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub token: SecretString,
    /// Channel that receives point transaction embeds.
    pub points_log_channel: u64,
    /// Role whose members may manage other users' reminders and triggers.
    #[serde(default)]
    pub admin_role: Option<u64>,
    #[serde(default = "default_use_privileged_intents")]
    pub use_privileged_intents: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

impl DatabaseConfig {
    pub fn sqlite_path(&self) -> Option<String> {
        if let Some(url) = &self.url {
            url.strip_prefix("sqlite://").map(str::to_string)
        } else {
            self.filename.clone()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_reminders")]
    pub max_reminders: i64,
    #[serde(default = "default_normal_trigger_limit")]
    pub normal_trigger_limit: i64,
    #[serde(default = "default_regex_trigger_limit")]
    pub regex_trigger_limit: i64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_reminders: default_max_reminders(),
            normal_trigger_limit: default_normal_trigger_limit(),
            regex_trigger_limit: default_regex_trigger_limit(),
        }
    }
}

impl Config {
    pub fn load(path_override: Option<&str>) -> Result<Self, ConfigError> {
        let config_path = path_override
            .map(str::to_string)
            .or_else(|| std::env::var("CONFIG_PATH").ok())
            .unwrap_or_else(|| "config.yaml".to_string());

        Self::load_from_file(&config_path)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.token.expose_secret().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "bot.token cannot be empty".to_string(),
            ));
        }

        if self.bot.points_log_channel == 0 {
            return Err(ConfigError::InvalidConfig(
                "bot.points_log_channel must be set".to_string(),
            ));
        }

        if self.database.sqlite_path().is_none_or(|p| p.is_empty()) {
            return Err(ConfigError::InvalidConfig(
                "database.filename or a sqlite:// database.url must be set".to_string(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("TALLY_BOT_TOKEN") {
            self.bot.token = SecretString::from(value);
        }
        if let Ok(value) = std::env::var("TALLY_DATABASE_FILENAME") {
            self.database.filename = Some(value);
            self.database.url = None;
        }
    }
}

fn default_use_privileged_intents() -> bool {
    false
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_max_reminders() -> i64 {
    10
}

fn default_normal_trigger_limit() -> i64 {
    200
}

fn default_regex_trigger_limit() -> i64 {
    100
}
