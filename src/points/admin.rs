use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::db::{DatabaseError, User, UserStore};

// Names that would collide with reserved keywords or mention syntax.
const DISALLOWED_NAMES: &[&str] = &["everyone", "here", "me", "all"];

static VALID_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9 '._-]*$").expect("name pattern must compile")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameState {
    Valid,
    Invalid,
    Disallowed,
}

pub fn validate_name(name: &str) -> NameState {
    if DISALLOWED_NAMES.contains(&name) {
        NameState::Disallowed
    } else if !VALID_NAME_PATTERN.is_match(name) {
        NameState::Invalid
    } else {
        NameState::Valid
    }
}

/// Lower-cases and strips quoting and surrounding whitespace, the canonical
/// form stored in the user table.
pub fn normalize_name(raw: &str) -> String {
    raw.to_lowercase()
        .trim_matches(|c| matches!(c, '"' | '\'' | ' ' | '\n' | '\t'))
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Created,
    Reactivated,
    AlreadyExists,
    InvalidName,
    DisallowedName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnregisterOutcome {
    Deactivated,
    NotFound,
    AlreadyInactive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    Renamed,
    NotFound,
    SameName,
    InvalidName,
    DisallowedName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndowOutcome {
    Endowed,
    AlreadyPointGiver,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisendowOutcome {
    Disendowed,
    NotPointGiver,
    NotFound,
}

/// Administrative mutations of the user table. Users are soft-deactivated,
/// never hard-deleted, so historical ledger rows stay resolvable.
pub struct UserAdmin {
    users: Arc<dyn UserStore>,
}

impl UserAdmin {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    pub async fn register(
        &self,
        raw_name: &str,
        snowflake: Option<&str>,
        point_giver: bool,
    ) -> Result<RegisterOutcome, DatabaseError> {
        let name = normalize_name(raw_name);

        match validate_name(&name) {
            NameState::Disallowed => {
                info!("the name '{}' is not allowed, doing nothing", name);
                return Ok(RegisterOutcome::DisallowedName);
            }
            NameState::Invalid => {
                info!("'{}' is an invalid name, doing nothing", name);
                return Ok(RegisterOutcome::InvalidName);
            }
            NameState::Valid => {}
        }

        match self.users.get_by_name(&name).await? {
            Some(existing) if existing.is_active => {
                info!("user '{}' already exists, doing nothing", name);
                Ok(RegisterOutcome::AlreadyExists)
            }
            Some(_) => {
                info!("user '{}' exists but is inactive", name);
                self.users
                    .reactivate_user(&name, snowflake, point_giver)
                    .await?;
                info!("reactivated user '{}' in user table", name);
                Ok(RegisterOutcome::Reactivated)
            }
            None => {
                self.users.create_user(&name, snowflake, point_giver).await?;
                info!("added user '{}' to user table", name);
                Ok(RegisterOutcome::Created)
            }
        }
    }

    pub async fn unregister(&self, raw_name: &str) -> Result<UnregisterOutcome, DatabaseError> {
        let name = normalize_name(raw_name);

        match self.users.get_by_name(&name).await? {
            None => {
                info!("user '{}' doesn't exist in user table, doing nothing", name);
                Ok(UnregisterOutcome::NotFound)
            }
            Some(user) if !user.is_active => {
                info!("user '{}' is currently inactive, doing nothing", name);
                Ok(UnregisterOutcome::AlreadyInactive)
            }
            Some(_) => {
                self.users.deactivate_user(&name).await?;
                info!("deactivated user '{}' in user table", name);
                Ok(UnregisterOutcome::Deactivated)
            }
        }
    }

    pub async fn rename(
        &self,
        raw_current: &str,
        raw_new: &str,
    ) -> Result<RenameOutcome, DatabaseError> {
        let current = normalize_name(raw_current);
        let new_name = normalize_name(raw_new);

        if current == new_name {
            info!("attempting to rename '{}' to the same name, doing nothing", current);
            return Ok(RenameOutcome::SameName);
        }

        let Some(user) = self.users.get_by_name(&current).await? else {
            info!("user '{}' doesn't exist in user table, doing nothing", current);
            return Ok(RenameOutcome::NotFound);
        };

        match validate_name(&new_name) {
            NameState::Disallowed => {
                info!("the name '{}' is not allowed, doing nothing", new_name);
                return Ok(RenameOutcome::DisallowedName);
            }
            NameState::Invalid => {
                info!("'{}' is an invalid name, doing nothing", new_name);
                return Ok(RenameOutcome::InvalidName);
            }
            NameState::Valid => {}
        }

        self.users.rename_user(&user.id, &new_name).await?;
        info!("renamed user '{}' to '{}'", current, new_name);
        Ok(RenameOutcome::Renamed)
    }

    pub async fn endow(&self, raw_name: &str) -> Result<EndowOutcome, DatabaseError> {
        let name = normalize_name(raw_name);

        let Some(user) = self.users.get_by_name(&name).await? else {
            info!("user '{}' doesn't exist in user table, doing nothing", name);
            return Ok(EndowOutcome::NotFound);
        };

        if user.point_giver {
            info!("user '{}' is already a point giver, doing nothing", name);
            return Ok(EndowOutcome::AlreadyPointGiver);
        }

        self.users.set_point_giver(&user.id, true).await?;
        info!("endowed user '{}' with point giving abilities", name);
        Ok(EndowOutcome::Endowed)
    }

    pub async fn disendow(&self, raw_name: &str) -> Result<DisendowOutcome, DatabaseError> {
        let name = normalize_name(raw_name);

        let Some(user) = self.users.get_by_name(&name).await? else {
            info!("user '{}' doesn't exist in user table, doing nothing", name);
            return Ok(DisendowOutcome::NotFound);
        };

        if !user.point_giver {
            info!("user '{}' isn't a point giver, doing nothing", name);
            return Ok(DisendowOutcome::NotPointGiver);
        }

        self.users.set_point_giver(&user.id, false).await?;
        info!("removed ability to give points from user '{}'", name);
        Ok(DisendowOutcome::Disendowed)
    }

    pub async fn list_users(&self) -> Result<Vec<User>, DatabaseError> {
        self.users.list_users().await
    }
}
