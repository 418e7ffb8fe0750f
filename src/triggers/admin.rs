use std::sync::Arc;

use regex::Regex;
use tracing::info;

use crate::db::{DatabaseError, TriggerDelivery, TriggerGroup, TriggerStore};
use crate::triggers::{TriggerCache, TriggerEvent};

pub fn is_valid_regex(pattern: &str) -> bool {
    Regex::new(pattern).is_ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddTriggerOutcome {
    Added { group_id: i64 },
    InvalidRegex,
    EmptySubmission,
    TooManyTriggers,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditTriggerOutcome {
    Edited,
    NotFound,
    NotPermitted,
    InvalidRegex,
    EmptySubmission,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleTriggerOutcome {
    Updated,
    NotFound,
    NotPermitted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteTriggerOutcome {
    Deleted,
    NotFound,
    NotPermitted,
}

enum SubmissionError {
    InvalidRegex,
    Empty,
}

/// Owner- and admin-facing trigger mutations. Every mutation commits to
/// storage first and then patches the in-memory cache with the matching
/// event.
pub struct TriggerAdmin {
    store: Arc<dyn TriggerStore>,
    cache: Arc<TriggerCache>,
    normal_limit: i64,
    regex_limit: i64,
}

impl TriggerAdmin {
    pub fn new(
        store: Arc<dyn TriggerStore>,
        cache: Arc<TriggerCache>,
        normal_limit: i64,
        regex_limit: i64,
    ) -> Self {
        Self {
            store,
            cache,
            normal_limit,
            regex_limit,
        }
    }

    // A regex submission is a single validated pattern; a plain submission is
    // a comma-separated list stored lower-case. Responses are one per line.
    fn parse_submission(
        patterns_input: &str,
        responses_input: &str,
        is_regex: bool,
    ) -> Result<(Vec<String>, Vec<String>), SubmissionError> {
        let patterns: Vec<String> = if is_regex {
            let pattern = patterns_input.trim();
            if pattern.is_empty() {
                return Err(SubmissionError::Empty);
            }
            if !is_valid_regex(pattern) {
                return Err(SubmissionError::InvalidRegex);
            }
            vec![pattern.to_string()]
        } else {
            patterns_input
                .split(',')
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect()
        };

        let responses: Vec<String> = responses_input
            .lines()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect();

        if patterns.is_empty() || responses.is_empty() {
            return Err(SubmissionError::Empty);
        }

        Ok((patterns, responses))
    }

    pub async fn add(
        &self,
        owner: &str,
        is_regex: bool,
        delivery: TriggerDelivery,
        patterns_input: &str,
        responses_input: &str,
    ) -> Result<AddTriggerOutcome, DatabaseError> {
        let group_count = self.store.count_groups_for_owner(owner, is_regex).await?;
        let limit = if is_regex {
            self.regex_limit
        } else {
            self.normal_limit
        };
        if group_count >= limit {
            info!(
                "'{}' can't add a new trigger, it would exceed the allowed {} groups",
                owner, limit
            );
            return Ok(AddTriggerOutcome::TooManyTriggers);
        }

        let (patterns, responses) =
            match Self::parse_submission(patterns_input, responses_input, is_regex) {
                Ok(parsed) => parsed,
                Err(SubmissionError::InvalidRegex) => {
                    info!("'{}' submitted a trigger with an invalid regex", owner);
                    return Ok(AddTriggerOutcome::InvalidRegex);
                }
                Err(SubmissionError::Empty) => {
                    return Ok(AddTriggerOutcome::EmptySubmission);
                }
            };

        let group_id = self
            .store
            .create_group(owner, is_regex, delivery, &patterns, &responses)
            .await?;
        info!("added trigger group to db with group_id={}", group_id);

        self.cache.apply(TriggerEvent::Added {
            group_id,
            patterns,
            responses,
            is_regex,
            delivery,
        });

        Ok(AddTriggerOutcome::Added { group_id })
    }

    pub async fn edit(
        &self,
        group_id: i64,
        actor: &str,
        is_admin: bool,
        is_regex: bool,
        patterns_input: &str,
        responses_input: &str,
    ) -> Result<EditTriggerOutcome, DatabaseError> {
        let Some(group) = self.store.get_group(group_id).await? else {
            return Ok(EditTriggerOutcome::NotFound);
        };
        if group.owner != actor && !is_admin {
            info!(
                "'{}' tried to edit trigger group {} owned by '{}'",
                actor, group_id, group.owner
            );
            return Ok(EditTriggerOutcome::NotPermitted);
        }

        let (patterns, responses) =
            match Self::parse_submission(patterns_input, responses_input, is_regex) {
                Ok(parsed) => parsed,
                Err(SubmissionError::InvalidRegex) => {
                    return Ok(EditTriggerOutcome::InvalidRegex);
                }
                Err(SubmissionError::Empty) => {
                    return Ok(EditTriggerOutcome::EmptySubmission);
                }
            };

        if !self
            .store
            .replace_group_contents(group_id, is_regex, &patterns, &responses)
            .await?
        {
            return Ok(EditTriggerOutcome::NotFound);
        }
        info!("replaced contents of trigger group {}", group_id);

        if group.is_active {
            self.cache.apply(TriggerEvent::Modified {
                group_id,
                patterns,
                responses,
                is_regex,
                delivery: group.delivery,
            });
        }

        Ok(EditTriggerOutcome::Edited)
    }

    pub async fn delete(
        &self,
        group_id: i64,
        actor: &str,
        is_admin: bool,
    ) -> Result<DeleteTriggerOutcome, DatabaseError> {
        let Some(group) = self.store.get_group(group_id).await? else {
            return Ok(DeleteTriggerOutcome::NotFound);
        };
        if group.owner != actor && !is_admin {
            info!(
                "'{}' tried to delete trigger group {} owned by '{}'",
                actor, group_id, group.owner
            );
            return Ok(DeleteTriggerOutcome::NotPermitted);
        }

        if !self.store.delete_group(group_id).await? {
            return Ok(DeleteTriggerOutcome::NotFound);
        }
        info!("deleted trigger group {}", group_id);

        self.cache.apply(TriggerEvent::Removed { group_id });
        Ok(DeleteTriggerOutcome::Deleted)
    }

    pub async fn set_active(
        &self,
        group_id: i64,
        actor: &str,
        is_admin: bool,
        active: bool,
    ) -> Result<ToggleTriggerOutcome, DatabaseError> {
        let Some(group) = self.store.get_group(group_id).await? else {
            return Ok(ToggleTriggerOutcome::NotFound);
        };
        if group.owner != actor && !is_admin {
            return Ok(ToggleTriggerOutcome::NotPermitted);
        }

        if !self.store.set_group_active(group_id, active).await? {
            return Ok(ToggleTriggerOutcome::NotFound);
        }
        info!(
            "{} trigger group {}",
            if active { "enabled" } else { "disabled" },
            group_id
        );

        if active {
            // current contents may have been edited while disabled
            if let Some(rule) = self.store.get_rule(group_id).await? {
                self.cache.apply(TriggerEvent::added_from_rule(&rule));
            }
        } else {
            self.cache.apply(TriggerEvent::Removed { group_id });
        }

        Ok(ToggleTriggerOutcome::Updated)
    }

    pub async fn list(&self, owner: Option<&str>) -> Result<Vec<TriggerGroup>, DatabaseError> {
        self.store.list_groups(owner).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::NamedTempFile;

    use super::{
        AddTriggerOutcome, DeleteTriggerOutcome, EditTriggerOutcome, ToggleTriggerOutcome,
        TriggerAdmin,
    };
    use crate::db::{DatabaseManager, TriggerDelivery};
    use crate::triggers::TriggerCache;

    async fn setup() -> (TriggerAdmin, Arc<TriggerCache>, DatabaseManager, NamedTempFile) {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let manager = DatabaseManager::from_path(file.path().to_string_lossy().to_string());
        manager.migrate().await.expect("migrate");

        let cache = Arc::new(TriggerCache::new());
        let admin = TriggerAdmin::new(manager.trigger_store(), cache.clone(), 3, 2);
        (admin, cache, manager, file)
    }

    #[tokio::test]
    async fn added_triggers_match_immediately() {
        let (admin, cache, _manager, _file) = setup().await;

        let outcome = admin
            .add("100", false, TriggerDelivery::Channel, "Hello, Hi", "howdy")
            .await
            .expect("add");
        assert!(matches!(outcome, AddTriggerOutcome::Added { .. }));

        // patterns are stored lower-case and match case-insensitively
        assert_eq!(cache.match_message("HELLO there").len(), 1);
        assert_eq!(cache.match_message("hi everyone").len(), 1);
    }

    #[tokio::test]
    async fn invalid_regex_is_rejected_before_storage() {
        let (admin, cache, manager, _file) = setup().await;

        let outcome = admin
            .add("100", true, TriggerDelivery::Channel, "(unclosed", "resp")
            .await
            .expect("add");
        assert_eq!(outcome, AddTriggerOutcome::InvalidRegex);
        assert!(cache.is_empty());
        assert!(
            manager
                .trigger_store()
                .list_groups(None)
                .await
                .expect("list")
                .is_empty()
        );
    }

    #[tokio::test]
    async fn per_owner_group_limits_are_enforced() {
        let (admin, _cache, _manager, _file) = setup().await;

        for i in 0..3 {
            let outcome = admin
                .add(
                    "100",
                    false,
                    TriggerDelivery::Channel,
                    &format!("pattern{i}"),
                    "resp",
                )
                .await
                .expect("add");
            assert!(matches!(outcome, AddTriggerOutcome::Added { .. }));
        }

        let outcome = admin
            .add("100", false, TriggerDelivery::Channel, "one too many", "resp")
            .await
            .expect("add");
        assert_eq!(outcome, AddTriggerOutcome::TooManyTriggers);

        // regex groups have their own limit
        let outcome = admin
            .add("100", true, TriggerDelivery::Channel, "regex.*", "resp")
            .await
            .expect("add");
        assert!(matches!(outcome, AddTriggerOutcome::Added { .. }));
    }

    #[tokio::test]
    async fn disable_removes_matching_and_enable_restores_edited_contents() {
        let (admin, cache, _manager, _file) = setup().await;

        let AddTriggerOutcome::Added { group_id } = admin
            .add("100", false, TriggerDelivery::Channel, "hello", "howdy")
            .await
            .expect("add")
        else {
            panic!("expected Added");
        };

        let outcome = admin
            .set_active(group_id, "100", false, false)
            .await
            .expect("disable");
        assert_eq!(outcome, ToggleTriggerOutcome::Updated);
        assert!(cache.match_message("hello").is_empty());

        // edit while disabled, then re-enable: the new contents match
        let outcome = admin
            .edit(group_id, "100", false, false, "goodbye", "see ya")
            .await
            .expect("edit");
        assert_eq!(outcome, EditTriggerOutcome::Edited);
        assert!(cache.match_message("goodbye").is_empty());

        let outcome = admin
            .set_active(group_id, "100", false, true)
            .await
            .expect("enable");
        assert_eq!(outcome, ToggleTriggerOutcome::Updated);
        assert!(cache.match_message("hello").is_empty());
        let hits = cache.match_message("goodbye");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].response, "see ya");
    }

    #[tokio::test]
    async fn edits_patch_the_cache_for_active_groups() {
        let (admin, cache, _manager, _file) = setup().await;

        let AddTriggerOutcome::Added { group_id } = admin
            .add("100", false, TriggerDelivery::Channel, "old", "old resp")
            .await
            .expect("add")
        else {
            panic!("expected Added");
        };

        admin
            .edit(group_id, "100", false, false, "new", "new resp")
            .await
            .expect("edit");

        assert!(cache.match_message("old").is_empty());
        assert_eq!(cache.match_message("new").len(), 1);
    }

    #[tokio::test]
    async fn ownership_is_enforced_unless_admin() {
        let (admin, cache, _manager, _file) = setup().await;

        let AddTriggerOutcome::Added { group_id } = admin
            .add("100", false, TriggerDelivery::Channel, "hello", "howdy")
            .await
            .expect("add")
        else {
            panic!("expected Added");
        };

        let outcome = admin
            .delete(group_id, "999", false)
            .await
            .expect("delete");
        assert_eq!(outcome, DeleteTriggerOutcome::NotPermitted);

        let outcome = admin.delete(group_id, "999", true).await.expect("delete");
        assert_eq!(outcome, DeleteTriggerOutcome::Deleted);
        assert!(cache.match_message("hello").is_empty());
    }

    #[tokio::test]
    async fn rebuild_loads_only_active_groups() {
        let (admin, cache, manager, _file) = setup().await;

        let AddTriggerOutcome::Added { group_id } = admin
            .add("100", false, TriggerDelivery::Channel, "visible", "resp")
            .await
            .expect("add")
        else {
            panic!("expected Added");
        };
        admin
            .add("100", false, TriggerDelivery::Reply, "hidden", "resp")
            .await
            .expect("add");
        let groups = admin.list(Some("100")).await.expect("list");
        let hidden = groups
            .iter()
            .find(|g| g.id != group_id)
            .expect("second group");
        admin
            .set_active(hidden.id, "100", false, false)
            .await
            .expect("disable");

        let fresh = TriggerCache::new();
        fresh
            .rebuild(manager.trigger_store().as_ref())
            .await
            .expect("rebuild");
        assert_eq!(fresh.match_message("visible").len(), 1);
        assert!(fresh.match_message("hidden").is_empty());
        drop(cache);
    }
}
