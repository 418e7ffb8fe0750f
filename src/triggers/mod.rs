use std::collections::HashMap;

use parking_lot::RwLock;
use rand::seq::SliceRandom;
use regex::{Regex, RegexBuilder};
use tracing::{debug, info, warn};

use crate::db::{DatabaseError, TriggerDelivery, TriggerRule, TriggerStore};

pub mod admin;

/// Cross-component notification emitted by the admin mutation path right
/// after its storage commit. Keys are group-scoped, so concurrent edits to
/// unrelated groups never collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    Added {
        group_id: i64,
        patterns: Vec<String>,
        responses: Vec<String>,
        is_regex: bool,
        delivery: TriggerDelivery,
    },
    Removed {
        group_id: i64,
    },
    Modified {
        group_id: i64,
        patterns: Vec<String>,
        responses: Vec<String>,
        is_regex: bool,
        delivery: TriggerDelivery,
    },
}

impl TriggerEvent {
    pub fn added_from_rule(rule: &TriggerRule) -> Self {
        TriggerEvent::Added {
            group_id: rule.group_id,
            patterns: rule.patterns.clone(),
            responses: rule.responses.clone(),
            is_regex: rule.is_regex,
            delivery: rule.delivery,
        }
    }
}

/// One matched trigger, ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerHit {
    pub response: String,
    pub delivery: TriggerDelivery,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TriggerKey {
    group_id: i64,
    pattern: String,
}

struct PlainRule {
    responses: Vec<String>,
    delivery: TriggerDelivery,
}

struct RegexRule {
    regex: Regex,
    responses: Vec<String>,
    delivery: TriggerDelivery,
}

#[derive(Default)]
struct CacheState {
    plain: HashMap<TriggerKey, PlainRule>,
    regex: HashMap<TriggerKey, RegexRule>,
}

impl CacheState {
    fn insert(
        &mut self,
        group_id: i64,
        patterns: &[String],
        responses: &[String],
        is_regex: bool,
        delivery: TriggerDelivery,
    ) {
        for pattern in patterns {
            let key = TriggerKey {
                group_id,
                pattern: pattern.clone(),
            };
            if is_regex {
                match RegexBuilder::new(pattern).case_insensitive(true).build() {
                    Ok(regex) => {
                        self.regex.insert(
                            key,
                            RegexRule {
                                regex,
                                responses: responses.to_vec(),
                                delivery,
                            },
                        );
                    }
                    Err(err) => {
                        warn!(
                            "skipping invalid regex pattern '{}' in group {}: {}",
                            pattern, group_id, err
                        );
                    }
                }
            } else {
                self.plain.insert(
                    key,
                    PlainRule {
                        responses: responses.to_vec(),
                        delivery,
                    },
                );
            }
        }
    }

    fn remove_group(&mut self, group_id: i64) {
        self.plain.retain(|key, _| key.group_id != group_id);
        self.regex.retain(|key, _| key.group_id != group_id);
    }
}

/// Write-through in-memory index of active trigger rules. Rebuilt in full
/// from storage at startup, then patched via `TriggerEvent`s; the store stays
/// the source of truth and the cache can always be rebuilt from it.
pub struct TriggerCache {
    state: RwLock<CacheState>,
}

impl Default for TriggerCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerCache {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
        }
    }

    /// Replaces the whole index with the active rules currently in storage.
    pub async fn rebuild(&self, store: &dyn TriggerStore) -> Result<(), DatabaseError> {
        info!("loading triggers into memory");

        let rules = store.load_active_rules().await?;

        let mut state = self.state.write();
        *state = CacheState::default();
        for rule in &rules {
            state.insert(
                rule.group_id,
                &rule.patterns,
                &rule.responses,
                rule.is_regex,
                rule.delivery,
            );
        }

        info!(
            "loaded {} triggers ({} regex, {} plain)",
            state.regex.len() + state.plain.len(),
            state.regex.len(),
            state.plain.len()
        );
        Ok(())
    }

    pub fn apply(&self, event: TriggerEvent) {
        debug!("updating triggers in memory");

        let mut state = self.state.write();
        match event {
            TriggerEvent::Added {
                group_id,
                patterns,
                responses,
                is_regex,
                delivery,
            } => {
                state.insert(group_id, &patterns, &responses, is_regex, delivery);
            }
            TriggerEvent::Removed { group_id } => {
                state.remove_group(group_id);
            }
            TriggerEvent::Modified {
                group_id,
                patterns,
                responses,
                is_regex,
                delivery,
            } => {
                state.remove_group(group_id);
                state.insert(group_id, &patterns, &responses, is_regex, delivery);
            }
        }
    }

    /// Matches a message against every cached rule. Plain patterns match by
    /// case-insensitive containment, regex patterns by case-insensitive
    /// search with `$n` back-reference expansion of the chosen response.
    pub fn match_message(&self, content: &str) -> Vec<TriggerHit> {
        let state = self.state.read();
        let lowered = content.to_lowercase();
        let mut rng = rand::thread_rng();
        let mut hits = Vec::new();

        for (key, rule) in &state.plain {
            if lowered.contains(&key.pattern) {
                debug!("pattern match on '{}' (group {})", key.pattern, key.group_id);
                if let Some(response) = rule.responses.choose(&mut rng) {
                    hits.push(TriggerHit {
                        response: response.clone(),
                        delivery: rule.delivery,
                    });
                }
            }
        }

        for (key, rule) in &state.regex {
            if let Some(caps) = rule.regex.captures(content) {
                debug!(
                    "regex match on '{}' (group {})",
                    key.pattern, key.group_id
                );
                if let Some(response) = rule.responses.choose(&mut rng) {
                    let mut expanded = String::new();
                    caps.expand(response, &mut expanded);
                    hits.push(TriggerHit {
                        response: expanded,
                        delivery: rule.delivery,
                    });
                }
            }
        }

        hits
    }

    pub fn len(&self) -> usize {
        let state = self.state.read();
        state.plain.len() + state.regex.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::{TriggerCache, TriggerEvent};
    use crate::db::TriggerDelivery;

    fn added(group_id: i64, patterns: &[&str], responses: &[&str], is_regex: bool) -> TriggerEvent {
        TriggerEvent::Added {
            group_id,
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            responses: responses.iter().map(|r| r.to_string()).collect(),
            is_regex,
            delivery: TriggerDelivery::Channel,
        }
    }

    #[test]
    fn plain_patterns_match_by_containment() {
        let cache = TriggerCache::new();
        cache.apply(added(1, &["hello"], &["hi there"], false));

        let hits = cache.match_message("well HELLO friend");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].response, "hi there");

        assert!(cache.match_message("nothing relevant").is_empty());
    }

    #[test]
    fn regex_patterns_expand_backreferences() {
        let cache = TriggerCache::new();
        cache.apply(added(1, &[r"my name is (\w+)"], &["hello $1"], true));

        let hits = cache.match_message("My name is Ada");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].response, "hello Ada");
    }

    #[test]
    fn one_response_is_chosen_from_the_list() {
        let cache = TriggerCache::new();
        cache.apply(added(1, &["ping"], &["pong", "pang"], false));

        for _ in 0..10 {
            let hits = cache.match_message("ping");
            assert_eq!(hits.len(), 1);
            assert!(hits[0].response == "pong" || hits[0].response == "pang");
        }
    }

    #[test]
    fn removal_only_affects_the_named_group() {
        let cache = TriggerCache::new();
        cache.apply(added(1, &["alpha"], &["one"], false));
        cache.apply(added(2, &["beta"], &["two"], false));

        cache.apply(TriggerEvent::Removed { group_id: 1 });

        assert!(cache.match_message("alpha").is_empty());
        assert_eq!(cache.match_message("beta").len(), 1);
    }

    #[test]
    fn modification_replaces_old_keys() {
        let cache = TriggerCache::new();
        cache.apply(added(1, &["old pattern"], &["old response"], false));

        cache.apply(TriggerEvent::Modified {
            group_id: 1,
            patterns: vec!["new pattern".to_string()],
            responses: vec!["new response".to_string()],
            is_regex: false,
            delivery: TriggerDelivery::Reply,
        });

        assert!(cache.match_message("old pattern").is_empty());
        let hits = cache.match_message("new pattern");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].response, "new response");
        assert_eq!(hits[0].delivery, TriggerDelivery::Reply);
    }

    #[test]
    fn invalid_regex_rows_are_skipped_not_fatal() {
        let cache = TriggerCache::new();
        cache.apply(added(1, &["(unclosed"], &["response"], true));
        assert!(cache.is_empty());
    }

    #[test]
    fn multiple_matching_groups_all_fire() {
        let cache = TriggerCache::new();
        cache.apply(added(1, &["cat"], &["meow"], false));
        cache.apply(added(2, &["dog"], &["woof"], false));

        let hits = cache.match_message("the cat chased the dog");
        assert_eq!(hits.len(), 2);
    }
}
