use std::sync::Arc;

use anyhow::Result;
use tracing::error;

use crate::chat::{CHECK_MARK, CROSS_MARK, ChatGateway, ChatMessage, NO_ENTRY, TransferNotice};
use crate::config::Config;
use crate::db::{DatabaseManager, TriggerDelivery};
use crate::parsers::points::{RecipientRef, parse_point_command};
use crate::points::admin::UserAdmin;
use crate::points::leaderboard::Leaderboard;
use crate::points::{RecipientDescriptor, TransactionEngine, TransferOutcome};
use crate::reminders::{ReminderAck, ReminderService};
use crate::triggers::TriggerCache;
use crate::triggers::admin::TriggerAdmin;
use crate::utils::text;

const MESSAGE_EXCERPT_LIMIT: usize = 80;

/// Wires every inbound message through the point, reminder, and trigger
/// paths, and exposes the operations the command layer calls into.
pub struct BotCore {
    config: Arc<Config>,
    gateway: Arc<dyn ChatGateway>,
    engine: TransactionEngine,
    leaderboard: Leaderboard,
    user_admin: UserAdmin,
    reminders: Arc<ReminderService>,
    trigger_cache: Arc<TriggerCache>,
    trigger_admin: TriggerAdmin,
}

impl BotCore {
    pub async fn new(
        config: Arc<Config>,
        db: &DatabaseManager,
        gateway: Arc<dyn ChatGateway>,
    ) -> Result<Arc<Self>> {
        let trigger_cache = Arc::new(TriggerCache::new());
        trigger_cache.rebuild(db.trigger_store().as_ref()).await?;

        let reminders = Arc::new(ReminderService::new(
            db.user_store(),
            db.reminder_store(),
            gateway.clone(),
            config.limits.max_reminders,
        ));
        Arc::clone(&reminders).load_pending().await?;

        Ok(Arc::new(Self {
            engine: TransactionEngine::new(db.user_store(), db.ledger_store()),
            leaderboard: Leaderboard::new(db.ledger_store()),
            user_admin: UserAdmin::new(db.user_store()),
            trigger_admin: TriggerAdmin::new(
                db.trigger_store(),
                trigger_cache.clone(),
                config.limits.normal_trigger_limit,
                config.limits.regex_trigger_limit,
            ),
            trigger_cache,
            reminders,
            gateway,
            config,
        }))
    }

    /// The trigger path always runs; the point and reminder paths only act
    /// when their patterns match.
    pub async fn handle_message(&self, message: &ChatMessage) -> Result<()> {
        self.handle_point_phrase(message).await?;
        self.handle_reminder_phrase(message).await?;
        self.handle_triggers(message).await;
        Ok(())
    }

    async fn handle_point_phrase(&self, message: &ChatMessage) -> Result<()> {
        let Some(command) = parse_point_command(&message.content, message.is_reply()) else {
            return Ok(());
        };

        let descriptor = match command.recipient {
            RecipientRef::Name(name) => RecipientDescriptor::Name(name),
            RecipientRef::Snowflake(snowflake) => RecipientDescriptor::Snowflake(snowflake),
            RecipientRef::ReplyAuthor => {
                match self.resolve_reply_author(message).await {
                    Some(author) => RecipientDescriptor::Snowflake(author),
                    // nothing sensible to award points to
                    None => return Ok(()),
                }
            }
        };

        let outcome = self
            .engine
            .attempt_transfer(&message.author_id, &descriptor, command.amount)
            .await?;
        self.acknowledge_transfer(message, &outcome).await;
        Ok(())
    }

    // The replied-to author comes from the gateway cache when possible, with
    // an explicit fetch on a cache miss.
    async fn resolve_reply_author(&self, message: &ChatMessage) -> Option<String> {
        if let Some(author) = &message.reply_author_id {
            return Some(author.clone());
        }

        let reply_to = message.reply_to_message_id.as_ref()?;
        match self
            .gateway
            .message_author(&message.channel_id, reply_to)
            .await
        {
            Ok(author) => author,
            Err(err) => {
                error!("failed to fetch replied-to message: {err}");
                None
            }
        }
    }

    async fn acknowledge_transfer(&self, message: &ChatMessage, outcome: &TransferOutcome) {
        match outcome {
            TransferOutcome::Committed {
                bestower,
                recipient,
                points,
                ..
            } => {
                self.react(message, CHECK_MARK).await;
                self.send_notice(TransferNotice {
                    bestower: bestower.clone(),
                    recipient: recipient.clone(),
                    pretty_amount: text::format_thousands(*points),
                    excerpt: text::excerpt(&message.content, MESSAGE_EXCERPT_LIMIT),
                    self_violation: false,
                })
                .await;
            }
            TransferOutcome::SelfTransferViolation { bestower, points } => {
                self.react(message, CROSS_MARK).await;
                self.send_notice(TransferNotice {
                    bestower: bestower.clone(),
                    recipient: bestower.clone(),
                    pretty_amount: text::format_thousands(*points),
                    excerpt: text::excerpt(&message.content, MESSAGE_EXCERPT_LIMIT),
                    self_violation: true,
                })
                .await;
            }
            _ => {
                self.react(message, CROSS_MARK).await;
            }
        }
    }

    async fn react(&self, message: &ChatMessage, emoji: &str) {
        if let Err(err) = self
            .gateway
            .react(&message.channel_id, &message.message_id, emoji)
            .await
        {
            error!("failed to add reaction: {err}");
        }
    }

    async fn send_notice(&self, notice: TransferNotice) {
        let channel = self.config.bot.points_log_channel.to_string();
        if let Err(err) = self.gateway.send_transfer_notice(&channel, &notice).await {
            error!("failed to send transfer notice: {err}");
        }
    }

    async fn handle_reminder_phrase(&self, message: &ChatMessage) -> Result<()> {
        let ack = Arc::clone(&self.reminders).handle_message(message).await?;
        match ack {
            None => {}
            Some(ReminderAck::Created) => self.react(message, CHECK_MARK).await,
            Some(ReminderAck::InvalidTime | ReminderAck::InvalidInterval) => {
                self.react(message, CROSS_MARK).await
            }
            Some(
                ReminderAck::IntervalTooShort
                | ReminderAck::IntervalTooLong
                | ReminderAck::TooManyReminders,
            ) => self.react(message, NO_ENTRY).await,
        }
        Ok(())
    }

    async fn handle_triggers(&self, message: &ChatMessage) {
        for hit in self.trigger_cache.match_message(&message.content) {
            let result = match hit.delivery {
                TriggerDelivery::Channel => {
                    self.gateway
                        .send_message(&message.channel_id, &hit.response)
                        .await
                }
                TriggerDelivery::Reply => {
                    self.gateway
                        .reply_to(&message.channel_id, &message.message_id, &hit.response)
                        .await
                }
                TriggerDelivery::React => {
                    self.gateway
                        .react(&message.channel_id, &message.message_id, &hit.response)
                        .await
                }
            };

            if let Err(err) = result {
                error!("failed to deliver trigger response: {err}");
            }
        }
    }

    pub fn user_admin(&self) -> &UserAdmin {
        &self.user_admin
    }

    pub fn leaderboard(&self) -> &Leaderboard {
        &self.leaderboard
    }

    pub fn trigger_admin(&self) -> &TriggerAdmin {
        &self.trigger_admin
    }

    pub fn reminders(&self) -> &Arc<ReminderService> {
        &self.reminders
    }

    pub fn shutdown(&self) {
        self.reminders.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::NamedTempFile;

    use super::BotCore;
    use crate::chat::testing::RecordingGateway;
    use crate::chat::{CHECK_MARK, ChatGateway, ChatMessage};
    use crate::config::Config;
    use crate::db::{DatabaseManager, TriggerDelivery};

    fn test_config() -> Arc<Config> {
        let yaml = r#"
bot:
  token: "test-token"
  points_log_channel: 42
database:
  filename: ":memory:"
"#;
        Arc::new(serde_yaml::from_str(yaml).expect("test config"))
    }

    async fn core_with_gateway() -> (Arc<BotCore>, Arc<RecordingGateway>, DatabaseManager, NamedTempFile)
    {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let manager = DatabaseManager::from_path(file.path().to_string_lossy().to_string());
        manager.migrate().await.expect("migrate");

        manager
            .user_store()
            .create_user("alice", Some("1"), true)
            .await
            .expect("alice");
        manager
            .user_store()
            .create_user("bob", Some("2"), true)
            .await
            .expect("bob");

        let gateway = Arc::new(RecordingGateway::default());
        let chat_gateway: Arc<dyn ChatGateway> = gateway.clone();
        let core = BotCore::new(test_config(), &manager, chat_gateway)
            .await
            .expect("core");

        (core, gateway, manager, file)
    }

    fn message_from(author: &str, content: &str) -> ChatMessage {
        ChatMessage {
            message_id: "msg-1".to_string(),
            channel_id: "chan-1".to_string(),
            author_id: author.to_string(),
            content: content.to_string(),
            reply_author_id: None,
            reply_to_message_id: None,
        }
    }

    #[tokio::test]
    async fn point_phrase_commits_and_announces() {
        let (core, gateway, manager, _file) = core_with_gateway().await;

        core.handle_message(&message_from("1", "50 points to bob"))
            .await
            .expect("handle");

        let totals = manager
            .ledger_store()
            .ranked_totals(None)
            .await
            .expect("totals");
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].name, "bob");
        assert_eq!(totals[0].points, 50);

        let reactions = gateway.reactions.lock().clone();
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].2, CHECK_MARK);

        let notices = gateway.notices.lock().clone();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].0, "42");
        assert_eq!(notices[0].1.bestower, "alice");
        assert_eq!(notices[0].1.recipient, "bob");
        assert_eq!(notices[0].1.pretty_amount, "50");
        assert!(!notices[0].1.self_violation);

        core.shutdown();
    }

    #[tokio::test]
    async fn reply_point_phrase_awards_the_replied_to_author() {
        let (core, gateway, manager, _file) = core_with_gateway().await;
        *gateway.reply_author.lock() = Some("2".to_string());

        let mut message = message_from("1", "10 points");
        message.reply_to_message_id = Some("original-msg".to_string());

        core.handle_message(&message).await.expect("handle");

        let totals = manager
            .ledger_store()
            .ranked_totals(None)
            .await
            .expect("totals");
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].name, "bob");
        assert_eq!(totals[0].points, 10);

        core.shutdown();
    }

    #[tokio::test]
    async fn self_transfer_reacts_and_announces_the_violation() {
        let (core, gateway, manager, _file) = core_with_gateway().await;

        core.handle_message(&message_from("1", "100 points to alice"))
            .await
            .expect("handle");

        let totals = manager
            .ledger_store()
            .ranked_totals(None)
            .await
            .expect("totals");
        assert!(totals.is_empty());

        let notices = gateway.notices.lock().clone();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].1.self_violation);

        core.shutdown();
    }

    #[tokio::test]
    async fn long_messages_are_excerpted_in_the_notice() {
        let (core, gateway, _manager, _file) = core_with_gateway().await;

        let padding = "x".repeat(200);
        core.handle_message(&message_from("1", &format!("5 points to bob {padding}")))
            .await
            .expect("handle");

        let notices = gateway.notices.lock().clone();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].1.excerpt.chars().count(), 81);
        assert!(notices[0].1.excerpt.ends_with('\u{2026}'));

        core.shutdown();
    }

    #[tokio::test]
    async fn ordinary_chatter_is_ignored() {
        let (core, gateway, manager, _file) = core_with_gateway().await;

        core.handle_message(&message_from("1", "what a lovely day"))
            .await
            .expect("handle");

        assert!(gateway.reactions.lock().is_empty());
        assert!(gateway.notices.lock().is_empty());
        assert!(
            manager
                .ledger_store()
                .ranked_totals(None)
                .await
                .expect("totals")
                .is_empty()
        );

        core.shutdown();
    }

    #[tokio::test]
    async fn triggers_fire_with_their_delivery_mode() {
        let (core, gateway, _manager, _file) = core_with_gateway().await;

        core.trigger_admin()
            .add("1", false, TriggerDelivery::Channel, "badger", "mushroom")
            .await
            .expect("add trigger");
        core.trigger_admin()
            .add("1", false, TriggerDelivery::Reply, "snake", "it's a snake")
            .await
            .expect("add trigger");

        core.handle_message(&message_from("2", "badger badger"))
            .await
            .expect("handle");
        core.handle_message(&message_from("2", "a snake!"))
            .await
            .expect("handle");

        let sent = gateway.sent.lock().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "mushroom");

        let replies = gateway.replies.lock().clone();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].2, "it's a snake");

        core.shutdown();
    }

    #[tokio::test]
    async fn reminder_phrase_gets_an_acknowledgment() {
        let (core, gateway, manager, _file) = core_with_gateway().await;

        core.handle_message(&message_from("1", "remind me in 10 minutes to check the oven"))
            .await
            .expect("handle");

        let reactions = gateway.reactions.lock().clone();
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].2, CHECK_MARK);

        let reminders = manager
            .reminder_store()
            .list_reminders(Some("1"))
            .await
            .expect("list");
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].reminder_text, "check the oven");

        core.shutdown();
    }
}
