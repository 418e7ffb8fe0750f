use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serenity::all::{
    ChannelId, Client as SerenityClient, Context as SerenityContext, CreateEmbed, CreateMessage,
    EventHandler as SerenityEventHandler, GatewayIntents, Http, Message as SerenityMessage,
    MessageId, MessageReference, ReactionType, Ready, Timestamp,
};
use tokio::sync::{Mutex as AsyncMutex, RwLock, oneshot};
use tracing::{debug, error, info, warn};

use crate::bot::BotCore;
use crate::chat::{ChatGateway, ChatMessage, DeliveryError, TransferNotice};
use crate::config::Config;

const INITIAL_LOGIN_RETRY_SECONDS: u64 = 2;
const MAX_LOGIN_RETRY_SECONDS: u64 = 300;
const SEND_ATTEMPTS: u32 = 3;
const SEND_RETRY_DELAY: Duration = Duration::from_secs(2);

const COLOR_WHITE: u32 = 0xFFFFFF;
const COLOR_RED: u32 = 0xFF0000;

/// Serenity-backed gateway: receives message events and forwards them to the
/// core, and carries the core's outbound sends over the Discord HTTP API.
pub struct DiscordClient {
    config: Arc<Config>,
    login_state: AsyncMutex<LoginState>,
    core: Arc<RwLock<Option<Arc<BotCore>>>>,
    http: Arc<RwLock<Option<Arc<Http>>>>,
}

#[derive(Default)]
struct LoginState {
    is_logged_in: bool,
    gateway_task: Option<tokio::task::JoinHandle<()>>,
}

struct GatewayEventHandler {
    ready_sender: AsyncMutex<Option<oneshot::Sender<()>>>,
    http_sender: AsyncMutex<Option<oneshot::Sender<Arc<Http>>>>,
    core: Arc<RwLock<Option<Arc<BotCore>>>>,
}

#[serenity::async_trait]
impl SerenityEventHandler for GatewayEventHandler {
    async fn ready(&self, ctx: SerenityContext, ready: Ready) {
        info!(
            "discord gateway ready as {} ({})",
            ready.user.name, ready.user.id
        );
        if let Some(sender) = self.ready_sender.lock().await.take() {
            let _ = sender.send(());
        }
        if let Some(sender) = self.http_sender.lock().await.take() {
            let _ = sender.send(ctx.http.clone());
        }
    }

    async fn message(&self, _ctx: SerenityContext, msg: SerenityMessage) {
        if msg.author.bot {
            return;
        }

        let core = self.core.read().await.clone();
        let Some(core) = core else {
            debug!("ignoring discord message before core binding");
            return;
        };

        let message = ChatMessage {
            message_id: msg.id.to_string(),
            channel_id: msg.channel_id.to_string(),
            author_id: msg.author.id.to_string(),
            content: msg.content.clone(),
            reply_author_id: msg
                .referenced_message
                .as_ref()
                .map(|original| original.author.id.to_string()),
            reply_to_message_id: msg
                .message_reference
                .as_ref()
                .and_then(|reference| reference.message_id)
                .map(|id| id.to_string()),
        };

        if let Err(err) = core.handle_message(&message).await {
            error!("failed to handle discord message: {err}");
        }
    }
}

impl DiscordClient {
    pub fn new(config: Arc<Config>) -> Self {
        info!("initializing discord client");
        Self {
            config,
            login_state: AsyncMutex::new(LoginState::default()),
            core: Arc::new(RwLock::new(None)),
            http: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn set_core(&self, core: Arc<BotCore>) {
        *self.core.write().await = Some(core);
    }

    async fn login(&self) -> Result<()> {
        let mut state = self.login_state.lock().await;
        if state.is_logged_in {
            return Ok(());
        }

        // reading message content requires the privileged intent
        let intents = if self.config.bot.use_privileged_intents {
            GatewayIntents::all()
        } else {
            GatewayIntents::non_privileged() | GatewayIntents::MESSAGE_CONTENT
        };

        let (ready_tx, ready_rx) = oneshot::channel();
        let (http_tx, http_rx) = oneshot::channel();
        let event_handler = GatewayEventHandler {
            ready_sender: AsyncMutex::new(Some(ready_tx)),
            http_sender: AsyncMutex::new(Some(http_tx)),
            core: self.core.clone(),
        };

        let mut gateway_client =
            SerenityClient::builder(self.config.bot.token.expose_secret(), intents)
                .event_handler(event_handler)
                .await
                .map_err(|err| anyhow!("failed to build discord gateway client: {err}"))?;

        let gateway_task = tokio::spawn(async move {
            if let Err(err) = gateway_client.start_autosharded().await {
                error!("discord gateway stopped: {err}");
            }
        });

        match tokio::time::timeout(Duration::from_secs(30), ready_rx).await {
            Ok(Ok(())) => {
                state.is_logged_in = true;
                state.gateway_task = Some(gateway_task);
                info!("discord bot login succeeded and gateway is connected");

                if let Ok(Ok(http)) = tokio::time::timeout(Duration::from_secs(5), http_rx).await {
                    *self.http.write().await = Some(http);
                }

                Ok(())
            }
            Ok(Err(_)) => {
                gateway_task.abort();
                Err(anyhow!("discord gateway exited before receiving Ready event"))
            }
            Err(_) => {
                gateway_task.abort();
                Err(anyhow!("timed out waiting for discord Ready event"))
            }
        }
    }

    pub async fn start(&self) -> Result<()> {
        let mut retry_seconds = INITIAL_LOGIN_RETRY_SECONDS;

        loop {
            match self.login().await {
                Ok(()) => {
                    info!("discord client is ready");
                    return Ok(());
                }
                Err(err) => {
                    error!(
                        "failed to start discord client: {err}. retrying in {} seconds",
                        retry_seconds
                    );
                    tokio::time::sleep(Duration::from_secs(retry_seconds)).await;
                    retry_seconds = (retry_seconds * 2).min(MAX_LOGIN_RETRY_SECONDS);
                }
            }
        }
    }

    pub async fn stop(&self) -> Result<()> {
        let mut state = self.login_state.lock().await;
        if !state.is_logged_in {
            return Ok(());
        }

        if let Some(gateway_task) = state.gateway_task.take() {
            gateway_task.abort();
            match gateway_task.await {
                Ok(()) => info!("discord gateway task exited"),
                Err(join_err) if join_err.is_cancelled() => {
                    info!("discord gateway task aborted")
                }
                Err(join_err) => {
                    error!("discord gateway task join error: {join_err}");
                }
            }
        }

        state.is_logged_in = false;
        info!("discord client stopped");
        Ok(())
    }

    async fn http(&self) -> Result<Arc<Http>, DeliveryError> {
        self.http
            .read()
            .await
            .clone()
            .ok_or_else(|| DeliveryError::Transient("discord http client not ready".to_string()))
    }

    fn parse_id(value: &str, what: &str) -> Result<u64, DeliveryError> {
        value
            .parse::<u64>()
            .map_err(|_| DeliveryError::Unresolvable(format!("invalid {what} id '{value}'")))
    }

    fn classify_error(err: serenity::Error) -> DeliveryError {
        if let serenity::Error::Http(serenity::http::HttpError::UnsuccessfulRequest(response)) =
            &err
        {
            let status = response.status_code.as_u16();
            if status == 403 || status == 404 {
                return DeliveryError::Unresolvable(err.to_string());
            }
        }
        DeliveryError::Transient(err.to_string())
    }

    // Bounded retry with a fixed delay; unresolvable destinations fail fast.
    async fn with_retry<T, F, Fut>(&self, operation: &str, action: F) -> Result<T, DeliveryError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, serenity::Error>>,
    {
        let mut last_failure = None;
        for attempt in 1..=SEND_ATTEMPTS {
            match action().await {
                Ok(value) => return Ok(value),
                Err(err) => match Self::classify_error(err) {
                    unresolvable @ DeliveryError::Unresolvable(_) => return Err(unresolvable),
                    DeliveryError::Transient(reason) => {
                        warn!(
                            "{operation} attempt {attempt}/{SEND_ATTEMPTS} failed: {reason}"
                        );
                        last_failure = Some(DeliveryError::Transient(reason));
                        if attempt < SEND_ATTEMPTS {
                            tokio::time::sleep(SEND_RETRY_DELAY).await;
                        }
                    }
                },
            }
        }

        Err(last_failure
            .unwrap_or_else(|| DeliveryError::Transient(format!("{operation} failed"))))
    }

    fn build_notice_embed(notice: &TransferNotice) -> CreateEmbed {
        let (title, color) = if notice.self_violation {
            ("Self point violation!", COLOR_RED)
        } else {
            ("Point transaction", COLOR_WHITE)
        };

        CreateEmbed::new()
            .title(title)
            .colour(color)
            .timestamp(Timestamp::now())
            .field("Bestower", notice.bestower.clone(), true)
            .field("Recipient", notice.recipient.clone(), true)
            .field("Point amount", notice.pretty_amount.clone(), true)
            .field("Content of message:", notice.excerpt.clone(), false)
    }
}

#[async_trait]
impl ChatGateway for DiscordClient {
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<(), DeliveryError> {
        let http = self.http().await?;
        let channel = ChannelId::new(Self::parse_id(channel_id, "channel")?);
        let content = content.to_string();

        self.with_retry("send_message", || {
            let http = http.clone();
            let content = content.clone();
            async move { channel.say(&*http, content).await.map(|_| ()) }
        })
        .await
    }

    async fn reply_to(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<(), DeliveryError> {
        let http = self.http().await?;
        let channel = ChannelId::new(Self::parse_id(channel_id, "channel")?);
        let message = MessageId::new(Self::parse_id(message_id, "message")?);
        let content = content.to_string();

        self.with_retry("reply_to", || {
            let http = http.clone();
            let builder = CreateMessage::new()
                .content(content.clone())
                .reference_message(MessageReference::from((channel, message)));
            async move { channel.send_message(&*http, builder).await.map(|_| ()) }
        })
        .await
    }

    async fn react(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), DeliveryError> {
        let http = self.http().await?;
        let channel = ChannelId::new(Self::parse_id(channel_id, "channel")?);
        let message = MessageId::new(Self::parse_id(message_id, "message")?);
        let reaction = ReactionType::Unicode(emoji.to_string());

        self.with_retry("react", || {
            let http = http.clone();
            let reaction = reaction.clone();
            async move { http.create_reaction(channel, message, &reaction).await }
        })
        .await
    }

    async fn message_author(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<Option<String>, DeliveryError> {
        let http = self.http().await?;
        let channel = ChannelId::new(Self::parse_id(channel_id, "channel")?);
        let message = MessageId::new(Self::parse_id(message_id, "message")?);

        let fetched = self
            .with_retry("message_author", || {
                let http = http.clone();
                async move { http.get_message(channel, message).await }
            })
            .await;

        match fetched {
            Ok(original) => Ok(Some(original.author.id.to_string())),
            Err(DeliveryError::Unresolvable(reason)) => {
                debug!("replied-to message could not be fetched: {reason}");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn send_transfer_notice(
        &self,
        channel_id: &str,
        notice: &TransferNotice,
    ) -> Result<(), DeliveryError> {
        let http = self.http().await?;
        let channel = ChannelId::new(Self::parse_id(channel_id, "channel")?);
        let embed = Self::build_notice_embed(notice);

        self.with_retry("send_transfer_notice", || {
            let http = http.clone();
            let builder = CreateMessage::new().embed(embed.clone());
            async move { channel.send_message(&*http, builder).await.map(|_| ()) }
        })
        .await
    }
}
