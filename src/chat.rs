use async_trait::async_trait;
use thiserror::Error;

/// Reaction emoji used as lightweight acknowledgments.
pub const CHECK_MARK: &str = "\u{2705}";
pub const CROSS_MARK: &str = "\u{274C}";
pub const NO_ENTRY: &str = "\u{1F6AB}";

/// An inbound message as seen by the core, stripped of platform detail.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub message_id: String,
    pub channel_id: String,
    pub author_id: String,
    pub content: String,
    /// Author of the replied-to message, when the gateway had it cached.
    pub reply_author_id: Option<String>,
    /// Id of the replied-to message, for an explicit fetch on a cache miss.
    pub reply_to_message_id: Option<String>,
}

impl ChatMessage {
    pub fn is_reply(&self) -> bool {
        self.reply_author_id.is_some() || self.reply_to_message_id.is_some()
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The destination no longer resolves; retrying cannot help.
    #[error("destination not resolvable: {0}")]
    Unresolvable(String),
    #[error("transient delivery failure: {0}")]
    Transient(String),
}

/// A point transaction announcement for the log channel. The transaction
/// engine fills this in; the gateway decides how to render it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferNotice {
    pub bestower: String,
    pub recipient: String,
    pub pretty_amount: String,
    pub excerpt: String,
    pub self_violation: bool,
}

/// Outbound capability of the chat platform. Implementations retry transient
/// failures internally before surfacing them.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<(), DeliveryError>;
    async fn reply_to(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<(), DeliveryError>;
    async fn react(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), DeliveryError>;
    /// Fetches the author of a message, for reply-target resolution on a
    /// cache miss. `None` when the message cannot be found.
    async fn message_author(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<Option<String>, DeliveryError>;
    async fn send_transfer_notice(
        &self,
        channel_id: &str,
        notice: &TransferNotice,
    ) -> Result<(), DeliveryError>;
}
