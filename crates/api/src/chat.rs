//! The outbound side of the chat platform: everything the bot posts, edits, or removes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use twilight_model::{
    channel::message::{Component, Embed},
    id::{
        marker::{ChannelMarker, MessageMarker, UserMarker},
        Id,
    },
};

pub type ChannelId = Id<ChannelMarker>;
pub type MessageId = Id<MessageMarker>;
pub type UserId = Id<UserMarker>;

#[derive(Debug, thiserror::Error)]
#[error("chat request failed")]
pub struct Error(#[source] Box<dyn std::error::Error + Send + Sync>);

impl Error {
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Box::new(err))
    }
}

pub type Result<T> = core::result::Result<T, Error>;

/// Where a message is delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Channel(ChannelId),
    /// Direct message to a single user.
    Direct(UserId),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Outgoing {
    pub content: Option<String>,
    pub embeds: Vec<Embed>,
    pub components: Vec<Component>,
    pub attachment: Option<Attachment>,
}

/// Partial update of an existing message. `None` leaves the field untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Edit {
    pub content: Option<String>,
    pub embeds: Option<Vec<Embed>>,
    pub components: Option<Vec<Component>>,
}

/// Handle to a message the platform has accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sent {
    pub channel: ChannelId,
    pub id: MessageId,
    /// Server-confirmed creation time of the message.
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait Chat: Send + Sync {
    async fn send(&self, target: Target, message: Outgoing) -> Result<Sent>;
    async fn edit(&self, channel: ChannelId, message: MessageId, edit: Edit) -> Result<()>;
    /// Removes every interactive component from a message.
    async fn clear_components(&self, channel: ChannelId, message: MessageId) -> Result<()>;
    /// Resolves the current display name of a user, if the user exists.
    async fn username(&self, user: UserId) -> Result<Option<String>>;
}

/// Fire-and-forget removal of a message's components after `delay`.
pub fn schedule_clear(chat: Arc<dyn Chat>, message: Sent, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Err(err) = chat.clear_components(message.channel, message.id).await {
            log::debug!("deferred component removal on message {} failed: {err}", message.id);
        }
    });
}
