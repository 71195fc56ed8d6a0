use crate::chat::{self, ChannelId, Chat, Edit, MessageId, Outgoing, Sent, Target, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use twilight_http::{error::ErrorType, response::StatusCode, Client};
use twilight_model::http::attachment::Attachment;
use twilight_model::id::{marker::InteractionMarker, Id};

/// Milliseconds between the Unix epoch and the platform's snowflake epoch.
const SNOWFLAKE_EPOCH: u64 = 1_420_070_400_000;

fn from_micros(micros: i64) -> Option<DateTime<Utc>> {
    let nanos = u32::try_from(micros.rem_euclid(1_000_000) * 1_000).ok()?;
    DateTime::from_timestamp(micros.div_euclid(1_000_000), nanos)
}

/// Server-side creation time of an interaction, recovered from its snowflake.
pub fn interaction_time(id: Id<InteractionMarker>) -> Option<DateTime<Utc>> {
    let millis = (id.get() >> 22) + SNOWFLAKE_EPOCH;
    from_micros(i64::try_from(millis).ok()?.checked_mul(1_000)?)
}

fn is_not_found(err: &twilight_http::Error) -> bool {
    matches!(err.kind(), ErrorType::Response { status, .. } if missing(*status))
}

fn missing(status: StatusCode) -> bool {
    status.get() == 404
}

/// [`Chat`] over the platform's REST API.
pub struct Discord {
    client: Client,
}

impl Discord {
    pub fn new(token: String) -> Self {
        Self { client: Client::new(token) }
    }

    async fn resolve(&self, target: Target) -> chat::Result<ChannelId> {
        match target {
            Target::Channel(channel) => Ok(channel),
            Target::Direct(user) => {
                let channel =
                    self.client.create_private_channel(user).await.map_err(chat::Error::new)?.model().await;
                Ok(channel.map_err(chat::Error::new)?.id)
            }
        }
    }
}

#[async_trait]
impl Chat for Discord {
    async fn send(&self, target: Target, message: Outgoing) -> chat::Result<Sent> {
        let channel = self.resolve(target).await?;
        let attachments: Vec<_> = message
            .attachment
            .into_iter()
            .zip(1..)
            .map(|(file, id)| Attachment::from_bytes(file.filename, file.bytes, id))
            .collect();

        let mut request = self.client.create_message(channel);
        if let Some(content) = message.content.as_deref() {
            request = request.content(content).map_err(chat::Error::new)?;
        }
        let created = request
            .embeds(&message.embeds)
            .map_err(chat::Error::new)?
            .components(&message.components)
            .map_err(chat::Error::new)?
            .attachments(&attachments)
            .map_err(chat::Error::new)?
            .await
            .map_err(chat::Error::new)?
            .model()
            .await
            .map_err(chat::Error::new)?;

        let timestamp = from_micros(created.timestamp.as_micros()).unwrap_or_else(Utc::now);
        Ok(Sent { channel: created.channel_id, id: created.id, timestamp })
    }

    async fn edit(&self, channel: ChannelId, message: MessageId, edit: Edit) -> chat::Result<()> {
        let mut request = self.client.update_message(channel, message);
        if let Some(content) = edit.content.as_deref() {
            request = request.content(Some(content)).map_err(chat::Error::new)?;
        }
        if let Some(embeds) = edit.embeds.as_deref() {
            request = request.embeds(Some(embeds)).map_err(chat::Error::new)?;
        }
        if let Some(components) = edit.components.as_deref() {
            request = request.components(Some(components)).map_err(chat::Error::new)?;
        }
        request.await.map_err(chat::Error::new)?;
        Ok(())
    }

    async fn clear_components(&self, channel: ChannelId, message: MessageId) -> chat::Result<()> {
        let current = self.client.message(channel, message).await.map_err(chat::Error::new)?.model().await;
        if current.map_err(chat::Error::new)?.components.is_empty() {
            return Ok(());
        }
        self.client
            .update_message(channel, message)
            .components(Some(&[]))
            .map_err(chat::Error::new)?
            .await
            .map_err(chat::Error::new)?;
        Ok(())
    }

    async fn username(&self, user: UserId) -> chat::Result<Option<String>> {
        let response = match self.client.user(user).await {
            Ok(response) => response,
            Err(err) if is_not_found(&err) => return Ok(None),
            Err(err) => return Err(chat::Error::new(err)),
        };
        let user = response.model().await.map_err(chat::Error::new)?;
        Ok(Some(user.name))
    }
}
