//! Discord delivery over the bot REST API
//!
//! The root message is a single embed (mentions as title, primary text as
//! description, fixed fields, color, timestamp). Replies are embeds that
//! reference the root message. Oversized bodies go up as `files[0]`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::NotifyError;
use crate::provider::{
    ensure_success, ChatProvider, DeliveryResult, FileUpload, Message, ThreadAnchor,
};
use crate::utils::format_timestamp;

const DEFAULT_BASE_URL: &str = "https://discord.com/api/v10";

/// Discord rejects embed descriptions longer than this
const EMBED_DESCRIPTION_LIMIT: usize = 4096;

/// Discord rejects empty embed field values
const EMPTY_FIELD_VALUE: &str = "-";

#[derive(Debug, Serialize, Default)]
struct CreateMessage {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    embeds: Vec<Embed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_reference: Option<MessageReference>,
}

#[derive(Debug, Serialize)]
struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<EmbedField>,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct EmbedField {
    name: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct MessageReference {
    message_id: String,
    channel_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    guild_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedMessage {
    id: String,
    channel_id: String,
    #[serde(default)]
    guild_id: Option<String>,
}

fn non_empty(text: &str) -> Option<String> {
    (!text.is_empty()).then(|| text.to_string())
}

impl Embed {
    fn from_message(message: &Message) -> Self {
        Self {
            title: non_empty(&message.heading),
            description: non_empty(&message.text),
            color: message.color,
            fields: message
                .fields
                .iter()
                .map(|field| EmbedField {
                    name: field.title.clone(),
                    value: non_empty(&field.value).unwrap_or_else(|| EMPTY_FIELD_VALUE.to_string()),
                })
                .collect(),
            timestamp: format_timestamp(&message.timestamp),
        }
    }
}

impl From<&ThreadAnchor> for MessageReference {
    fn from(anchor: &ThreadAnchor) -> Self {
        Self {
            message_id: anchor.message_id.clone(),
            channel_id: anchor.channel_id.clone(),
            guild_id: anchor.thread_id.clone(),
        }
    }
}

/// Discord bot client
pub struct DiscordClient {
    http: Client,
    token: String,
    base_url: String,
}

impl DiscordClient {
    pub fn new(token: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            token: token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the client at another API root (proxies, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn messages_url(&self, channel_id: &str) -> String {
        format!("{}/channels/{}/messages", self.base_url, channel_id)
    }

    async fn create(&self, channel_id: &str, body: &CreateMessage) -> Result<CreatedMessage, NotifyError> {
        let response = self
            .http
            .post(self.messages_url(channel_id))
            .header("Authorization", format!("Bot {}", self.token))
            .json(body)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ChatProvider for DiscordClient {
    fn name(&self) -> &'static str {
        "discord"
    }

    fn mention(&self, user: &str) -> String {
        format!("@{user}")
    }

    fn text_limit(&self) -> Option<usize> {
        Some(EMBED_DESCRIPTION_LIMIT)
    }

    async fn post_message(
        &self,
        channel_id: &str,
        message: &Message,
    ) -> Result<DeliveryResult, NotifyError> {
        let body = CreateMessage {
            embeds: vec![Embed::from_message(message)],
            message_reference: None,
        };
        let created = self.create(channel_id, &body).await?;

        Ok(DeliveryResult {
            root_message_id: created.id,
            channel_id: created.channel_id,
            thread_id: created.guild_id,
        })
    }

    async fn post_reply(
        &self,
        channel_id: &str,
        message: &Message,
        anchor: &ThreadAnchor,
    ) -> Result<String, NotifyError> {
        let body = CreateMessage {
            embeds: vec![Embed::from_message(message)],
            message_reference: Some(anchor.into()),
        };
        Ok(self.create(channel_id, &body).await?.id)
    }

    async fn upload_file(
        &self,
        channel_id: &str,
        file: &FileUpload,
        anchor: &ThreadAnchor,
    ) -> Result<(), NotifyError> {
        let payload = CreateMessage {
            embeds: Vec::new(),
            message_reference: Some(anchor.into()),
        };
        let part = Part::bytes(file.content.clone().into_bytes())
            .file_name(file.file_name.clone())
            .mime_str("text/plain")?;
        let form = Form::new()
            .text("payload_json", serde_json::to_string(&payload)?)
            .part("files[0]", part);

        let response = self
            .http
            .post(self.messages_url(channel_id))
            .header("Authorization", format!("Bot {}", self.token))
            .multipart(form)
            .send()
            .await?;

        ensure_success(response).await?;
        Ok(())
    }
}
