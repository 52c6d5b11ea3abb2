//! Slack delivery over the Web API
//!
//! The root message carries the mentions as text and one colored
//! attachment. Replies are posted with `thread_ts`, each one anchored on
//! the timestamp of the reply before it. Slack caps attachment text at
//! 4000 characters, past that the body is uploaded as a file.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::NotifyError;
use crate::provider::{
    ensure_success, ChatProvider, DeliveryResult, FileUpload, Message, ThreadAnchor,
};

const DEFAULT_BASE_URL: &str = "https://slack.com/api";
const TEXT_LIMIT: usize = 4000;

#[derive(Debug, Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
    attachments: Vec<Attachment<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thread_ts: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Attachment<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    text: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<AttachmentField<'a>>,
    ts: i64,
}

#[derive(Debug, Serialize)]
struct AttachmentField<'a> {
    title: &'a str,
    value: &'a str,
    short: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    upload_url: Option<String>,
    #[serde(default)]
    file_id: Option<String>,
}

impl ApiResponse {
    fn into_result(self) -> Result<Self, NotifyError> {
        if self.ok {
            Ok(self)
        } else {
            Err(NotifyError::Provider(
                self.error.unwrap_or_else(|| "unknown_error".to_string()),
            ))
        }
    }

    fn require(field: Option<String>, name: &str) -> Result<String, NotifyError> {
        field.ok_or_else(|| NotifyError::Provider(format!("response is missing `{name}`")))
    }
}

fn build_post<'a>(channel: &'a str, message: &'a Message, thread_ts: Option<&'a str>) -> PostMessage<'a> {
    // Root messages put the mentions in `text`; replies title the attachment instead
    let (text, title) = if thread_ts.is_some() {
        ("", Some(message.heading.as_str()).filter(|t| !t.is_empty()))
    } else {
        (message.heading.as_str(), None)
    };

    PostMessage {
        channel,
        text,
        attachments: vec![Attachment {
            color: message.color.map(|c| format!("#{c:06X}")),
            title,
            text: &message.text,
            fields: message
                .fields
                .iter()
                .map(|field| AttachmentField {
                    title: &field.title,
                    value: &field.value,
                    short: false,
                })
                .collect(),
            ts: message.timestamp.timestamp(),
        }],
        thread_ts,
    }
}

/// Slack bot client
pub struct SlackClient {
    http: Client,
    token: String,
    base_url: String,
}

impl SlackClient {
    pub fn new(token: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            token: token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn decode(response: reqwest::Response) -> Result<ApiResponse, NotifyError> {
        let response = ensure_success(response).await?;
        response.json::<ApiResponse>().await?.into_result()
    }

    async fn post(&self, body: &PostMessage<'_>) -> Result<ApiResponse, NotifyError> {
        let response = self
            .http
            .post(self.method_url("chat.postMessage"))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;

        Self::decode(response).await
    }
}

#[async_trait]
impl ChatProvider for SlackClient {
    fn name(&self) -> &'static str {
        "slack"
    }

    fn mention(&self, user: &str) -> String {
        format!("<@{user}>")
    }

    fn text_limit(&self) -> Option<usize> {
        Some(TEXT_LIMIT)
    }

    fn chains_replies(&self) -> bool {
        true
    }

    async fn post_message(
        &self,
        channel_id: &str,
        message: &Message,
    ) -> Result<DeliveryResult, NotifyError> {
        let response = self.post(&build_post(channel_id, message, None)).await?;
        let ts = ApiResponse::require(response.ts, "ts")?;

        Ok(DeliveryResult {
            root_message_id: ts.clone(),
            channel_id: response.channel.unwrap_or_else(|| channel_id.to_string()),
            thread_id: Some(ts),
        })
    }

    async fn post_reply(
        &self,
        channel_id: &str,
        message: &Message,
        anchor: &ThreadAnchor,
    ) -> Result<String, NotifyError> {
        let body = build_post(channel_id, message, Some(&anchor.message_id));
        let response = self.post(&body).await?;
        ApiResponse::require(response.ts, "ts")
    }

    async fn upload_file(
        &self,
        channel_id: &str,
        file: &FileUpload,
        anchor: &ThreadAnchor,
    ) -> Result<(), NotifyError> {
        let length = file.content.len().to_string();
        let response = self
            .http
            .post(self.method_url("files.getUploadURLExternal"))
            .bearer_auth(&self.token)
            .form(&[("filename", file.file_name.as_str()), ("length", length.as_str())])
            .send()
            .await?;
        let ticket = Self::decode(response).await?;
        let upload_url = ApiResponse::require(ticket.upload_url, "upload_url")?;
        let file_id = ApiResponse::require(ticket.file_id, "file_id")?;

        let response = self
            .http
            .post(upload_url)
            .body(file.content.clone())
            .send()
            .await?;
        ensure_success(response).await?;

        let thread_ts = anchor.thread_id.as_deref().unwrap_or(&anchor.message_id);
        let complete = serde_json::json!({
            "files": [{"id": file_id, "title": file.file_name}],
            "channel_id": channel_id,
            "thread_ts": thread_ts,
        });
        let response = self
            .http
            .post(self.method_url("files.completeUploadExternal"))
            .bearer_auth(&self.token)
            .json(&complete)
            .send()
            .await?;
        Self::decode(response).await?;

        Ok(())
    }
}
