//! The seam between the notifier and a chat service
//!
//! A [`ChatProvider`] knows how to post a root message, post a reply into
//! the thread anchored on it, and upload a text file. Discord and Slack
//! implement it over HTTP; tests use a recording fake.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::alert::DetailField;
use crate::error::NotifyError;

/// A rendered message, provider-neutral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Mention prefix, shown above the body
    pub heading: String,
    pub text: String,
    /// RGB color, `None` for uncolored replies
    pub color: Option<u32>,
    pub fields: Vec<DetailField>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// A threaded reply carrying one detail field
    pub fn reply(field: &DetailField) -> Self {
        Self {
            heading: field.title.clone(),
            text: field.value.clone(),
            color: None,
            fields: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

/// Identifiers returned for the root message of an alert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    pub root_message_id: String,
    pub channel_id: String,
    /// Guild id on Discord, thread timestamp on Slack
    pub thread_id: Option<String>,
}

/// Where a reply attaches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadAnchor {
    pub channel_id: String,
    pub thread_id: Option<String>,
    /// Message the next reply references
    pub message_id: String,
}

impl From<&DeliveryResult> for ThreadAnchor {
    fn from(result: &DeliveryResult) -> Self {
        Self {
            channel_id: result.channel_id.clone(),
            thread_id: result.thread_id.clone(),
            message_id: result.root_message_id.clone(),
        }
    }
}

/// A text file posted in place of an oversized message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub file_name: String,
    pub content: String,
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Render a single user mention (without the trailing space)
    fn mention(&self, user: &str) -> String;

    /// Longest primary text the provider accepts inline
    fn text_limit(&self) -> Option<usize> {
        None
    }

    /// Whether each reply anchors on the previous one instead of the root
    fn chains_replies(&self) -> bool {
        false
    }

    async fn post_message(
        &self,
        channel_id: &str,
        message: &Message,
    ) -> Result<DeliveryResult, NotifyError>;

    /// Post a reply and return its message identifier
    async fn post_reply(
        &self,
        channel_id: &str,
        message: &Message,
        anchor: &ThreadAnchor,
    ) -> Result<String, NotifyError>;

    async fn upload_file(
        &self,
        channel_id: &str,
        file: &FileUpload,
        anchor: &ThreadAnchor,
    ) -> Result<(), NotifyError>;
}

/// Turn a non-2xx response into [`NotifyError::Rejected`]
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, NotifyError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(NotifyError::Rejected { status, body })
}

/// Join mentions with the provider's syntax, each followed by a space
pub fn render_mentions(provider: &dyn ChatProvider, users: &[String]) -> String {
    users
        .iter()
        .map(|user| format!("{} ", provider.mention(user)))
        .collect()
}
