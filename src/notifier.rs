//! Alert delivery
//!
//! [`Notifier::deliver`] posts the root message, then each detail field as
//! a threaded reply, one after the other. Only the root send decides the
//! outcome: a failed reply or file upload is logged and skipped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::alert::{Alert, Severity};
use crate::config::{ChannelSet, Config, ProviderKind};
use crate::discord::DiscordClient;
use crate::error::{ConfigError, NotifyError};
use crate::provider::{
    render_mentions, ChatProvider, DeliveryResult, FileUpload, Message, ThreadAnchor,
};
use crate::slack::SlackClient;
use crate::utils::upload_file_name;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Sends alerts to the channel configured for their severity
pub struct Notifier {
    provider: Arc<dyn ChatProvider>,
    channels: ChannelSet,
    timeout: Duration,
}

impl Notifier {
    pub fn new(provider: Arc<dyn ChatProvider>, channels: ChannelSet) -> Self {
        Self {
            provider,
            channels,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Upper bound applied to each provider call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the provider client named in `config`
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        if !config.is_active() {
            return Err(ConfigError::MissingToken);
        }

        let timeout = config.timeout();
        let provider: Arc<dyn ChatProvider> = match config.provider {
            ProviderKind::Discord => Arc::new(DiscordClient::new(config.token.clone(), timeout)?),
            ProviderKind::Slack => Arc::new(SlackClient::new(config.token.clone(), timeout)?),
        };

        Ok(Self::new(provider, config.channels.clone()).with_timeout(timeout))
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, NotifyError>>,
    ) -> Result<T, NotifyError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| NotifyError::Timeout(self.timeout))?
    }

    /// Deliver an alert: root message, optional file upload, then replies
    ///
    /// Fails with `NotConfigured` before any network call when the severity
    /// has no usable channel, and with `SendFailed` when the root message
    /// cannot be posted. Reply and upload failures never fail the delivery.
    pub async fn deliver(&self, alert: &Alert) -> Result<DeliveryResult, NotifyError> {
        let channel = self
            .channels
            .for_severity(alert.severity)
            .filter(|channel| channel.is_configured())
            .ok_or(NotifyError::NotConfigured(alert.severity))?;
        let channel_id = channel.channel_id.as_str();

        let oversized = self
            .provider
            .text_limit()
            .is_some_and(|limit| alert.primary_text.chars().count() > limit);

        let root = Message {
            heading: render_mentions(self.provider.as_ref(), &channel.mentions),
            text: if oversized {
                String::new()
            } else {
                alert.primary_text.clone()
            },
            color: Some(alert.severity.color()),
            fields: alert.primary_fields(),
            timestamp: Utc::now(),
        };

        let delivered = self
            .bounded(self.provider.post_message(channel_id, &root))
            .await
            .map_err(NotifyError::send_failed)?;
        let mut anchor = ThreadAnchor::from(&delivered);

        if oversized {
            let file = FileUpload {
                file_name: upload_file_name(),
                content: alert.primary_text.clone(),
            };
            if let Err(e) = self
                .bounded(self.provider.upload_file(channel_id, &file, &anchor))
                .await
                .map_err(NotifyError::upload_failed)
            {
                warn!(channel = channel_id, error = %e, "alert body upload failed");
            }
        }

        for (index, field) in alert.detail_fields.iter().enumerate() {
            let reply = Message::reply(field);
            match self
                .bounded(self.provider.post_reply(channel_id, &reply, &anchor))
                .await
            {
                Ok(reply_id) => {
                    if self.provider.chains_replies() {
                        anchor.message_id = reply_id;
                    }
                }
                Err(e) => {
                    warn!(
                        channel = channel_id,
                        field = %field.title,
                        index,
                        error = %e,
                        "threaded reply failed, continuing"
                    );
                }
            }
        }

        Ok(delivered)
    }

    /// Build and deliver an alert, returning any failure
    pub async fn try_notify(
        &self,
        severity: Severity,
        origin_label: &str,
        description: &str,
        primary_text: &str,
        fields: &[&str],
    ) -> Result<DeliveryResult, NotifyError> {
        let alert = Alert::build(severity, origin_label, description, primary_text, fields)?;
        self.deliver(&alert).await
    }

    /// Build and deliver an alert, logging the outcome instead of returning it
    pub async fn notify(
        &self,
        severity: Severity,
        origin_label: &str,
        description: &str,
        primary_text: &str,
        fields: &[&str],
    ) {
        match self
            .try_notify(severity, origin_label, description, primary_text, fields)
            .await
        {
            Ok(delivered) => info!(
                provider = self.provider.name(),
                channel = %delivered.channel_id,
                "{} {} alert reported",
                severity.emoji(),
                severity
            ),
            Err(e) => error!(
                provider = self.provider.name(),
                %severity,
                origin = origin_label,
                error = %e,
                "failed to report alert"
            ),
        }
    }

    pub async fn notify_error(&self, error_at: &str, description: &str, text: &str, fields: &[&str]) {
        self.notify(Severity::Error, error_at, description, text, fields).await
    }

    pub async fn notify_warn(&self, warn_at: &str, description: &str, text: &str, fields: &[&str]) {
        self.notify(Severity::Warn, warn_at, description, text, fields).await
    }

    pub async fn notify_success(&self, success_at: &str, description: &str, text: &str, fields: &[&str]) {
        self.notify(Severity::Success, success_at, description, text, fields).await
    }
}
