//! Configuration for the alert relay
//!
//! Loaded from a TOML file or from `ALERT_RELAY_*` environment variables.
//! Configuration is read-only once loaded; the notifier and the middleware
//! keep their own copies of the parts they need.
//!
//! ```toml
//! token = "bot-token"
//! provider = "discord"
//!
//! [error]
//! id = "123456789"
//! mentions = ["oncall"]
//!
//! [middleware]
//! exception_urls = ["/health"]
//! exception_policy = "suppress"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::alert::Severity;
use crate::error::ConfigError;

const DEFAULT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_COOLDOWN_SECS: u64 = 10 * 60;

/// Which chat provider alerts are delivered through
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Discord,
    Slack,
}

impl std::str::FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "discord" => Ok(ProviderKind::Discord),
            "slack" => Ok(ProviderKind::Slack),
            other => Err(ConfigError::Invalid(format!("unknown provider `{other}`"))),
        }
    }
}

/// A destination channel and the users to ping there
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChannelConfig {
    #[serde(rename = "id", alias = "channel_id")]
    pub channel_id: String,

    /// User names without the leading `@`
    #[serde(default)]
    pub mentions: Vec<String>,
}

impl ChannelConfig {
    pub fn new(channel_id: impl Into<String>, mentions: Vec<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            mentions,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.channel_id.is_empty()
    }
}

/// One optional channel per severity
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChannelSet {
    #[serde(default)]
    pub success: Option<ChannelConfig>,
    #[serde(default)]
    pub error: Option<ChannelConfig>,
    #[serde(default)]
    pub warn: Option<ChannelConfig>,
}

impl ChannelSet {
    pub fn for_severity(&self, severity: Severity) -> Option<&ChannelConfig> {
        match severity {
            Severity::Success => self.success.as_ref(),
            Severity::Error => self.error.as_ref(),
            Severity::Warn => self.warn.as_ref(),
        }
    }
}

/// What happens to alerts for endpoints on the exception list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionPolicy {
    /// Listed endpoints never produce an alert
    #[default]
    Suppress,
    /// Listed endpoints skip the cooldown and always produce an alert
    CooldownExempt,
}

/// What the middleware does when the request body cannot be read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyReadFailure {
    /// Answer with the sentinel status (418) and stay quiet
    #[default]
    Sentinel,
    /// Answer with the sentinel status and fire an error alert
    Alert,
}

/// What the middleware does when the request body is not a JSON object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyParseFailure {
    /// Forward the raw bytes without comment
    #[default]
    Passthrough,
    /// Forward the raw bytes and send a warn alert about the parse failure
    Warn,
}

/// Request interception settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MiddlewareConfig {
    /// Request URIs handled by `exception_policy` instead of the cooldown gate
    pub exception_urls: Vec<String>,
    pub exception_policy: ExceptionPolicy,
    pub cooldown_secs: u64,
    pub on_body_read_error: BodyReadFailure,
    pub on_body_parse_error: BodyParseFailure,
    /// JSON keys removed from request bodies before they are forwarded
    pub sensitive_keys: Vec<String>,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            exception_urls: Vec::new(),
            exception_policy: ExceptionPolicy::default(),
            cooldown_secs: DEFAULT_COOLDOWN_SECS,
            on_body_read_error: BodyReadFailure::default(),
            on_body_parse_error: BodyParseFailure::default(),
            sensitive_keys: vec!["password".to_string()],
        }
    }
}

impl MiddlewareConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Bot token for the chat provider
    #[serde(default)]
    pub token: String,

    #[serde(default)]
    pub provider: ProviderKind,

    /// Upper bound for every outbound provider call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(flatten)]
    pub channels: ChannelSet,

    #[serde(default)]
    pub middleware: MiddlewareConfig,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: String::new(),
            provider: ProviderKind::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            channels: ChannelSet::default(),
            middleware: MiddlewareConfig::default(),
        }
    }
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Load configuration from `ALERT_RELAY_*` environment variables
    ///
    /// - `ALERT_RELAY_TOKEN`, `ALERT_RELAY_PROVIDER`, `ALERT_RELAY_TIMEOUT_SECS`
    /// - `ALERT_RELAY_{ERROR,WARN,SUCCESS}_CHANNEL`
    /// - `ALERT_RELAY_{ERROR,WARN,SUCCESS}_MENTIONS` (comma separated)
    /// - `ALERT_RELAY_EXCEPTION_URLS` (comma separated), `ALERT_RELAY_COOLDOWN_SECS`
    ///
    /// Unset variables keep their defaults. Channels without an id stay unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config {
            token: lookup("ALERT_RELAY_TOKEN").unwrap_or_default(),
            ..Config::default()
        };

        if let Some(provider) = lookup("ALERT_RELAY_PROVIDER") {
            config.provider = provider.parse()?;
        }
        if let Some(secs) = lookup("ALERT_RELAY_TIMEOUT_SECS") {
            config.timeout_secs = parse_secs("ALERT_RELAY_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = lookup("ALERT_RELAY_COOLDOWN_SECS") {
            config.middleware.cooldown_secs = parse_secs("ALERT_RELAY_COOLDOWN_SECS", &secs)?;
        }
        if let Some(urls) = lookup("ALERT_RELAY_EXCEPTION_URLS") {
            config.middleware.exception_urls = split_list(&urls);
        }

        let channel = |prefix: &str| {
            let id = lookup(&format!("ALERT_RELAY_{prefix}_CHANNEL")).filter(|id| !id.is_empty())?;
            let mentions = lookup(&format!("ALERT_RELAY_{prefix}_MENTIONS"))
                .map(|raw| split_list(&raw))
                .unwrap_or_default();
            Some(ChannelConfig::new(id, mentions))
        };
        config.channels = ChannelSet {
            success: channel("SUCCESS"),
            error: channel("ERROR"),
            warn: channel("WARN"),
        };

        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Token present; channels are checked per alert
    pub fn is_active(&self) -> bool {
        !self.token.trim().is_empty()
    }
}

fn parse_secs(name: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{name} must be a whole number of seconds, got `{raw}`")))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_parse_full_toml() {
        let config = Config::from_toml_str(
            r#"
            token = "abc"
            provider = "slack"
            timeout_secs = 3

            [error]
            id = "C1"
            mentions = ["alice", "bob"]

            [warn]
            channel_id = "C2"

            [middleware]
            exception_urls = ["/health"]
            exception_policy = "cooldown_exempt"
            cooldown_secs = 60
            on_body_read_error = "alert"
            on_body_parse_error = "warn"
            "#,
        )
        .unwrap();

        assert_eq!(config.token, "abc");
        assert_eq!(config.provider, ProviderKind::Slack);
        assert_eq!(config.timeout(), Duration::from_secs(3));
        assert_eq!(
            config.channels.error,
            Some(ChannelConfig::new("C1", vec!["alice".into(), "bob".into()]))
        );
        assert_eq!(config.channels.warn, Some(ChannelConfig::new("C2", vec![])));
        assert!(config.channels.success.is_none());
        assert_eq!(config.middleware.exception_urls, vec!["/health".to_string()]);
        assert_eq!(config.middleware.exception_policy, ExceptionPolicy::CooldownExempt);
        assert_eq!(config.middleware.cooldown(), Duration::from_secs(60));
        assert_eq!(config.middleware.on_body_read_error, BodyReadFailure::Alert);
        assert_eq!(config.middleware.on_body_parse_error, BodyParseFailure::Warn);
        assert_eq!(config.middleware.sensitive_keys, vec!["password".to_string()]);
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str(r#"token = "abc""#).unwrap();

        assert_eq!(config.provider, ProviderKind::Discord);
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.middleware.cooldown_secs, 600);
        assert_eq!(config.middleware.exception_policy, ExceptionPolicy::Suppress);
        assert_eq!(config.middleware.on_body_read_error, BodyReadFailure::Sentinel);
        assert_eq!(config.middleware.on_body_parse_error, BodyParseFailure::Passthrough);
        assert!(config.is_active());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let result = Config::from_toml_str(r#"provider = "irc""#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_channel_configured() {
        assert!(ChannelConfig::new("C1", vec![]).is_configured());
        assert!(!ChannelConfig::new("", vec!["x".into()]).is_configured());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "token = \"t\"\n[success]\nid = \"S1\"").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(
            config.channels.for_severity(Severity::Success).map(|c| c.channel_id.as_str()),
            Some("S1")
        );
    }

    #[test]
    fn test_from_file_missing() {
        let result = Config::from_file("/definitely/not/here.toml");
        assert!(matches!(result, Err(ConfigError::Read(_))));
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("ALERT_RELAY_TOKEN", "tok"),
            ("ALERT_RELAY_PROVIDER", "Slack"),
            ("ALERT_RELAY_ERROR_CHANNEL", "C9"),
            ("ALERT_RELAY_ERROR_MENTIONS", "alice, bob,,"),
            ("ALERT_RELAY_WARN_CHANNEL", ""),
            ("ALERT_RELAY_EXCEPTION_URLS", "/health,/metrics"),
            ("ALERT_RELAY_COOLDOWN_SECS", "30"),
        ]);

        let config = Config::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();

        assert_eq!(config.token, "tok");
        assert_eq!(config.provider, ProviderKind::Slack);
        assert_eq!(
            config.channels.error,
            Some(ChannelConfig::new("C9", vec!["alice".into(), "bob".into()]))
        );
        assert!(config.channels.warn.is_none());
        assert_eq!(config.middleware.exception_urls.len(), 2);
        assert_eq!(config.middleware.cooldown_secs, 30);
    }

    #[test]
    fn test_from_lookup_bad_number() {
        let result = Config::from_lookup(|name| {
            (name == "ALERT_RELAY_TIMEOUT_SECS").then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_inactive_without_token() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert!(!config.is_active());
    }
}
