//! Cooldown gate for alerts
//!
//! One alert per (client, endpoint) per cooldown window. This is not a
//! token bucket: after a quiet period the next failure always alerts, and
//! everything after it is suppressed until the window has passed.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::config::{ExceptionPolicy, MiddlewareConfig};

/// Above this many tracked keys, expired entries are pruned on insert
const PRUNE_THRESHOLD: usize = 10_000;

/// Identifies who hit which endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub client: String,
    pub endpoint: String,
}

impl RateLimitKey {
    pub fn new(client: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            endpoint: endpoint.into(),
        }
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.client, self.endpoint)
    }
}

/// Per-key cooldown gate shared by every in-flight request
#[derive(Debug)]
pub struct RateLimiter {
    last_notified: Mutex<HashMap<RateLimitKey, DateTime<Utc>>>,
    cooldown: chrono::Duration,
    exception_urls: Vec<String>,
    exception_policy: ExceptionPolicy,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_config(&MiddlewareConfig::default())
    }
}

impl RateLimiter {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            last_notified: Mutex::new(HashMap::new()),
            cooldown: chrono::Duration::from_std(cooldown).unwrap_or(chrono::Duration::MAX),
            exception_urls: Vec::new(),
            exception_policy: ExceptionPolicy::default(),
        }
    }

    /// Route the listed endpoints through `policy` instead of the cooldown
    pub fn with_exceptions<I, S>(mut self, urls: I, policy: ExceptionPolicy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exception_urls = urls.into_iter().map(Into::into).collect();
        self.exception_policy = policy;
        self
    }

    pub fn from_config(config: &MiddlewareConfig) -> Self {
        Self::new(config.cooldown())
            .with_exceptions(config.exception_urls.iter().cloned(), config.exception_policy)
    }

    pub fn is_exception(&self, endpoint: &str) -> bool {
        self.exception_urls.iter().any(|url| url == endpoint)
    }

    /// Decide whether an alert for `key` should fire now
    pub fn should_notify(&self, key: &RateLimitKey) -> bool {
        self.should_notify_at(key, Utc::now())
    }

    /// Same as [`should_notify`](Self::should_notify) with an explicit clock
    pub fn should_notify_at(&self, key: &RateLimitKey, now: DateTime<Utc>) -> bool {
        if self.is_exception(&key.endpoint) {
            return match self.exception_policy {
                ExceptionPolicy::Suppress => false,
                ExceptionPolicy::CooldownExempt => true,
            };
        }

        self.check_cooldown_at(key, now)
    }

    /// The bare cooldown gate, ignoring the exception list
    ///
    /// Records `now` and returns `true` for unseen keys and for keys last
    /// notified more than one cooldown ago. Otherwise returns `false` and
    /// leaves the stored timestamp alone. Check and update happen under one
    /// lock, so two racing requests cannot both win.
    pub fn check_cooldown_at(&self, key: &RateLimitKey, now: DateTime<Utc>) -> bool {
        let mut last_notified = self.last_notified.lock();

        if let Some(last) = last_notified.get(key) {
            if now - *last <= self.cooldown {
                return false;
            }
        } else if last_notified.len() >= PRUNE_THRESHOLD {
            let cooldown = self.cooldown;
            last_notified.retain(|_, last| now - *last <= cooldown);
        }

        last_notified.insert(key.clone(), now);
        true
    }

    pub fn last_notified(&self, key: &RateLimitKey) -> Option<DateTime<Utc>> {
        self.last_notified.lock().get(key).copied()
    }

    /// Drop keys whose cooldown has already elapsed at `now`
    pub fn prune_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut last_notified = self.last_notified.lock();
        let before = last_notified.len();
        let cooldown = self.cooldown;
        last_notified.retain(|_, last| now - *last <= cooldown);
        before - last_notified.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.last_notified.lock().len()
    }
}
